use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use jsonwebtoken::Algorithm;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use utilbox_rs::duration::{format_duration, parse_duration};
use utilbox_rs::env::{detect_runtime, is_ci, is_debug_build, target_os};
use utilbox_rs::jwt::{self, JwtKey, SignOptions, VerifyOptions};
use utilbox_rs::ports::parse_ports_str;
use utilbox_rs::types::{BatchReport, PortReport};
use utilbox_rs::{
    check_multiple_ports, find_available_port, is_port_in_use, wait_for_port_with_cancel, PortState,
};

mod config;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// utilbox-rs — probe, scan and wait on local TCP ports; sign and inspect JWTs.
#[derive(Debug, Parser)]
#[command(name = "utilbox-rs", version, long_about = None)]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./utilbox.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable debug logging (overrides RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Args)]
struct ProbeArgs {
    /// Host to probe.
    #[arg(long)]
    host: Option<String>,

    /// Per-probe connect timeout in milliseconds.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Report whether a single port is in use.
    Probe {
        port: u16,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Find the first available port in an ascending range.
    Find {
        #[arg(long)]
        start: Option<u16>,
        #[arg(long)]
        end: Option<u16>,
        #[arg(long = "max-tries")]
        max_tries: Option<u32>,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Check several ports concurrently.
    Batch {
        /// Ports: comma/range list (e.g., 3000,5432,8000-8010).
        ports: Option<String>,
        /// File with one port or range per line.
        #[arg(long = "ports-file", conflicts_with = "ports")]
        ports_file: Option<PathBuf>,
        /// Max concurrent probes.
        #[arg(long)]
        concurrency: Option<usize>,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Wait until a port becomes available or in use.
    Wait {
        port: u16,
        /// Target state: available | in-use.
        #[arg(long, default_value = "in-use")]
        state: PortState,
        /// Milliseconds between probes.
        #[arg(long = "poll-ms")]
        poll_ms: Option<u64>,
        /// Overall deadline in milliseconds.
        #[arg(long = "deadline-ms")]
        deadline_ms: Option<u64>,
        #[command(flatten)]
        probe: ProbeArgs,
    },
    /// Sign, verify or decode JSON Web Tokens.
    #[command(subcommand)]
    Jwt(JwtCmd),
    /// Parse a duration (e.g. 1.5h) and print it in milliseconds and short form.
    Duration {
        input: String,
        /// Print the long form ("2 hours").
        #[arg(long, default_value_t = false)]
        long: bool,
    },
}

#[derive(Debug, Subcommand)]
enum JwtCmd {
    Sign {
        /// Claims as a JSON object.
        #[arg(long, default_value = "{}")]
        claims: String,
        #[arg(long, env = "UTILBOX_JWT_SECRET")]
        secret: String,
        #[arg(long, default_value = "HS256", value_parser = parse_algorithm)]
        alg: Algorithm,
        /// Lifetime, e.g. 15m or 1h.
        #[arg(long = "expires-in")]
        expires_in: Option<String>,
        #[arg(long)]
        iss: Option<String>,
        #[arg(long)]
        sub: Option<String>,
        #[arg(long)]
        aud: Option<String>,
        #[arg(long)]
        kid: Option<String>,
    },
    Verify {
        token: String,
        #[arg(long, env = "UTILBOX_JWT_SECRET")]
        secret: String,
        #[arg(long, default_value = "HS256", value_parser = parse_algorithm)]
        alg: Algorithm,
        #[arg(long)]
        iss: Option<String>,
        #[arg(long)]
        aud: Option<String>,
        /// Allowed clock skew, e.g. 30s.
        #[arg(long)]
        leeway: Option<String>,
    },
    Decode {
        token: String,
    },
}

fn parse_algorithm(s: &str) -> Result<Algorithm, String> {
    s.parse::<Algorithm>()
        .map_err(|e| format!("unsupported algorithm '{s}': {e}"))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    debug!(
        runtime = detect_runtime().as_str(),
        os = target_os(),
        ci = is_ci(),
        debug_build = is_debug_build(),
        "environment"
    );

    let cfg = config::load_config(cli.config.as_deref())?;
    debug!(?cfg, "loaded configuration");

    match cli.command {
        Commands::Probe { port, probe } => {
            let opts = cfg.probe_options(probe.host, probe.timeout_ms);
            let in_use = is_port_in_use(port, &opts).await?;
            let report = PortReport::new(&opts.host, port, PortState::from_reachable(in_use));
            emit(cli.format, &report, || {
                println!("{}:{} {}", report.host, report.port, report.state)
            })?;
        }
        Commands::Find {
            start,
            end,
            max_tries,
            probe,
        } => {
            let probe = cfg.probe_options(probe.host, probe.timeout_ms);
            let opts = cfg.find_options(probe, start, end, max_tries);
            let port = find_available_port(&opts).await?;
            let report = PortReport::new(&opts.probe.host, port, PortState::Available);
            emit(cli.format, &report, || println!("{port}"))?;
        }
        Commands::Batch {
            ports,
            ports_file,
            concurrency,
            probe,
        } => {
            let port_list = match (ports, ports_file) {
                (Some(p), _) => p,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read ports file: {}", path.display()))?,
                (None, None) => match cfg.batch.ports.clone() {
                    Some(p) => p,
                    None => bail!(
                        "no ports given: pass a list, --ports-file, or batch.ports in the config"
                    ),
                },
            };
            let ports = parse_ports_str(&port_list)?;
            let probe = cfg.probe_options(probe.host, probe.timeout_ms);
            let opts = cfg.batch_options(probe, concurrency);
            let results = check_multiple_ports(&ports, &opts).await?;
            let entries = results
                .iter()
                .map(|(&port, &available)| {
                    let state = PortState::from_reachable(!available);
                    PortReport::new(&opts.probe.host, port, state)
                })
                .collect();
            let report = BatchReport::from_entries(entries);
            emit(cli.format, &report, || print_batch_table(&report))?;
        }
        Commands::Wait {
            port,
            state,
            poll_ms,
            deadline_ms,
            probe,
        } => {
            let probe = cfg.probe_options(probe.host, probe.timeout_ms);
            let opts = cfg.wait_options(probe, poll_ms, deadline_ms);

            // Ctrl-C cancels the wait.
            let cancel = CancellationToken::new();
            let cancel_ctrlc = cancel.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                cancel_ctrlc.cancel();
            });

            wait_for_port_with_cancel(port, state, &opts, cancel).await?;
            let report = PortReport::new(&opts.probe.host, port, state);
            emit(cli.format, &report, || {
                println!("{}:{} is {}", report.host, report.port, report.state)
            })?;
        }
        Commands::Jwt(cmd) => run_jwt(cmd, cli.format)?,
        Commands::Duration { input, long } => {
            let d = parse_duration(&input)?;
            let out = serde_json::json!({
                "input": input,
                "ms": d.as_millis() as u64,
                "formatted": format_duration(d, long),
            });
            emit(cli.format, &out, || println!("{} ms ({})", out["ms"], format_duration(d, long)))?;
        }
    }

    Ok(())
}

fn run_jwt(cmd: JwtCmd, format: OutputFormat) -> Result<()> {
    match cmd {
        JwtCmd::Sign {
            claims,
            secret,
            alg,
            expires_in,
            iss,
            sub,
            aud,
            kid,
        } => {
            let claims: Value = serde_json::from_str(&claims).context("claims must be valid JSON")?;
            let expires_in = expires_in.as_deref().map(parse_duration).transpose()?;
            let opts = SignOptions {
                algorithm: alg,
                expires_in,
                not_before: None,
                issuer: iss,
                subject: sub,
                audience: aud,
                key_id: kid,
            };
            let token = jwt::sign(&claims, &JwtKey::secret(secret), &opts)?;
            emit(format, &serde_json::json!({ "token": token }), || println!("{token}"))
        }
        JwtCmd::Verify {
            token,
            secret,
            alg,
            iss,
            aud,
            leeway,
        } => {
            let leeway = leeway.as_deref().map(parse_duration).transpose()?.unwrap_or_default();
            let opts = VerifyOptions {
                algorithms: vec![alg],
                issuer: iss,
                audience: aud,
                leeway,
                ..VerifyOptions::default()
            };
            let claims: Value = jwt::verify(&token, &JwtKey::secret(secret), &opts)?;
            print_json(&claims)
        }
        JwtCmd::Decode { token } => {
            let decoded: jwt::DecodedToken<Value> = jwt::decode(&token)?;
            print_json(&decoded)
        }
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce()) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Text => {
            text();
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer_pretty(io::stdout().lock(), value)?;
    println!();
    Ok(())
}

fn print_batch_table(report: &BatchReport) {
    let host_w = report
        .entries
        .iter()
        .map(|e| e.host.len())
        .max()
        .unwrap_or(0)
        .max("host".len());
    let port_w = 5usize.max("port".len());
    let state_w = "available".len();

    println!(
        "\nIn use: {} (checked: {})",
        report.in_use_count, report.checked
    );
    println!(
        "{:<host_w$}  {:>port_w$}  {:<state_w$}",
        "host",
        "port",
        "state",
        host_w = host_w,
        port_w = port_w,
        state_w = state_w
    );
    println!(
        "{:-<host_w$}  {:-<port_w$}  {:-<state_w$}",
        "",
        "",
        "",
        host_w = host_w,
        port_w = port_w,
        state_w = state_w
    );
    for e in &report.entries {
        println!(
            "{:<host_w$}  {:>port_w$}  {:<state_w$}",
            e.host,
            e.port,
            e.state.as_str(),
            host_w = host_w,
            port_w = port_w,
            state_w = state_w
        );
    }
}
