use crate::error::{Error, Result};
use std::collections::HashSet;

pub const MIN_PORT: u16 = 1;
pub const MAX_PORT: u16 = 65535;

/// Check that `value` is a usable TCP port (1..=65535).
///
/// Takes a wide integer so callers holding untrusted input (config values,
/// CLI arguments) can validate before narrowing.
pub fn validate_port(value: i64) -> Result<u16> {
    if value < i64::from(MIN_PORT) || value > i64::from(MAX_PORT) {
        return Err(Error::InvalidPort { port: value });
    }
    Ok(value as u16)
}

/// Validate every port in `ports`, failing on the first invalid one.
pub fn validate_ports(ports: &[u16]) -> Result<()> {
    for &p in ports {
        validate_port(i64::from(p))?;
    }
    Ok(())
}

/// Parse a port list into a deduplicated list of TCP ports (1..=65535).
///
/// Supported formats, separated by newlines or commas:
/// - single port number: `80`
/// - inclusive range: `8000-8010`
/// - comments: everything after `#` on a line is ignored
/// - whitespace and blank entries are ignored
///
/// First appearance order is preserved.
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>> {
    let mut out: Vec<u16> = Vec::new();
    let mut seen = HashSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().unwrap_or("");

        for item in line.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            if let Some((a, b)) = item.split_once('-') {
                let start = parse_port_str(a.trim(), line_no)?;
                let end = parse_port_str(b.trim(), line_no)?;
                if start > end {
                    return Err(Error::InvalidRange { start, end });
                }
                for p in start..=end {
                    if seen.insert(p) {
                        out.push(p);
                    }
                }
                continue;
            }

            let p = parse_port_str(item, line_no)?;
            if seen.insert(p) {
                out.push(p);
            }
        }
    }

    Ok(out)
}

fn parse_port_str(s: &str, line_no: usize) -> Result<u16> {
    let val: i64 = s
        .parse()
        .map_err(|e| Error::invalid("port list", format!("line {line_no}: '{s}': {e}")))?;
    validate_port(val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn validate_accepts_bounds() {
        assert_eq!(validate_port(1).unwrap(), 1);
        assert_eq!(validate_port(65535).unwrap(), 65535);
    }

    #[test]
    fn validate_rejects_outside_bounds() {
        for bad in [i64::MIN, -1, 0, 65536, 70000, i64::MAX] {
            let err = validate_port(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "value {bad}");
        }
    }

    #[test]
    fn validate_ports_fails_on_zero() {
        assert!(validate_ports(&[80, 443]).is_ok());
        assert!(validate_ports(&[80, 0, 443]).is_err());
    }

    #[test]
    fn parse_single_ports() {
        let input = "80\n22\n   443  \n";
        let ports = parse_ports_str(input).unwrap();
        assert_eq!(ports, vec![80, 22, 443]);
    }

    #[test]
    fn parse_commas_ranges_and_dedup() {
        let ports = parse_ports_str("8000-8002, 80,8001").unwrap();
        assert_eq!(ports, vec![8000, 8001, 8002, 80]);
    }

    #[test]
    fn parse_with_comments_and_whitespace() {
        let input = r#"
            # local dev servers
            3000  # web
            5432 # postgres
            8000-8002

        "#;
        let ports = parse_ports_str(input).unwrap();
        assert_eq!(ports, vec![3000, 5432, 8000, 8001, 8002]);
    }

    #[test]
    fn invalid_values_error() {
        assert!(parse_ports_str("70000\n").is_err());
        assert!(parse_ports_str("http").is_err());
        assert!(matches!(
            parse_ports_str("10-5"),
            Err(Error::InvalidRange { start: 10, end: 5 })
        ));
    }
}
