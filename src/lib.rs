//! Library crate for utilbox-rs: TCP port probing, scanning and waiting,
//! plus small JWT, duration and value helpers.
pub mod duration;
pub mod env;
pub mod error;
pub mod helpers;
pub mod jwt;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod types;
pub mod watcher;

pub use error::{Error, ErrorKind, Result};
pub use probe::{is_port_available, is_port_in_use, ProbeErrorPolicy, ProbeOptions};
pub use scanner::{check_multiple_ports, find_available_port, BatchOptions, FindPortOptions};
pub use types::PortState;
pub use watcher::{wait_for_port, wait_for_port_with_cancel, WaitOptions};
