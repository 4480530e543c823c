//! Shared data model for the winfault agent.
//!
//! This crate holds the pure selector algebra (port ranges, networks,
//! net-with-port-range units, filters) and the common error taxonomy. It
//! performs no I/O so the agent and its tests can use it freely.

pub mod errors;
pub mod filter;
pub mod net;
pub mod npr;
pub mod ports;

pub use errors::FaultError;
pub use filter::{Direction, Filter};
pub use net::{any_networks, host_net, is_single_host, parse_cidr, parse_ip_or_cidr, start_end_ip};
pub use npr::NetWithPortRange;
pub use ports::PortRange;
