//! Request-side types: ports, targets, interfaces and the scan request
//! that bundles them.

mod interface;
mod port;
mod request;
mod target;

pub use interface::{select_interface, InterfaceDescriptor};
pub use port::{PortError, PortRange, PortSpec};
pub use request::ScanRequest;
pub use target::{select_host, TargetError, TargetSpec};
