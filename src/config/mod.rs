//! Configuration management for portsweep.
//!
//! Provides XDG-compliant settings storage for scan tunables.

mod settings;

pub use settings::{Paths, ScanSettings};
