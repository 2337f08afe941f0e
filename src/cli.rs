//! Command-line interface for portsweep.
//!
//! Uses `clap` derive macros for declarative argument parsing.

use crate::config::ScanSettings;
use crate::error::{CliResult, ScanError};
use crate::output;
use crate::scanner::{self, ScanMode};
use crate::types::{select_interface, PortSpec, ScanRequest, TargetSpec};
use clap::Parser;
use std::path::PathBuf;

/// Port-state reconnaissance over TCP connect, SYN and UDP.
#[derive(Parser, Debug)]
#[command(name = "portsweep")]
#[command(version)]
#[command(about = "Probe which ports of a host are open, closed or filtered", long_about = None)]
pub struct Cli {
    /// Target IP address or hostname to scan
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Ports to scan (e.g., "80", "80,443", "1-1000", "22,80,443,8000-9000")
    #[arg(short, long)]
    pub ports: PortSpec,

    /// Scan type to use [default: from settings, else connect]
    #[arg(short = 's', long = "scan-type", value_enum)]
    pub scan_type: Option<ScanMode>,

    /// Network interface to capture on
    #[arg(short = 'i', long)]
    pub interface: Option<String>,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH", env = "PORTSWEEP_CONFIG")]
    pub config: Option<PathBuf>,

    /// TCP connect timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub tcp_timeout: Option<u64>,

    /// SYN reply timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub syn_timeout: Option<u64>,

    /// ICMP wait per UDP probe in milliseconds
    #[arg(long, value_name = "MS")]
    pub udp_timeout: Option<u64>,

    /// UDP ports probed per batch
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Extra rounds for silent UDP ports
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,

    /// Verbose output (debug logging)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Settings from the file, with command-line overrides applied.
    pub fn settings(&self) -> CliResult<ScanSettings> {
        let mut settings = match &self.config {
            Some(path) => ScanSettings::load_from(path)?,
            None => ScanSettings::load()?,
        };

        if let Some(ms) = self.tcp_timeout {
            settings.tcp_timeout_ms = ms;
        }
        if let Some(ms) = self.syn_timeout {
            settings.syn_timeout_ms = ms;
        }
        if let Some(ms) = self.udp_timeout {
            settings.udp_timeout_ms = ms;
        }
        if let Some(n) = self.batch_size {
            settings.udp_batch_size = n;
        }
        if let Some(n) = self.retries {
            settings.udp_retries = n;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// The requested mode, falling back to the settings default.
    pub fn mode(&self, settings: &ScanSettings) -> CliResult<ScanMode> {
        match self.scan_type {
            Some(mode) => Ok(mode),
            None => Ok(settings.default_mode()?),
        }
    }
}

/// Run a scan as described by the command line and print the table.
pub async fn run(cli: Cli) -> CliResult<()> {
    let settings = cli.settings()?;
    let mode = cli.mode(&settings)?;

    if cli.ports.is_empty() {
        return Err(crate::types::PortError::Empty.into());
    }

    let target = TargetSpec::parse(&cli.target)?;
    let hosts = target.resolve().await?;
    let interface = select_interface(cli.interface.as_deref()).map_err(ScanError::from)?;
    tracing::debug!(%interface, "selected interface");

    let request = ScanRequest::new(hosts, cli.ports.to_ports(), mode, interface);
    let host = request.selected_host()?;

    if mode.requires_privileges() && !is_root() {
        output::print_warning(&format!(
            "{} scanning captures raw frames and usually needs root/sudo",
            mode
        ));
    }

    output::print_scan_header(&target.to_string(), host, mode, request.ports().len());

    let report = scanner::run_scan(&request, &settings).await?;
    report.print()?;

    Ok(())
}

fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}
