//! Output formatting module.
//!
//! The result table goes to stdout, one line per requested port. Banners,
//! warnings and errors go to stderr so the table can be piped.

use crate::scanner::{PortState, ScanMode, ScanVerdict};
use console::style;
use std::collections::HashSet;
use std::io::{self, Write};
use std::net::IpAddr;

/// Final verdicts of one scan, sorted by port.
#[derive(Debug, Clone)]
pub struct ScanReport {
    mode: ScanMode,
    verdicts: Vec<ScanVerdict>,
}

impl ScanReport {
    /// Collect verdicts for `requested` ports.
    ///
    /// Requested ports without a verdict become `Unknown`; duplicate
    /// verdicts keep the first one received.
    pub fn new(
        host: IpAddr,
        mode: ScanMode,
        requested: &[u16],
        verdicts: Vec<ScanVerdict>,
    ) -> Self {
        let mut seen = HashSet::with_capacity(verdicts.len());
        let mut collected: Vec<ScanVerdict> = verdicts
            .into_iter()
            .filter(|v| seen.insert(v.port))
            .collect();

        for &port in requested {
            if seen.insert(port) {
                collected.push(ScanVerdict::unknown(host, port));
            }
        }
        collected.sort_by_key(|v| v.port);

        Self {
            mode,
            verdicts: collected,
        }
    }

    pub fn verdicts(&self) -> &[ScanVerdict] {
        &self.verdicts
    }

    /// Whether anything other than a close came back.
    pub fn has_responsive(&self) -> bool {
        self.verdicts.iter().any(|v| v.state.is_responsive())
    }

    /// State as printed: an all-closed scan prints every known port closed.
    pub fn displayed_state(&self, state: PortState) -> PortState {
        match state {
            PortState::Unknown => PortState::Unknown,
            _ if self.has_responsive() => state,
            _ => PortState::Closed,
        }
    }

    /// Table lines, ascending by port.
    pub fn lines(&self) -> Vec<String> {
        let protocol = self.mode.protocol();
        let width = state_width(self.mode);

        self.verdicts
            .iter()
            .map(|v| {
                format!(
                    "{:>5}/{} {:>width$}",
                    v.port,
                    protocol,
                    self.displayed_state(v.state),
                    width = width
                )
            })
            .collect()
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for line in self.lines() {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    /// Print the table to stdout.
    pub fn print(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_to(&mut out)?;
        out.flush()
    }
}

fn state_width(mode: ScanMode) -> usize {
    match mode {
        // wide enough for "open/filtered"
        ScanMode::Udp => 13,
        ScanMode::Connect | ScanMode::Syn => 8,
    }
}

/// Print a scan header before scanning begins.
pub fn print_scan_header(target: &str, ip: IpAddr, mode: ScanMode, ports: usize) {
    eprintln!(
        "{} {} v{}",
        style("Starting").cyan(),
        style("portsweep").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{} Scan type: {}", style("•").dim(), style(mode).yellow());
    eprintln!(
        "{} Target: {} ({})",
        style("•").dim(),
        style(target).white().bold(),
        ip
    );
    eprintln!(
        "{} Scanning {} ports...",
        style("•").dim(),
        style(ports).white().bold()
    );
}

/// Print a warning message.
pub fn print_warning(msg: &str) {
    eprintln!("{} {}", style("Warning:").yellow().bold(), msg);
}
