//! ICMP latency probe via the host's `ping` utility.
//!
//! Latency is scraped from the utility's human-readable summary line
//! (`rtt min/avg/max/mdev = 0.031/0.045/0.061/0.012 ms` on iputils,
//! `round-trip min/avg/max = ...` on busybox). This couples the probe to that
//! output format and its locale; a change there surfaces as
//! [`ProbeError::UnparsableOutput`], never as a wrong number.

use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::ProbeError;
use crate::config::ProbeConfig;

/// Pattern for the `min/avg/max` triad in the summary line.
fn rtt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // (\d+\.\d+) - min
        // (\d+\.\d+) - avg (the value we report)
        // (\d+\.\d+) - max
        Regex::new(r"(\d+\.\d+)/(\d+\.\d+)/(\d+\.\d+)").expect("valid rtt regex")
    })
}

/// Extract the average round-trip time in milliseconds from `ping -q` output.
pub fn parse_average_rtt(output: &str) -> Result<f64, ProbeError> {
    let captures = rtt_pattern()
        .captures(output)
        .ok_or(ProbeError::UnparsableOutput)?;
    let avg: f64 = captures[2].parse()?;

    if avg <= 0.0 {
        return Err(ProbeError::InvalidLatency(avg));
    }
    Ok(avg)
}

/// Runs a bounded number of echo requests against a host
#[derive(Debug, Clone)]
pub struct PingProbe {
    binary: String,
    count: u32,
    timeout_secs: u64,
}

impl PingProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            binary: config.ping_binary.clone(),
            count: config.ping_count,
            timeout_secs: config.ping_timeout_seconds,
        }
    }

    fn command(&self, host: &str) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-c")
            .arg(self.count.to_string())
            .arg("-W")
            .arg(self.timeout_secs.to_string())
            .arg("-q")
            .arg("--")
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Ping `host` and return the average latency in milliseconds.
    ///
    /// The child is killed if `cancel` fires before it exits.
    #[tracing::instrument(name = "ping_probe", skip(self, cancel))]
    pub async fn run(&self, host: &str, cancel: &CancellationToken) -> Result<f64, ProbeError> {
        if cancel.is_cancelled() {
            return Err(ProbeError::PingFailed);
        }

        let start = Instant::now();
        let child = self.command(host).spawn().map_err(|e| {
            tracing::warn!(binary = %self.binary, error = %e, "Failed to spawn ping");
            ProbeError::PingFailed
        })?;

        // Dropping the wait future drops the child, and kill_on_drop reaps it.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Ping cancelled, killing child");
                return Err(ProbeError::PingFailed);
            }
            output = child.wait_with_output() => output.map_err(|e| {
                tracing::debug!(error = %e, "Failed to collect ping output");
                ProbeError::PingFailed
            })?,
        };

        if !output.status.success() {
            tracing::debug!(
                status = ?output.status.code(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Ping exited unsuccessfully"
            );
            return Err(ProbeError::PingFailed);
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        parse_average_rtt(&combined)
    }
}
