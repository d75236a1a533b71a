use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::warn;

use crate::control::ControlClient;
use crate::engine::LogEngine;

/// Outcome of one endpoint in a fan-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutEntry {
    pub marker: PathBuf,
    pub outcome: Result<String, String>,
}

/// Per-endpoint results of a fan-out, in visiting order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub entries: Vec<FanOutEntry>,
}

impl FanOutReport {
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_err()).count()
    }

    /// One `{marker} {reply}` line per endpoint, then `All OK` or `Failures N`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let text = match &entry.outcome {
                Ok(reply) => reply,
                Err(error) => error,
            };
            let _ = writeln!(out, "{} {}", entry.marker.display(), text);
        }
        match self.failures() {
            0 => out.push_str("All OK"),
            n => {
                let _ = write!(out, "Failures {}", n);
            }
        }
        out
    }
}

/// Send `request` to every marker, one after another.
///
/// A failing endpoint is recorded and the walk continues.
pub async fn fan_out(
    client: &ControlClient,
    markers: &[PathBuf],
    request: &str,
    engine: &LogEngine,
) -> FanOutReport {
    let mut report = FanOutReport::default();

    for marker in markers {
        let outcome = match client.send(marker, request).await {
            Ok(reply) => {
                crate::metrics::record_fanout("ok");
                Ok(reply)
            }
            Err(e) => {
                warn!(marker = ?marker, error = %e, "Fan-out request failed");
                engine
                    .warn("", "Logger", format!("{} {}", marker.display(), e))
                    .await;
                crate::metrics::record_fanout("failed");
                Err(e.to_string())
            }
        };
        report.entries.push(FanOutEntry {
            marker: marker.clone(),
            outcome,
        });
    }

    report
}
