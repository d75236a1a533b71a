use anyhow::Context;
use metrics::{counter, describe_counter, gauge, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe the crate's counters.
///
/// Fails if a recorder is already installed in this process.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    init_metric_descriptions();

    Ok(handle)
}

fn init_metric_descriptions() {
    describe_counter!(
        "logctl_control_commands_total",
        "Control channel commands handled, by subsystem, verb and outcome"
    );
    describe_counter!(
        "logctl_alarms_total",
        "Alarm messages by outcome (sent, failed, dropped)"
    );
    describe_counter!(
        "logctl_trace_evictions_total",
        "Trace entries evicted by the reaper"
    );
    describe_counter!(
        "logctl_trace_lock_contention_total",
        "Trace writes that fell back to the main output after lock retries"
    );
    describe_counter!(
        "logctl_fanout_requests_total",
        "Per-endpoint fan-out requests by outcome"
    );
    describe_gauge!("logctl_info", "Build information");

    gauge!("logctl_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record one handled control command
pub fn record_control_command(subsystem: &str, verb: &str, outcome: &str) {
    counter!(
        "logctl_control_commands_total",
        "subsystem" => subsystem.to_string(),
        "verb" => verb.to_string(),
        "outcome" => outcome.to_string(),
    )
    .increment(1);
}

pub fn record_alarm(outcome: &str) {
    counter!("logctl_alarms_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_trace_evictions(count: u64) {
    counter!("logctl_trace_evictions_total").increment(count);
}

pub fn record_trace_contention() {
    counter!("logctl_trace_lock_contention_total").increment(1);
}

/// Record one endpoint visited during a fan-out
pub fn record_fanout(outcome: &str) {
    counter!("logctl_fanout_requests_total", "outcome" => outcome.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_recorder() {
        init_metric_descriptions();

        record_control_command("log", "level", "ok");
        record_alarm("sent");
        record_trace_evictions(3);
        record_trace_contention();
        record_fanout("failed");
    }
}
