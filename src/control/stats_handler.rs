use async_trait::async_trait;
use std::sync::Arc;

use super::channel::{CommandHandler, Reply};
use super::protocol::{ControlCommand, Subsystem};
use crate::error::{ProtocolError, Result};
use crate::stats::StatsCollector;

/// Serves `stats:` snapshots of a collector
#[derive(Debug, Clone)]
pub struct StatsControl {
    stats: Arc<StatsCollector>,
}

impl StatsControl {
    pub fn new(stats: Arc<StatsCollector>) -> Self {
        Self { stats }
    }
}

#[async_trait]
impl CommandHandler for StatsControl {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Stats
    }

    async fn handle(&self, command: ControlCommand) -> Result<Reply> {
        match command {
            ControlCommand::Stats => Ok(Reply::Text(self.stats.snapshot()?)),
            other => Err(ProtocolError::Unsupported {
                verb: other.verb(),
                subsystem: "stats",
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_stats_is_served() {
        let stats = Arc::new(StatsCollector::new("svc").unwrap());
        stats.add_key("hits", 3i64).unwrap();
        let control = StatsControl::new(stats);

        match control.handle(ControlCommand::Stats).await.unwrap() {
            Reply::Text(json) => assert!(json.contains("\"hits\": 3")),
            other => panic!("unexpected reply {:?}", other),
        }
        assert!(control.handle(ControlCommand::Rotate).await.is_err());
    }
}
