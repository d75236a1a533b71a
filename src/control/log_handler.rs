use async_trait::async_trait;

use super::channel::{CommandHandler, Reply};
use super::protocol::{ControlCommand, Subsystem, RESPONSE_OK};
use crate::engine::LogEngine;
use crate::error::{Error, ProtocolError, Result};

/// Applies log-channel commands to an engine
#[derive(Debug, Clone)]
pub struct LogControl {
    engine: LogEngine,
}

impl LogControl {
    pub fn new(engine: LogEngine) -> Self {
        Self { engine }
    }
}

fn ok() -> Result<Reply> {
    Ok(Reply::Text(RESPONSE_OK.to_string()))
}

#[async_trait]
impl CommandHandler for LogControl {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Log
    }

    async fn handle(&self, command: ControlCommand) -> Result<Reply> {
        match command {
            ControlCommand::Level(level) => {
                self.engine.set_level(level);
                ok()
            }
            ControlCommand::Rotate => {
                self.engine.rotate()?;
                ok()
            }
            ControlCommand::TraceOn => {
                self.engine.enable_trace().await;
                ok()
            }
            ControlCommand::TraceOff => {
                self.engine.disable_trace();
                ok()
            }
            ControlCommand::AlarmOn(url) => {
                self.engine.register_alarm(&url)?;
                ok()
            }
            ControlCommand::AlarmOff => {
                self.engine.clear_alarm();
                ok()
            }
            ControlCommand::SetPath(dir) => {
                self.engine.set_default_path(&dir)?;
                ok()
            }
            ControlCommand::FileLog => self
                .engine
                .file_path()
                .map(Reply::File)
                .ok_or_else(|| Error::Configuration("No log file is active".to_string())),
            ControlCommand::Stats => Err(ProtocolError::Unsupported {
                verb: "stats",
                subsystem: "log",
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineSettings, Severity};
    use tempfile::TempDir;

    fn control(dir: &std::path::Path) -> (LogEngine, LogControl) {
        let settings = EngineSettings {
            log_dir: dir.to_path_buf(),
            ..EngineSettings::default()
        };
        let engine = LogEngine::new("svc", settings).unwrap();
        (engine.clone(), LogControl::new(engine))
    }

    #[tokio::test]
    async fn test_level_and_trace_commands() {
        let dir = TempDir::new().unwrap();
        let (engine, control) = control(dir.path());

        let reply = control
            .handle(ControlCommand::Level(Severity::Debug))
            .await
            .unwrap();
        assert_eq!(reply, Reply::Text("OK".to_string()));
        assert_eq!(engine.level(), Severity::Debug);

        control.handle(ControlCommand::TraceOn).await.unwrap();
        assert!(engine.is_trace_enabled());
        control.handle(ControlCommand::TraceOff).await.unwrap();
        assert!(!engine.is_trace_enabled());
    }

    #[tokio::test]
    async fn test_file_commands_need_an_active_file() {
        let dir = TempDir::new().unwrap();
        let (engine, control) = control(dir.path());

        assert!(control.handle(ControlCommand::Rotate).await.is_err());
        assert!(control.handle(ControlCommand::FileLog).await.is_err());

        let path = engine.open_module_file().unwrap();
        assert_eq!(
            control.handle(ControlCommand::FileLog).await.unwrap(),
            Reply::File(path)
        );
        control.handle(ControlCommand::Rotate).await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_is_not_a_log_command() {
        let dir = TempDir::new().unwrap();
        let (_engine, control) = control(dir.path());

        let err = control.handle(ControlCommand::Stats).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::Unsupported { .. })));
    }
}
