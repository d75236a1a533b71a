use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use super::discovery::is_safe_name;
use super::fanout::fan_out;
use super::stream::{concatenated_body, file_body, file_list, ipc_body};
use super::AppState;
use crate::control::{ControlCommand, Subsystem};
use crate::engine::trace::is_valid_trace_id;
use crate::error::AppError;

/// Request body of `/logger/{module}` and `/stats/{module}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandRequest {
    #[serde(default)]
    pub cmd: String,
    #[serde(default)]
    pub message: String,
}

impl CommandRequest {
    /// An empty body decodes to an empty command
    pub fn decode(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(body)?)
    }
}

/// What a logger request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggerAction {
    /// Send a command to the module's control endpoint
    Forward(ControlCommand),
    /// Relay the module's `filelog:` stream
    FileLog,
    /// `{dir}/{module}.log` read from disk
    ModuleLog,
    /// `{dir}/trace_{id}.log` read from disk; empty id means every trace file
    TraceLog(String),
    /// Any file in the log directory
    File(String),
    LogList,
}

impl LoggerAction {
    pub fn parse(request: &CommandRequest) -> Result<Self, AppError> {
        let message = request.message.trim();
        let required = |what: &str| {
            if message.is_empty() {
                Err(AppError::BadRequest(format!("Missing {}", what)))
            } else {
                Ok(message.to_string())
            }
        };

        let action = match request.cmd.trim().to_lowercase().as_str() {
            "level" => Self::Forward(ControlCommand::Level(
                message.parse().map_err(AppError::BadRequest)?,
            )),
            "trace" | "traceenable" => Self::Forward(ControlCommand::TraceOn),
            "tracedisable" => Self::Forward(ControlCommand::TraceOff),
            "rotate" => Self::Forward(ControlCommand::Rotate),
            "alarmset" => Self::Forward(ControlCommand::AlarmOn(required("alarm URL")?)),
            "alarmclear" => Self::Forward(ControlCommand::AlarmOff),
            "path" => Self::Forward(ControlCommand::SetPath(PathBuf::from(required("path")?))),
            "filelog" => Self::FileLog,
            "log" => Self::ModuleLog,
            "tracelog" => Self::TraceLog(message.to_string()),
            "file" => Self::File(required("file name")?),
            "loglist" => Self::LogList,
            _ => return Err(AppError::InvalidCommand(request.cmd.clone())),
        };
        Ok(action)
    }
}

pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "logctl",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// `GET|PUT|POST /logger/{module}`
pub async fn logger_command(
    State(state): State<AppState>,
    Path(module): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4().to_string();
    state
        .engine
        .info(
            &request_id,
            "Logger",
            format!("Received logger request for module {}", module),
        )
        .await;
    let _ = state.stats.increment("logger_requests");

    let request = CommandRequest::decode(&body)?;
    let action = LoggerAction::parse(&request)?;

    if module.eq_ignore_ascii_case("all") {
        return all_modules(&state, action).await;
    }
    if !is_safe_name(&module) {
        return Err(AppError::BadRequest(format!("Invalid module name {}", module)));
    }
    single_module(&state, &module, action).await
}

/// `GET|PUT|POST /stats/{module}`. The body is ignored; the request is
/// always `stats:`.
pub async fn stats_command(
    State(state): State<AppState>,
    Path(module): Path<String>,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4().to_string();
    state
        .engine
        .info(
            &request_id,
            "Stats",
            format!("Received stats request for module {}", module),
        )
        .await;
    let _ = state.stats.increment("stats_requests");

    let request = ControlCommand::Stats.to_wire();

    if module.eq_ignore_ascii_case("all") {
        return fan_out_to(&state, Subsystem::Stats, &request).await;
    }
    if !is_safe_name(&module) {
        return Err(AppError::BadRequest(format!("Invalid module name {}", module)));
    }

    let marker = state.discovery.marker(Subsystem::Stats, &module);
    let reply = state
        .client
        .send(&marker, &request)
        .await
        .map_err(|e| AppError::ModuleNotFound {
            module: module.clone(),
            reason: e.to_string(),
        })?;
    Ok(reply.into_response())
}

async fn single_module(
    state: &AppState,
    module: &str,
    action: LoggerAction,
) -> Result<Response, AppError> {
    let marker = state.discovery.marker(Subsystem::Log, module);
    let not_found = |e: crate::error::Error| AppError::ModuleNotFound {
        module: module.to_string(),
        reason: e.to_string(),
    };

    match action {
        LoggerAction::Forward(command) => {
            let reply = state
                .client
                .send(&marker, &command.to_wire())
                .await
                .map_err(not_found)?;
            Ok(reply.into_response())
        }
        LoggerAction::FileLog => {
            let stream = state
                .client
                .open_stream(&marker, &ControlCommand::FileLog.to_wire())
                .await
                .map_err(not_found)?;
            Ok(text_body(ipc_body(stream)))
        }
        LoggerAction::ModuleLog => {
            let path = state.discovery.base_dir().join(format!("{}.log", module));
            open_file(state, &path).await
        }
        LoggerAction::TraceLog(trace_id) => {
            if trace_id.is_empty() {
                return Err(AppError::BadRequest("Missing trace Id".to_string()));
            }
            trace_log(state, &trace_id).await
        }
        LoggerAction::File(name) => file(state, &name).await,
        LoggerAction::LogList => log_list(state),
    }
}

async fn all_modules(state: &AppState, action: LoggerAction) -> Result<Response, AppError> {
    match action {
        LoggerAction::Forward(command) => {
            fan_out_to(state, Subsystem::Log, &command.to_wire()).await
        }
        LoggerAction::ModuleLog => {
            let files = state.discovery.log_files()?;
            concatenate(state, files, "*.log*")
        }
        LoggerAction::TraceLog(trace_id) if trace_id.is_empty() => {
            let files = state.discovery.glob("trace_*.log")?;
            concatenate(state, files, "trace_*.log")
        }
        LoggerAction::TraceLog(trace_id) => trace_log(state, &trace_id).await,
        LoggerAction::File(name) => file(state, &name).await,
        LoggerAction::LogList => log_list(state),
        LoggerAction::FileLog => Err(AppError::InvalidCommand("filelog".to_string())),
    }
}

async fn fan_out_to(
    state: &AppState,
    subsystem: Subsystem,
    request: &str,
) -> Result<Response, AppError> {
    let markers: Vec<PathBuf> = state
        .discovery
        .endpoints(subsystem)?
        .into_iter()
        .map(|endpoint| endpoint.marker)
        .collect();

    if markers.is_empty() {
        let pattern = state.discovery.pattern(&subsystem.glob("*"));
        return Ok(format!("No endpoints found for pattern {}", pattern).into_response());
    }

    let report = fan_out(&state.client, &markers, request, &state.engine).await;
    Ok(report.render().into_response())
}

async fn trace_log(state: &AppState, trace_id: &str) -> Result<Response, AppError> {
    if !is_valid_trace_id(trace_id) {
        return Err(AppError::BadRequest(format!("Invalid trace Id {}", trace_id)));
    }
    let path = state
        .discovery
        .base_dir()
        .join(format!("trace_{}.log", trace_id));
    open_file(state, &path).await
}

async fn file(state: &AppState, name: &str) -> Result<Response, AppError> {
    let path = state
        .discovery
        .resolve_file(name)
        .map_err(|e| AppError::FileUnavailable(e.to_string()))?;
    open_file(state, &path).await
}

async fn open_file(state: &AppState, path: &std::path::Path) -> Result<Response, AppError> {
    state
        .engine
        .info("", "Logger", format!("Opening file {}", path.display()))
        .await;
    match file_body(path).await {
        Ok(body) => Ok(text_body(body)),
        Err(e) => {
            state.engine.warn("", "Logger", e.to_string()).await;
            Err(e)
        }
    }
}

fn concatenate(state: &AppState, files: Vec<PathBuf>, glob: &str) -> Result<Response, AppError> {
    if files.is_empty() {
        let pattern = state.discovery.pattern(glob);
        return Ok(format!("No logs found for pattern {}", pattern).into_response());
    }
    Ok(text_body(concatenated_body(files)))
}

fn log_list(state: &AppState) -> Result<Response, AppError> {
    let files = state.discovery.log_files()?;
    Ok(file_list(&files).into_response())
}

fn text_body(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Severity;

    fn request(cmd: &str, message: &str) -> CommandRequest {
        CommandRequest {
            cmd: cmd.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_decode_body() {
        let decoded = CommandRequest::decode(br#"{"Cmd":"Rotate"}"#).unwrap();
        assert_eq!(decoded, request("Rotate", ""));
        assert_eq!(CommandRequest::decode(b"").unwrap(), CommandRequest::default());
        assert!(CommandRequest::decode(b"{not json").is_err());
    }

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            LoggerAction::parse(&request("Level", "debug")).unwrap(),
            LoggerAction::Forward(ControlCommand::Level(Severity::Debug))
        );
        assert_eq!(
            LoggerAction::parse(&request("traceEnable", "")).unwrap(),
            LoggerAction::Forward(ControlCommand::TraceOn)
        );
        assert_eq!(
            LoggerAction::parse(&request("path", "/var/log")).unwrap(),
            LoggerAction::Forward(ControlCommand::SetPath(PathBuf::from("/var/log")))
        );
        assert_eq!(
            LoggerAction::parse(&request("traceLog", "0x007")).unwrap(),
            LoggerAction::TraceLog("0x007".to_string())
        );
        assert_eq!(
            LoggerAction::parse(&request("loglist", "")).unwrap(),
            LoggerAction::LogList
        );
    }

    #[test]
    fn test_parse_rejections() {
        let err = LoggerAction::parse(&request("Explode", "")).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Command Explode");
        assert!(LoggerAction::parse(&request("alarmSet", "")).is_err());
        assert!(LoggerAction::parse(&request("level", "loud")).is_err());
    }
}
