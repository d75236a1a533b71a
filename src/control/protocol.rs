use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::engine::Severity;
use crate::error::ProtocolError;

/// Reply to a successful command
pub const RESPONSE_OK: &str = "OK";

/// A request is read with a single read of at most this many bytes
pub const MAX_REQUEST_LEN: usize = 512;

/// File extension of endpoint marker paths
pub const MARKER_EXTENSION: &str = ".sock";

/// Which component a control endpoint serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Log,
    Stats,
}

impl Subsystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Stats => "stats",
        }
    }

    /// `{dir}/{subsystem}_{module}.sock`
    pub fn marker_path(&self, dir: &Path, module: &str) -> PathBuf {
        dir.join(format!("{}_{}{}", self.as_str(), module, MARKER_EXTENSION))
    }

    /// File-name glob matching every endpoint of this subsystem whose module
    /// matches `module_pattern`
    pub fn glob(&self, module_pattern: &str) -> String {
        format!("{}_{}{}", self.as_str(), module_pattern, MARKER_EXTENSION)
    }

    /// Module name encoded in a marker file name, if it belongs to this subsystem
    pub fn module_of(&self, marker: &Path) -> Option<String> {
        let name = marker.file_name()?.to_str()?;
        let module = name
            .strip_prefix(self.as_str())?
            .strip_prefix('_')?
            .strip_suffix(MARKER_EXTENSION)?;
        (!module.is_empty()).then(|| module.to_string())
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log" | "logger" => Ok(Self::Log),
            "stats" => Ok(Self::Stats),
            other => Err(format!("unknown subsystem '{}'", other)),
        }
    }
}

/// One parsed control request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Level(Severity),
    Rotate,
    TraceOn,
    TraceOff,
    AlarmOn(String),
    AlarmOff,
    SetPath(PathBuf),
    FileLog,
    Stats,
}

impl ControlCommand {
    /// Parse `verb:arg`.
    ///
    /// The verb is matched case-insensitively by substring, so `setLevel:debug`
    /// and `LEVEL:debug` both select `level`. Longer verbs that contain a
    /// shorter one (`traceoff`, `alarmoff`) are checked first.
    pub fn parse(request: &str) -> Result<Self, ProtocolError> {
        let request = request.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let (verb, arg) = match request.split_once(':') {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (request, ""),
        };
        let lowered = verb.to_lowercase();

        if lowered.contains("level") {
            arg.parse::<Severity>()
                .map(Self::Level)
                .map_err(|reason| ProtocolError::InvalidArgument {
                    verb: "level",
                    reason,
                })
        } else if lowered.contains("filelog") {
            Ok(Self::FileLog)
        } else if lowered.contains("rotate") {
            Ok(Self::Rotate)
        } else if lowered.contains("traceoff") {
            Ok(Self::TraceOff)
        } else if lowered.contains("trace") {
            Ok(Self::TraceOn)
        } else if lowered.contains("alarmoff") {
            Ok(Self::AlarmOff)
        } else if lowered.contains("alarm") {
            if arg.is_empty() {
                return Err(ProtocolError::InvalidArgument {
                    verb: "alarm",
                    reason: "missing url".to_string(),
                });
            }
            Ok(Self::AlarmOn(arg.to_string()))
        } else if lowered.contains("setpath") {
            if arg.is_empty() {
                return Err(ProtocolError::InvalidArgument {
                    verb: "setpath",
                    reason: "No path specified".to_string(),
                });
            }
            Ok(Self::SetPath(PathBuf::from(arg)))
        } else if lowered.contains("stats") {
            Ok(Self::Stats)
        } else {
            Err(ProtocolError::UnknownVerb(verb.trim().to_string()))
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Self::Level(_) => "level",
            Self::Rotate => "rotate",
            Self::TraceOn => "trace",
            Self::TraceOff => "traceoff",
            Self::AlarmOn(_) => "alarm",
            Self::AlarmOff => "alarmoff",
            Self::SetPath(_) => "setpath",
            Self::FileLog => "filelog",
            Self::Stats => "stats",
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            Self::Stats => Subsystem::Stats,
            _ => Subsystem::Log,
        }
    }

    /// Request text as sent on the wire
    pub fn to_wire(&self) -> String {
        match self {
            Self::Level(level) => format!("level:{}", level),
            Self::AlarmOn(url) => format!("alarm:{}", url),
            Self::SetPath(dir) => format!("setpath:{}", dir.display()),
            other => format!("{}:", other.verb()),
        }
    }
}
