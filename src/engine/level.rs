use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Message severity, ordered from most to least severe.
///
/// A message is admitted when its severity is `<=` the configured level,
/// so `Warn` admits `Error` and `Warn` but suppresses `Info` and `Debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            _ => Self::Debug,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Warn
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lenient parse used by the `level:` control verb: case-insensitive
/// substring match, checked in the order info, warn, error, debug.
impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        if lowered.contains("info") {
            Ok(Self::Info)
        } else if lowered.contains("warn") {
            Ok(Self::Warn)
        } else if lowered.contains("error") {
            Ok(Self::Error)
        } else if lowered.contains("debug") {
            Ok(Self::Debug)
        } else {
            Err(format!("unrecognized level '{}'", s.trim()))
        }
    }
}
