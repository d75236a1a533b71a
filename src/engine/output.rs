use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::level::Severity;
use crate::error::{Error, Result};

/// Key used when the caller passes an empty key
pub const DEFAULT_KEY: &str = "Default";

/// Where admitted messages go when they are not routed to a trace file
#[derive(Debug)]
pub enum OutputTarget {
    Stderr,
    File { path: PathBuf, file: File },
}

impl OutputTarget {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Stderr => None,
            Self::File { path, .. } => Some(path),
        }
    }

    pub fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        match self {
            Self::Stderr => std::io::stderr().lock().write_all(line.as_bytes()),
            Self::File { file, .. } => file.write_all(line.as_bytes()),
        }
    }
}

/// Open a log file for appending, creating it if needed
pub fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)
        .map_err(|e| Error::io(path, e))
}

/// Format one log line: `{time} [{SEVERITY}] {key} {trace|None} {message}\n`
pub fn format_line(severity: Severity, key: &str, trace_id: &str, message: &str) -> String {
    let trace = if trace_id.is_empty() { "None" } else { trace_id };
    format!(
        "{} [{}] {} {} {}\n",
        chrono::Local::now().format("%H:%M:%S%.6f"),
        severity,
        key,
        trace,
        message
    )
}

/// Suffix appended to a rotated file name
pub fn rotation_suffix() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H-%M-%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_with_trace() {
        let line = format_line(Severity::Warn, "net", "0x007", "hello");
        assert!(line.ends_with(" [WARN] net 0x007 hello\n"));
    }

    #[test]
    fn test_format_line_without_trace() {
        let line = format_line(Severity::Debug, DEFAULT_KEY, "", "hi");
        assert!(line.ends_with(" [DEBUG] Default None hi\n"));
    }

    #[test]
    fn test_file_target_appends() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.log");
        let file = open_append(&path).unwrap();
        let mut target = OutputTarget::File {
            path: path.clone(),
            file,
        };
        target.write_line("one\n").unwrap();
        target.write_line("two\n").unwrap();
        assert_eq!(target.path(), Some(path.as_path()));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one\ntwo\n");
    }
}
