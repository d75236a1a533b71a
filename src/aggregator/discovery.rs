use regex::Regex;
use std::path::{Path, PathBuf};

use crate::control::Subsystem;
use crate::error::{Error, Result};

/// Finds control endpoints and log files in the shared base directory.
///
/// Nothing is cached: every call lists the directory again.
#[derive(Debug, Clone)]
pub struct Discovery {
    base_dir: PathBuf,
}

/// A control endpoint found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub module: String,
    pub subsystem: Subsystem,
    pub marker: PathBuf,
}

impl Discovery {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Display form of a file-name glob, rooted at the base directory
    pub fn pattern(&self, glob: &str) -> String {
        self.base_dir.join(glob).display().to_string()
    }

    /// Files in the base directory whose name matches `glob`, sorted by name.
    /// Supports `*` and `?`.
    pub fn glob(&self, glob: &str) -> Result<Vec<PathBuf>> {
        let matcher = glob_to_regex(glob)?;
        let entries = std::fs::read_dir(&self.base_dir).map_err(|e| Error::io(&self.base_dir, e))?;

        let mut matches: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .map(|name| matcher.is_match(name))
                    .unwrap_or(false)
            })
            .map(|entry| entry.path())
            .collect();
        matches.sort();
        Ok(matches)
    }

    /// Every endpoint of `subsystem`
    pub fn endpoints(&self, subsystem: Subsystem) -> Result<Vec<Endpoint>> {
        Ok(self
            .glob(&subsystem.glob("*"))?
            .into_iter()
            .filter_map(|marker| {
                subsystem.module_of(&marker).map(|module| Endpoint {
                    module,
                    subsystem,
                    marker,
                })
            })
            .collect())
    }

    /// Marker path of one module's endpoint
    pub fn marker(&self, subsystem: Subsystem, module: &str) -> PathBuf {
        subsystem.marker_path(&self.base_dir, module)
    }

    /// Log files (`*.log*`), rotated ones included
    pub fn log_files(&self) -> Result<Vec<PathBuf>> {
        self.glob("*.log*")
    }

    /// Resolve `name` inside the base directory, refusing anything that
    /// escapes it
    pub fn resolve_file(&self, name: &str) -> Result<PathBuf> {
        let base = self
            .base_dir
            .canonicalize()
            .map_err(|e| Error::io(&self.base_dir, e))?;
        let candidate = base.join(name);
        let resolved = candidate
            .canonicalize()
            .map_err(|e| Error::io(&candidate, e))?;
        if !resolved.starts_with(&base) || !resolved.is_file() {
            return Err(Error::Configuration(format!(
                "{} is not a file in {}",
                name,
                base.display()
            )));
        }
        Ok(resolved)
    }
}

/// Module and trace names end up in file names and must stay inside the
/// directory
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
}

fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| Error::Configuration(format!("invalid pattern '{}': {}", glob, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_glob_matching() {
        let dir = TempDir::new().unwrap();
        for name in ["log_a.sock", "log_b.sock", "stats_a.sock", "a.log", "a.log.2024", "notes.txt"] {
            touch(dir.path(), name);
        }
        let discovery = Discovery::new(dir.path());

        let names = |paths: Vec<PathBuf>| -> Vec<String> {
            paths
                .iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        };

        assert_eq!(names(discovery.glob("log_*.sock").unwrap()), ["log_a.sock", "log_b.sock"]);
        assert_eq!(names(discovery.log_files().unwrap()), ["a.log", "a.log.2024"]);
        assert_eq!(names(discovery.glob("log_?.sock").unwrap()).len(), 2);
    }

    #[test]
    fn test_endpoints_carry_module_names() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "log_alpha.sock");
        touch(dir.path(), "stats_alpha.sock");
        let discovery = Discovery::new(dir.path());

        let endpoints = discovery.endpoints(Subsystem::Log).unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].module, "alpha");
        assert_eq!(endpoints[0].marker, dir.path().join("log_alpha.sock"));
    }

    #[test]
    fn test_resolve_file_stays_inside_base() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "svc.log");
        let discovery = Discovery::new(dir.path().join("."));

        assert!(discovery.resolve_file("svc.log").is_ok());
        assert!(discovery.resolve_file("../etc/passwd").is_err());
        assert!(discovery.resolve_file("missing.log").is_err());
    }

    #[test]
    fn test_safe_names() {
        assert!(is_safe_name("svc"));
        assert!(is_safe_name("0x007"));
        assert!(!is_safe_name("../svc"));
        assert!(!is_safe_name("a/b"));
        assert!(!is_safe_name(""));
    }
}
