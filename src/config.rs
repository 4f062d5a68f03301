// This crate's run configuration: how much gets logged, how deep a lazy
// pipe is allowed to recurse, and where included documents are looked up.
// A small `serde`-derived struct loadable from TOML, the way the teacher's
// own config (`v1.rs`) deserializes a dashboard layout from a file -- this
// one just describes a pipeline run instead of a screen.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::value::MAX_PIPE_DEPTH;

#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq, clap::ArgEnum)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum TraceLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl TraceLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            TraceLevel::Off => log::LevelFilter::Off,
            TraceLevel::Error => log::LevelFilter::Error,
            TraceLevel::Warn => log::LevelFilter::Warn,
            TraceLevel::Info => log::LevelFilter::Info,
            TraceLevel::Debug => log::LevelFilter::Debug,
            TraceLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl Default for TraceLevel {
    fn default() -> TraceLevel {
        TraceLevel::Warn
    }
}

fn default_max_pipe_depth() -> usize {
    MAX_PIPE_DEPTH
}

/// Loaded from an optional `jample.toml` alongside the entry document, or
/// built with `Config::default()` when none is given.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub trace: TraceLevel,

    /// Upper bound on how deep a `Value::eval` pipe may recurse. Only
    /// relevant as a ceiling: the in-process constant it's checked against
    /// is fixed at compile time, so a value larger than that constant has
    /// no effect.
    #[serde(rename = "max-pipe-depth")]
    pub max_pipe_depth: usize,

    /// Extra directories searched for an `#include`d document, in order,
    /// before falling back to paths relative to the entry document.
    #[serde(rename = "search-paths")]
    pub search_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config { trace: TraceLevel::default(), max_pipe_depth: default_max_pipe_depth(), search_paths: Vec::new() }
    }
}

impl Config {
    /// Parse a TOML configuration from its already-read text.
    pub fn parse(text: &str) -> Result<Config, Error> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from `path`, or fall back to `Config::default()` if the file
    /// doesn't exist -- a missing config is not a run failure.
    pub fn load(path: &Path) -> Result<Config, Error> {
        match fs::read_to_string(path) {
            Ok(text) => Config::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(Error::Config(format!("{}: {}", path.display(), e))),
        }
    }

    /// Resolve `name` (as named by an `#include`-style directive) against
    /// the configured search paths, then the entry document's own
    /// directory, in that order.
    pub fn resolve(&self, name: &str, entry_dir: &Path) -> PathBuf {
        for dir in &self.search_paths {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return candidate;
            }
        }
        entry_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_sane_trace_level() {
        let config = Config::default();
        assert_eq!(config.trace, TraceLevel::Warn);
        assert_eq!(config.max_pipe_depth, MAX_PIPE_DEPTH);
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let config = Config::parse("trace = \"debug\"\nmax-pipe-depth = 64\n").unwrap();
        assert_eq!(config.trace, TraceLevel::Debug);
        assert_eq!(config.max_pipe_depth, 64);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let config = Config::load(Path::new("/no/such/jample.toml")).unwrap();
        assert_eq!(config.trace, TraceLevel::default());
    }

    #[test]
    fn resolve_prefers_search_paths_over_entry_dir() {
        let config = Config { search_paths: vec![PathBuf::from("/tmp")], ..Config::default() };
        let resolved = config.resolve("definitely-missing.jmp", Path::new("/also/missing"));
        assert_eq!(resolved, PathBuf::from("/also/missing/definitely-missing.jmp"));
    }
}
