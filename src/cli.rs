// Command-line surface, kept thin: argument parsing only, no pipeline
// logic. `src/bin/jample.rs` is the actual entry point; this module exists
// so the argument shape can be unit-tested without a process boundary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::TraceLevel;

#[derive(Parser, Debug)]
#[clap(name = "jample", version, about = "Runs a template document through the full parse/analyze/compile/execute pipeline")]
pub struct Cli {
    /// Document to run.
    pub file: PathBuf,

    /// Config file to load. Defaults to `jample.toml` next to `file`.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Override the configured trace level regardless of what the config
    /// file says.
    #[clap(short, long, arg_enum)]
    pub trace: Option<TraceLevel>,
}

impl Cli {
    /// The config path to actually try: `--config` if given, else a
    /// `jample.toml` sibling of the entry document.
    pub fn config_path(&self) -> PathBuf {
        match &self.config {
            Some(path) => path.clone(),
            None => self.file.with_file_name("jample.toml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_config_path_to_a_sibling_of_the_entry_file() {
        let cli = Cli::parse_from(["jample", "docs/page.jmp"]);
        assert_eq!(cli.config_path(), PathBuf::from("docs/jample.toml"));
    }

    #[test]
    fn explicit_config_path_overrides_the_default() {
        let cli = Cli::parse_from(["jample", "page.jmp", "--config", "other.toml"]);
        assert_eq!(cli.config_path(), PathBuf::from("other.toml"));
    }
}
