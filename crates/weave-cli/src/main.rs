//! A thin command-line wrapper around `weave-parser` (SPEC_FULL §6, §10.3):
//! parse a markdown document and dump its `DocResult` (or just its flat
//! span table) as JSON.
//!
//! Grounded on the teacher's `markdown-neuraxis-cli` crate — a binary crate
//! sitting on top of the engine library — with `clap` derive parsing
//! standing in for the teacher's raw `std::env::args` + `ratatui` TUI loop,
//! since this spec has no interactive editing surface to drive.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use weave_config::ParserOptions;

#[derive(Debug, ClapParser)]
#[command(name = "weave-cli", about = "Parse a literate DSL document into IR")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML config file (SPEC_FULL §10.3); falls back to defaults
    /// when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a markdown file and print its full DocResult as pretty JSON.
    Parse {
        file: PathBuf,
        /// Exit with a non-zero status if any block reported an error.
        #[arg(long)]
        strict: bool,
    },
    /// Parse a markdown file and print only its flat span table.
    Spans { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _options = load_options(cli.config.as_deref())?;

    match cli.command {
        Command::Parse { file, strict } => run_parse(&file, strict),
        Command::Spans { file } => run_spans(&file),
    }
}

fn load_options(config_path: Option<&std::path::Path>) -> Result<ParserOptions> {
    match config_path {
        Some(path) => Ok(ParserOptions::load_from_path(path)?.unwrap_or_default()),
        None => Ok(ParserOptions::default()),
    }
}

fn run_parse(file: &std::path::Path, strict: bool) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let result = weave_parser::parse_doc(&source, None)
        .with_context(|| format!("extracting markdown from {}", file.display()))?;

    let has_errors = result.blocks.iter().any(|b| !b.errors.is_empty());
    println!("{}", serde_json::to_string_pretty(&result)?);

    if strict && has_errors {
        anyhow::bail!("one or more blocks failed to parse cleanly");
    }
    Ok(())
}

fn run_spans(file: &std::path::Path) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    let result = weave_parser::parse_doc(&source, None)
        .with_context(|| format!("extracting markdown from {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&result.extract.spans)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_options_without_a_path_returns_defaults() {
        let opts = load_options(None).unwrap();
        assert_eq!(opts, ParserOptions::default());
    }

    #[test]
    fn load_options_from_an_existing_file_reads_it() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("weave.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "doc_id_prefix = \"nb\"").unwrap();

        let opts = load_options(Some(&path)).unwrap();
        assert_eq!(opts.doc_id_prefix, "nb");
    }
}
