//! CLI definitions for pageindex.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// pageindex - frecency-ranked page history for address-bar autocomplete
#[derive(Parser, Debug)]
#[command(name = "pageindex")]
#[command(version)]
#[command(about = "Frecency-ranked page history and favicon cache for address-bar autocomplete")]
#[command(long_about = r#"
pageindex keeps a local history of visited pages, ranks them by how often
and how recently they were visited, and answers prefix queries the way a
browser address bar does.

Features:
  - Frecency ranking (recent and frequent pages first)
  - Word-prefix suggestions over URL and title via SQLite FTS5
  - Favicon store deduplicated by icon identity, with an in-memory cache
  - Periodic expiration of stale pages and orphaned favicons

Quick start:
  1. Record a visit:  pageindex visit https://example.com/ --title "Example"
  2. Ask for matches: pageindex suggest exa
  3. Try it live:     pageindex repl
"#)]
pub struct Cli {
    /// Path to the database file
    #[arg(long, env = "PAGEINDEX_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Output format [default: `output.format` from config, else text]
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a page visit
    Visit(VisitArgs),

    /// Suggest pages for typed text
    Suggest(SuggestArgs),

    /// Print or export the cached favicon for a favicon URL
    Favicon(FaviconArgs),

    /// Remove stale pages and orphaned favicons
    Expire(ExpireArgs),

    /// Remove a single page from history
    Forget(ForgetArgs),

    /// Show index statistics
    Stats,

    /// Check database health
    Doctor(DoctorArgs),

    /// Interactive autocomplete shell
    Repl,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct VisitArgs {
    /// Full URL including scheme (e.g. `https://example.com/`)
    pub url: String,

    /// Page title
    #[arg(long, short = 't', default_value = "")]
    pub title: String,

    /// URL the favicon was fetched from
    #[arg(long, requires = "favicon_file")]
    pub favicon_url: Option<String>,

    /// PNG file holding the favicon raster
    #[arg(long, requires = "favicon_url")]
    pub favicon_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SuggestArgs {
    /// Typed text; every word is matched as a prefix
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,

    /// Maximum number of suggestions (defaults to `suggest.default_limit`)
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct FaviconArgs {
    /// Favicon URL as recorded with a visit
    pub favicon_url: String,

    /// Write the icon as PNG to this file
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ExpireArgs {
    /// Keep expiring on the configured interval until interrupted (Ctrl-C)
    #[arg(long, short = 'w')]
    pub watch: bool,

    /// Override the age threshold in days for this run
    #[arg(long)]
    pub days: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ForgetArgs {
    /// Full URL of the page to forget
    pub url: String,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Rebuild the full-text index before checking
    #[arg(long)]
    pub rebuild: bool,

    /// Run `PRAGMA optimize` and merge FTS segments
    #[arg(long)]
    pub optimize: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show current configuration
    #[arg(long)]
    pub show: bool,

    /// Print the config file location
    #[arg(long)]
    pub path: bool,

    /// Write a default config file if none exists
    #[arg(long)]
    pub init: bool,

    /// Print a single value by dotted key (e.g. `favicon.size`)
    #[arg(long)]
    pub get: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    /// Whether output should be machine-readable.
    #[must_use]
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::JsonPretty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_suggest_joins_words() {
        let cli = Cli::try_parse_from(["pageindex", "suggest", "exa", "com", "-n", "3"]).unwrap();
        match cli.command {
            Commands::Suggest(args) => {
                assert_eq!(args.text, vec!["exa", "com"]);
                assert_eq!(args.limit, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_favicon_flags_come_together() {
        let result = Cli::try_parse_from([
            "pageindex",
            "visit",
            "https://example.com/",
            "--favicon-url",
            "https://example.com/favicon.ico",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_format_flag() {
        let cli = Cli::try_parse_from(["pageindex", "stats", "-f", "json-pretty"]).unwrap();
        assert_eq!(cli.format, Some(OutputFormat::JsonPretty));
        assert!(matches!(cli.command, Commands::Stats));

        let cli = Cli::try_parse_from(["pageindex", "stats"]).unwrap();
        assert_eq!(cli.format, None);
    }
}
