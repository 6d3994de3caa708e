//! Interactive REPL for pageindex.
//!
//! Every plain line is treated as address-bar input and answered with
//! suggestions. Lines starting with `:` are commands.

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, EditMode, Editor};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::{PageIndex, Suggestion};

/// REPL session state.
pub struct ReplSession {
    index: PageIndex,
    limit: usize,
    last_results: Vec<Suggestion>,
    history_path: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Suggest { text: String },
    Visit { url: String, title: String },
    Open { number: usize },
    Forget { url: String },
    Expire,
    Stats,
    Help,
    Quit,
}

/// Run the REPL session.
///
/// # Errors
///
/// Returns an error if readline setup or history persistence fails.
pub fn run(index: PageIndex, limit: usize) -> Result<()> {
    let config = Config::builder()
        .history_ignore_space(true)
        .history_ignore_dups(true)?
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = crate::default_data_dir().join("repl_history");

    let mut session = ReplSession {
        index,
        limit,
        last_results: Vec::new(),
        history_path,
    };

    let _ = rl.load_history(&session.history_path);

    info!("Starting pageindex REPL session");
    println!(
        "{}",
        "Type to get suggestions. ':help' for commands, ':quit' to exit.".cyan()
    );
    println!();

    loop {
        let prompt = session.format_prompt();
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if !matches!(line, ":quit" | ":q") {
                    rl.add_history_entry(line)?;
                }

                debug!(input = %line, "REPL input");
                match session.execute(line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => {
                        warn!(error = %e, "REPL command failed");
                        eprintln!("{}: {e}", "Error".red());
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                return Err(anyhow::anyhow!(e)).context("Readline failed");
            }
        }
    }

    if let Some(parent) = session.history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    if let Err(e) = rl.save_history(&session.history_path) {
        warn!(error = %e, "Could not save REPL history");
    }
    info!("Ended pageindex REPL session");
    Ok(())
}

impl ReplSession {
    fn format_prompt(&self) -> String {
        if self.last_results.is_empty() {
            "pageindex> ".to_string()
        } else {
            format!("pageindex [{}]> ", self.last_results.len())
        }
    }

    fn execute(&mut self, input: &str) -> Result<bool> {
        match parse_command(input)? {
            Command::Suggest { text } => {
                self.last_results = self.index.suggest(&text, self.limit);
                print_suggestions(&self.last_results);
            }
            Command::Visit { url, title } => self.record_visit(&url, &title)?,
            Command::Open { number } => {
                let picked = number
                    .checked_sub(1)
                    .and_then(|idx| self.last_results.get(idx))
                    .cloned()
                    .with_context(|| format!("No suggestion #{number}"))?;
                self.record_visit(&picked.url, &picked.title)?;
            }
            Command::Forget { url } => {
                if self.index.forget(&url)? {
                    println!("{} {url}", "Forgot".green());
                } else {
                    println!("{}", "Not in history.".yellow());
                }
            }
            Command::Expire => {
                let stats = self.index.expire_now()?;
                println!(
                    "Removed {} pages and {} favicons",
                    stats.pages_removed.to_string().cyan(),
                    stats.favicons_removed.to_string().cyan()
                );
            }
            Command::Stats => {
                let stats = self.index.stats()?;
                println!("  {:<16} {}", "Pages:", crate::format_number(stats.pages));
                println!("  {:<16} {}", "Favicons:", crate::format_number(stats.favicons));
                println!(
                    "  {:<16} {}",
                    "Visits:",
                    crate::format_number(stats.total_visits)
                );
            }
            Command::Help => print_help(),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    fn record_visit(&self, url: &str, title: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let outcome = self.index.try_mark_visit_at(url, title, "", None, now)?;
        debug!(url = %url, ?outcome, "Visit recorded from REPL");
        println!("{} {url}", "Visited".green());
        Ok(())
    }
}

fn parse_command(input: &str) -> Result<Command> {
    let Some(rest) = input.strip_prefix(':') else {
        return Ok(Command::Suggest {
            text: input.to_string(),
        });
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match name {
        "visit" | "v" => {
            let (url, title) = args
                .split_first()
                .context("Usage: :visit <url> [title]")?;
            Ok(Command::Visit {
                url: (*url).to_string(),
                title: title.join(" "),
            })
        }
        "open" | "o" => {
            let number = args
                .first()
                .context("Usage: :open <n>")?
                .parse()
                .context("Suggestion number must be a positive integer")?;
            Ok(Command::Open { number })
        }
        "forget" => {
            let url = args.first().context("Usage: :forget <url>")?;
            Ok(Command::Forget {
                url: (*url).to_string(),
            })
        }
        "expire" => Ok(Command::Expire),
        "stats" => Ok(Command::Stats),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        _ => anyhow::bail!("Unknown command: :{name}. Type ':help' for available commands."),
    }
}

fn print_suggestions(results: &[Suggestion]) {
    if results.is_empty() {
        println!("{}", "No matches.".dimmed());
        return;
    }
    for (idx, suggestion) in results.iter().enumerate() {
        let marker = if suggestion.favicon.is_some() { "*" } else { " " };
        println!(
            "{:>3}.{} {}  {}",
            idx + 1,
            marker,
            suggestion.title.bold(),
            suggestion.url.dimmed()
        );
    }
}

fn print_help() {
    println!("{}", "Input:".bold().cyan());
    println!("  <text>               suggest pages matching every word as a prefix");
    println!("{}", "Commands:".bold().cyan());
    println!("  :visit <url> [title] record a visit");
    println!("  :open <n>            visit suggestion number n");
    println!("  :forget <url>        remove a page from history");
    println!("  :expire              run one expiration pass");
    println!("  :stats               show index statistics");
    println!("  :help                show this help");
    println!("  :quit                exit");
}
