//! pageindex - frecency-ranked page history CLI
//!
//! Main entry point for the pageindex command-line tool.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use serde::Serialize;
use std::io;
use tracing::info;

use pageindex::logging::{LogConfig, init_cli_logging, init_logging};
use pageindex::*;

fn main() -> Result<()> {
    let cli = Cli::parse();
    run(&cli).inspect_err(|e| {
        if let Some(hint) = e
            .downcast_ref::<PageIndexError>()
            .and_then(PageIndexError::suggestion)
        {
            eprintln!("{} {hint}", "hint:".yellow());
        }
    })
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load();
    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }

    let quiet = cli.quiet || config.output.quiet;
    let out = Output {
        format: cli.format.unwrap_or_else(|| config.output_format()),
        quiet,
    };
    if !config.output.colors {
        colored::control::set_override(false);
    }

    match &cli.command {
        Commands::Expire(args) if args.watch && !quiet => {
            let mut log = LogConfig::daemon();
            log.colors = config.output.colors;
            if cli.verbose {
                log.level = logging::LogLevel::Debug;
            }
            init_logging(&log);
        }
        _ => init_cli_logging(quiet, cli.verbose, config.output.colors),
    }

    match &cli.command {
        Commands::Visit(args) => cmd_visit(out, &config, args),
        Commands::Suggest(args) => cmd_suggest(out, &config, args),
        Commands::Favicon(args) => cmd_favicon(out, &config, args),
        Commands::Expire(args) => cmd_expire(out, config, args),
        Commands::Forget(args) => cmd_forget(out, &config, args),
        Commands::Stats => cmd_stats(out, &config),
        Commands::Doctor(args) => cmd_doctor(out, &config, args),
        Commands::Repl => cmd_repl(&config),
        Commands::Config(args) => cmd_config(out, &config, args),
        Commands::Completions(args) => cmd_completions(args.clone()),
    }
}

/// Resolved presentation settings: CLI flags layered over config.
#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

fn open_index(config: &Config) -> Result<PageIndex> {
    let db_path = config.db_path();
    PageIndex::open_with_config(config)
        .with_context(|| format!("Failed to open page index at {}", db_path.display()))
}

fn print_json<T: Serialize + ?Sized>(format: OutputFormat, value: &T) -> Result<()> {
    let json = if matches!(format, OutputFormat::JsonPretty) {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

#[derive(Serialize)]
struct VisitReport<'a> {
    url: &'a str,
    outcome: VisitOutcome,
    visit_count: i64,
    frecency: i64,
}

fn cmd_visit(out: Output, config: &Config, args: &cli::VisitArgs) -> Result<()> {
    let icon = args
        .favicon_file
        .as_deref()
        .map(Icon::load)
        .transpose()
        .context("Failed to load favicon")?;
    let favicon_url = args.favicon_url.as_deref().unwrap_or_default();

    let index = open_index(config)?;
    let outcome = index.try_mark_visit_at(
        &args.url,
        &args.title,
        favicon_url,
        icon.as_ref(),
        Utc::now().timestamp(),
    )?;
    let page = index
        .page(&args.url)?
        .context("Visit was recorded but the page row is missing")?;

    if out.format.is_json() {
        return print_json(
            out.format,
            &VisitReport {
                url: &page.url,
                outcome,
                visit_count: page.visit_count,
                frecency: page.frecency,
            },
        );
    }

    if !out.quiet {
        let verb = match outcome {
            VisitOutcome::Inserted => "Added".green(),
            VisitOutcome::Updated => "Updated".cyan(),
        };
        println!(
            "{verb} {} {}",
            page.url.bold(),
            format!("(visits: {}, frecency: {})", page.visit_count, page.frecency).dimmed()
        );
    }
    Ok(())
}

fn cmd_suggest(out: Output, config: &Config, args: &cli::SuggestArgs) -> Result<()> {
    let text = args.text.join(" ");
    let limit = args.limit.unwrap_or(config.suggest.default_limit);
    let index = open_index(config)?;
    let results = index.suggest(&text, limit);

    if out.format.is_json() {
        return print_json(out.format, &results);
    }

    if results.is_empty() {
        println!("{}", "No suggestions.".yellow());
        return Ok(());
    }

    for (i, suggestion) in results.iter().enumerate() {
        let title = if suggestion.title.is_empty() {
            suggestion.url.as_str()
        } else {
            suggestion.title.as_str()
        };
        println!(
            "{}. {}  {}",
            (i + 1).to_string().dimmed(),
            title.bold(),
            suggestion.url.cyan()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct FaviconReport<'a> {
    favicon_url: &'a str,
    image_identity: i64,
    stored_bytes: usize,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<String>,
}

fn cmd_favicon(out: Output, config: &Config, args: &cli::FaviconArgs) -> Result<()> {
    let index = open_index(config)?;
    let entry = index
        .favicon_entry(&args.favicon_url)?
        .with_context(|| format!("No favicon stored for {}", args.favicon_url))?;
    let icon = index
        .cached_favicon(&args.favicon_url)
        .with_context(|| format!("Stored favicon for {} is not a readable PNG", entry.url))?;

    if let Some(output) = &args.output {
        let png = icon.encode_png(icon.width())?;
        std::fs::write(output, png)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    }

    if out.format.is_json() {
        return print_json(
            out.format,
            &FaviconReport {
                favicon_url: &entry.url,
                image_identity: entry.image_identity,
                stored_bytes: entry.data.len(),
                width: icon.width(),
                height: icon.height(),
                written_to: args.output.as_ref().map(|p| p.display().to_string()),
            },
        );
    }

    println!(
        "{} {}x{} {}",
        entry.url.bold(),
        icon.width(),
        icon.height(),
        format!(
            "({} stored)",
            format_bytes(u64::try_from(entry.data.len()).unwrap_or(u64::MAX))
        )
        .dimmed()
    );
    if let Some(output) = &args.output {
        println!("  {} {}", "Wrote".green(), output.display());
    }
    Ok(())
}

fn cmd_expire(out: Output, mut config: Config, args: &cli::ExpireArgs) -> Result<()> {
    if let Some(days) = args.days {
        config.expiration.threshold_seconds = days.saturating_mul(24 * 60 * 60);
    }
    let index = open_index(&config)?;

    if args.watch {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start signal runtime")?;
        let expirer = index.start_expiration()?;
        info!(
            interval_secs = config.expiration.interval_seconds,
            threshold_secs = config.expiration.threshold_seconds,
            "Expiring in the background; press Ctrl-C to stop"
        );
        let waited = runtime.block_on(tokio::signal::ctrl_c());
        expirer.stop();
        info!("Expirer stopped");
        return waited.context("Failed to listen for Ctrl-C");
    }

    let stats = index.expire_now()?;
    if out.format.is_json() {
        return print_json(out.format, &stats);
    }
    if !out.quiet {
        println!(
            "Removed {} pages and {} favicons",
            format_number(i64::try_from(stats.pages_removed).unwrap_or(i64::MAX)).cyan(),
            format_number(i64::try_from(stats.favicons_removed).unwrap_or(i64::MAX)).cyan()
        );
    }
    Ok(())
}

fn cmd_forget(out: Output, config: &Config, args: &cli::ForgetArgs) -> Result<()> {
    let index = open_index(config)?;
    let removed = index.forget(&args.url)?;

    if out.format.is_json() {
        return print_json(
            out.format,
            &serde_json::json!({ "url": args.url, "removed": removed }),
        );
    }
    if removed {
        println!("{} {}", "Forgot".green(), args.url);
    } else {
        println!("{}", format!("{} is not in history.", args.url).yellow());
    }
    Ok(())
}

fn cmd_stats(out: Output, config: &Config) -> Result<()> {
    let index = open_index(config)?;
    let stats = index.stats()?;

    if out.format.is_json() {
        return print_json(out.format, &stats);
    }

    println!("{}", "Page Index Statistics".bold().cyan());
    println!("{}", "─".repeat(40));
    println!("  {:<20} {:>12}", "Pages:", format_number(stats.pages));
    println!("  {:<20} {:>12}", "Total visits:", format_number(stats.total_visits));
    println!("  {:<20} {:>12}", "Favicons:", format_number(stats.favicons));
    println!(
        "  {:<20} {:>12}",
        "Orphan favicons:",
        format_number(stats.orphan_favicons)
    );
    if let Some(size) = stats.db_size_bytes.and_then(|s| u64::try_from(s).ok()) {
        println!("  {:<20} {:>12}", "Database size:", format_bytes(size));
    }
    println!("{}", "─".repeat(40));
    println!("  Oldest visit: {}", format_optional_date(stats.oldest_visit).green());
    println!("  Newest visit: {}", format_optional_date(stats.newest_visit).green());
    Ok(())
}

fn cmd_doctor(out: Output, config: &Config, args: &cli::DoctorArgs) -> Result<()> {
    let index = open_index(config)?;

    let checks = index.with_storage_locked(|storage| -> Result<_> {
        if args.rebuild {
            storage.rebuild_fts()?;
            info!("Rebuilt full-text index");
        }
        if args.optimize {
            storage.optimize()?;
            info!("Optimized database");
        }
        Ok(storage.health_checks())
    })?;

    if out.format.is_json() {
        print_json(out.format, &checks)?;
    } else {
        print!("{}", doctor::format_checks(&checks));
    }

    if !doctor::all_ok(&checks) {
        anyhow::bail!("Some health checks did not pass");
    }
    Ok(())
}

fn cmd_repl(config: &Config) -> Result<()> {
    let index = open_index(config)?;
    repl::run(index, config.suggest.default_limit)
}

fn cmd_config(out: Output, config: &Config, args: &cli::ConfigArgs) -> Result<()> {
    if let Some(key) = &args.get {
        let value = config.get(key).with_context(|| {
            format_unknown_value_error("config key", key, VALID_CONFIG_KEYS)
        })?;
        println!("{value}");
        return Ok(());
    }

    if args.path {
        let path = Config::user_config_path().context("Could not determine config directory")?;
        println!("{}", path.display());
        return Ok(());
    }

    if args.init {
        let path = Config::user_config_path().context("Could not determine config directory")?;
        if path.exists() {
            println!("{} {}", "Config already exists:".yellow(), path.display());
        } else {
            let written = Config::default().save()?;
            println!("{} {}", "Wrote".green(), written.display());
        }
        return Ok(());
    }

    if out.format.is_json() {
        return print_json(out.format, config);
    }

    println!("{}", "Current Configuration".bold().cyan());
    for key in VALID_CONFIG_KEYS {
        if let Some(value) = config.get(key) {
            println!("  {:<32} {value}", format!("{key}:"));
        }
    }
    Ok(())
}

fn cmd_completions(args: cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "pageindex", &mut io::stdout());
    Ok(())
}
