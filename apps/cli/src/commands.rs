//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use gobracket_core::pipeline::{
    PageParams, ProgressReporter, RenderConfig, RenderResult, render_tournament,
};
use gobracket_shared::{AppConfig, init_config, load_config, load_config_from};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// gobracket: render online-go tournament rounds as HTML.
#[derive(Parser)]
#[command(
    name = "gobracket",
    version,
    about = "Render online-go tournament rounds, grouped by who played whom.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.gobracket/gobracket.toml).
    #[arg(long, env = "GOBRACKET_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Render a tournament to HTML.
    Render {
        /// Tournament id (defaults to the configured tournament).
        #[arg(short, long)]
        tournament: Option<u64>,

        /// Only show this player's games.
        #[arg(short, long)]
        player: Option<String>,

        /// Page query string, e.g. "?player=foo&tournament=123".
        /// Explicit flags take precedence.
        #[arg(short, long)]
        query: Option<String>,

        /// Template file: a full page containing
        /// `<template id="template:app/group">`, or a bare fragment.
        #[arg(long)]
        template: Option<PathBuf>,

        /// Write HTML here, rewriting it as rounds fill in (defaults to stdout).
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gobracket=info",
        1 => "gobracket=debug",
        _ => "gobracket=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr; stdout may carry the rendered page.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Render {
            tournament,
            player,
            query,
            template,
            out,
        } => {
            let mut params = query
                .as_deref()
                .map(PageParams::from_query)
                .unwrap_or_default();
            if tournament.is_some() {
                params.tournament = tournament;
            }
            if player.is_some() {
                params.player = player;
            }
            cmd_render(config_path.as_deref(), params, template, out).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_render(
    config_path: Option<&Path>,
    params: PageParams,
    template: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let template_path = template.or_else(|| config.render.template.as_ref().map(PathBuf::from));
    let markup = match &template_path {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .map_err(|e| eyre!("cannot read template '{}': {e}", path.display()))?,
        ),
        None => None,
    };

    let render_config = RenderConfig::from_app(&config, &params, markup);

    info!(
        tournament = render_config.tournament,
        mode = ?render_config.mode,
        template = template_path.as_ref().map(|p| p.display().to_string()),
        "rendering tournament"
    );

    let reporter = CliProgress::new(out.clone());
    let result = render_tournament(&render_config, &reporter).await?;

    match &out {
        Some(path) => std::fs::write(path, &result.html)
            .map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?,
        None => print!("{}", result.html),
    }

    // Summary goes to stderr so stdout stays a clean page.
    eprintln!();
    eprintln!("  Tournament rendered.");
    eprintln!("  Tournament: {}", render_config.tournament);
    if let Some(player) = &result.focus {
        eprintln!("  Player:     {} (#{})", player.username, player.id);
    }
    eprintln!("  Rounds:     {}", result.rounds);
    eprintln!("  Branches:   {}", result.branches_settled);
    eprintln!("  Skipped:    {}", result.issues.len());
    eprintln!("  Peak reqs:  {}", result.peak_requests);
    if let Some(path) = &out {
        eprintln!("  Output:     {}", path.display());
    }
    eprintln!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    eprintln!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
///
/// With `--out`, every paint rewrites the output file so a browser refresh
/// shows rounds filling in.
struct CliProgress {
    spinner: ProgressBar,
    out: Option<PathBuf>,
}

impl CliProgress {
    fn new(out: Option<PathBuf>) -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner, out }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn painted(&self, html: &str) {
        if let Some(path) = &self.out {
            if let Err(e) = std::fs::write(path, html) {
                warn!(path = %path.display(), error = %e, "failed to write partial render");
            }
        }
    }

    fn branch_settled(&self, key: &str, settled: usize, remaining: usize) {
        self.spinner
            .set_message(format!("Filled {key} [{settled}/{}]", settled + remaining));
    }

    fn done(&self, _result: &RenderResult) {
        self.spinner.finish_and_clear();
    }
}
