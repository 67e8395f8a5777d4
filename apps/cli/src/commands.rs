//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use linkscout_core::bridge::{BridgeBackend, BridgeOptions};
use linkscout_core::prompt::render_relevant_links_prompt;
use linkscout_core::search_link::{SearchLinkConfig, SearchLinkNode, SearchProgress};
use linkscout_shared::{
    AppConfig, LinkSearchInput, PipelineState, USER_PROMPT_KEY, init_config, load_config,
    validate_api_key,
};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LinkScout — find the links on a scraped page that matter for a task.
#[derive(Parser)]
#[command(
    name = "linkscout",
    version,
    about = "Ask a language model which scraped links are relevant to a task.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv). Any level also shows chunk progress.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Search a state file for relevant links and write the updated state.
    Search {
        /// Pipeline state JSON with `user_prompt`, `link_urls`, and `parsed_doc`.
        #[arg(long)]
        state: PathBuf,

        /// Write the updated state here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override the state's `user_prompt`.
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Print the instruction that would be sent for one chunk.
    Prompt {
        /// Pipeline state JSON.
        #[arg(long)]
        state: PathBuf,

        /// Zero-based chunk index.
        #[arg(long, default_value = "0")]
        chunk: usize,
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
        0 => "linkscout=info",
        1 => "linkscout=debug",
        _ => "linkscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr; stdout carries the state JSON.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
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
    let verbose = cli.verbose > 0;
    match cli.command {
        Command::Search { state, out, prompt } => {
            cmd_search(&state, out.as_deref(), prompt.as_deref(), verbose).await
        }
        Command::Prompt { state, chunk } => cmd_prompt(&state, chunk),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_search(
    state_path: &Path,
    out: Option<&Path>,
    prompt: Option<&str>,
    verbose: bool,
) -> Result<()> {
    let config = load_config()?;

    let mut state = read_state(state_path)?;
    if let Some(prompt) = prompt {
        state.insert(USER_PROMPT_KEY, prompt.into());
    }

    // Reject a bad state before paying for a bridge process.
    let input = LinkSearchInput::from_state(&state)?;
    validate_api_key(&config)?;

    let verbose = verbose || config.defaults.verbose;
    info!(
        state = %state_path.display(),
        chunks = input.parsed_doc.len(),
        links = input.link_urls.len(),
        "searching for relevant links"
    );

    let bridge = Arc::new(BridgeBackend::spawn(&BridgeOptions::from(&config.bridge)).await?);
    let node = SearchLinkNode::new(SearchLinkConfig::new(bridge.clone()).verbose(verbose))?;

    let progress = CliProgress::new(verbose);
    let result = node.execute(&input, &progress).await;
    progress.spinner.finish_and_clear();
    bridge.shutdown().await?;
    let output = result?;

    output.apply_to(&mut state);
    let json = serde_json::to_string_pretty(&state)?;

    match out {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .map_err(|e| eyre!("failed to write '{}': {e}", path.display()))?;
            info!(
                out = %path.display(),
                links_found = output.relevant_links.len(),
                "state written"
            );
        }
        None => println!("{json}"),
    }

    Ok(())
}

fn cmd_prompt(state_path: &Path, chunk: usize) -> Result<()> {
    let state = read_state(state_path)?;
    let input = LinkSearchInput::from_state(&state)?;

    let text = input.parsed_doc.get(chunk).ok_or_else(|| {
        eyre!(
            "chunk {chunk} out of range: state has {} chunk(s)",
            input.parsed_doc.len()
        )
    })?;

    println!(
        "{}",
        render_relevant_links_prompt(&input.user_prompt, &input.link_urls, text)
    );
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn read_state(path: &Path) -> Result<PipelineState> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre!("failed to read state '{}': {e}", path.display()))?;
    Ok(PipelineState::from_json_str(&content)?)
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner (hidden unless verbose).
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl SearchProgress for CliProgress {
    fn chunk_started(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing chunks [{current}/{total}]"));
    }

    fn finished(&self, _links_found: usize) {
        self.spinner.finish_and_clear();
    }
}
