//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::info;

use postforge_core::{AgentEvent, EventSink, GenerateRequest, Orchestrator, PipelineRunState};
use postforge_prompts::TemplateStore;
use postforge_provider::GeminiCapability;
use postforge_shared::{
    AppConfig, PipelineConfig, ProviderConfig, init_config, load_config, load_config_from,
};

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// postforge: research-backed LinkedIn posts from a single field name.
#[derive(Parser)]
#[command(
    name = "postforge",
    version,
    about = "Discover trending topics, research them, and draft LinkedIn posts.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.postforge/postforge.toml).
    #[arg(long, global = true, env = "POSTFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Template collection, overriding `[templates] path`.
    #[arg(long, global = true)]
    pub templates: Option<PathBuf>,

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
    /// Run the full pipeline: trending topics, research, post generation.
    Generate {
        /// Professional field, e.g. "Artificial Intelligence".
        field: String,

        /// Additional context for the prompts.
        #[arg(short, long, default_value = "")]
        context: String,

        /// Print events as JSON lines instead of a spinner.
        #[arg(long)]
        json: bool,

        /// Write the whole run (topics, report, posts) to a JSON file.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Identify trending topics in a field.
    Trending {
        /// Professional field.
        field: String,
    },

    /// Refine a post according to feedback.
    Refine {
        /// Post text. Use `@path` to read it from a file.
        #[arg(long)]
        post: String,

        /// What to change.
        #[arg(long)]
        feedback: String,
    },

    /// Serve the pipeline over HTTP (SSE).
    Serve {
        /// Listen address, overriding `[server] host`.
        #[arg(long)]
        host: Option<String>,
    },

    /// List the loaded prompt templates and their placeholders.
    Templates,

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
        0 => "postforge=info",
        1 => "postforge=debug",
        _ => "postforge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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
    let ctx = Context {
        config_path: cli.config,
        templates_path: cli.templates,
    };

    match cli.command {
        Command::Generate {
            field,
            context,
            json,
            out,
        } => cmd_generate(&ctx, field, context, json, out.as_deref()).await,
        Command::Trending { field } => cmd_trending(&ctx, &field).await,
        Command::Refine { post, feedback } => cmd_refine(&ctx, &post, &feedback).await,
        Command::Serve { host } => cmd_serve(&ctx, host).await,
        Command::Templates => cmd_templates(&ctx),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&ctx),
        },
    }
}

/// Global flags every command resolves its inputs through.
struct Context {
    config_path: Option<PathBuf>,
    templates_path: Option<PathBuf>,
}

impl Context {
    fn config(&self) -> Result<AppConfig> {
        let config = match &self.config_path {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        Ok(config)
    }

    fn templates(&self, config: &AppConfig) -> Result<TemplateStore> {
        let path = self
            .templates_path
            .clone()
            .or_else(|| config.templates.path.as_ref().map(PathBuf::from));
        let store = match path {
            Some(path) => TemplateStore::load_from(&path)?,
            None => TemplateStore::builtin()?,
        };
        Ok(store)
    }

    /// Config, templates and the Gemini capability wired into one orchestrator.
    fn orchestrator(&self) -> Result<(AppConfig, Orchestrator)> {
        let config = self.config()?;
        let templates = self.templates(&config)?;
        let provider = ProviderConfig::from_env(&config)?;
        let capability = GeminiCapability::new(&provider)?;
        let orchestrator = Orchestrator::new(
            Arc::new(templates),
            Arc::new(capability),
            PipelineConfig::from(&config),
        )?;
        Ok((config, orchestrator))
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    ctx: &Context,
    field: String,
    context: String,
    json: bool,
    out: Option<&Path>,
) -> Result<()> {
    let (config, orchestrator) = ctx.orchestrator()?;
    info!(field = %field, "generating posts");

    let (mut sink, rx) = EventSink::channel(32);
    let display = tokio::spawn(display_events(rx, json));

    let result = orchestrator
        .run(&GenerateRequest::new(field, context), &mut sink)
        .await;
    drop(sink);
    display
        .await
        .map_err(|e| eyre!("event display task failed: {e}"))??;

    let state = result?;

    if !json {
        print_posts(&state, &config);
    }

    if let Some(path) = out {
        write_run(path, &state)?;
        if !json {
            println!("  Saved run to {}", path.display());
        }
    }

    Ok(())
}

async fn cmd_trending(ctx: &Context, field: &str) -> Result<()> {
    let (_, orchestrator) = ctx.orchestrator()?;
    let spinner = spinner()?;
    spinner.set_message(format!("Identifying trending topics in {field}"));

    let result = orchestrator.trending(field).await;
    spinner.finish_and_clear();

    println!("{}", result?);
    Ok(())
}

async fn cmd_refine(ctx: &Context, post: &str, feedback: &str) -> Result<()> {
    let post = match post.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read post from {path}"))?,
        None => post.to_string(),
    };

    let (_, orchestrator) = ctx.orchestrator()?;
    let spinner = spinner()?;
    spinner.set_message("Refining post");

    let result = orchestrator.refine(&post, feedback).await;
    spinner.finish_and_clear();

    println!("{}", result?);
    Ok(())
}

async fn cmd_serve(ctx: &Context, host: Option<String>) -> Result<()> {
    let (config, orchestrator) = ctx.orchestrator()?;
    let mut server_config = config.server.clone();
    if let Some(host) = host {
        server_config.host = host;
    }
    server::serve(orchestrator, &server_config).await
}

fn cmd_templates(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let store = ctx.templates(&config)?;

    for template in store.iter() {
        let placeholders: Vec<&str> = template.placeholders().into_iter().collect();
        println!("{}", template.name());
        if !template.description().is_empty() {
            println!("  {}", template.description());
        }
        println!("  placeholders: {}", placeholders.join(", "));
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn spinner() -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}

/// Render run events until the channel closes.
async fn display_events(mut rx: mpsc::Receiver<AgentEvent>, json: bool) -> Result<()> {
    if json {
        while let Some(event) = rx.recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        return Ok(());
    }

    let spinner = spinner()?;
    while let Some(event) = rx.recv().await {
        match &event {
            AgentEvent::Stage { message, .. } | AgentEvent::Progress { message } => {
                spinner.set_message(message.clone());
            }
            AgentEvent::Result { message, .. } => {
                spinner.println(format!("  ✓ {message}"));
            }
            AgentEvent::Complete { message, .. } => {
                spinner.finish_and_clear();
                println!("  {message}");
            }
            AgentEvent::Error { message, .. } => {
                spinner.abandon_with_message(format!("✗ {message}"));
            }
        }
    }
    Ok(())
}

fn print_posts(state: &PipelineRunState, config: &AppConfig) {
    let (min_words, max_words) = (config.posts.min_word_count, config.posts.max_word_count);
    for post in &state.posts {
        let words = post.word_count();
        let hint = if post.is_optimal_length(min_words, max_words) {
            String::new()
        } else {
            format!(" (outside {min_words}-{max_words})")
        };
        println!();
        println!("── Post {}: {} · {words} words{hint}", post.id, post.style);
        println!();
        println!("{}", post.content);
    }
    println!();
}

fn write_run(path: &Path, state: &PipelineRunState) -> Result<()> {
    let document = serde_json::json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "run": state,
    });
    let content = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, content)
        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
