//! git-autocommit - CLI entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use git_autocommit::auth::{
    AuthInstructions, AuthManager, CredentialStore, DeviceFlowDisplay, GitHubIdentityProvider,
    TokenSource,
};
use git_autocommit::commit::CommitMessageGenerator;
use git_autocommit::completion::CompletionClient;
use git_autocommit::config::{AppContext, Config, DEFAULT_MODEL};
use git_autocommit::flow::{DialoguerPrompter, FlowOptions, FlowOutcome, InteractionController};
use git_autocommit::git::GitInspector;
use git_autocommit::models::{Model, ModelCatalog};

/// Write conventional commit messages for staged changes with GitHub Copilot.
#[derive(Parser, Debug)]
#[command(name = "git-autocommit")]
#[command(about = "Write conventional commit messages for staged changes with GitHub Copilot")]
#[command(version)]
struct Cli {
    /// Show debug logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a message for the staged changes and commit
    Commit {
        /// Stage all modified and untracked files first (git add -A)
        #[arg(short, long)]
        all: bool,

        /// Model id or name (defaults to the configured model)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Sign in with GitHub using the device flow
    Auth {
        /// Remove the cached credential
        #[arg(long, conflicts_with = "status")]
        logout: bool,

        /// Show whether a credential is cached
        #[arg(long)]
        status: bool,
    },
    /// List the models available to your account
    Models,
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Set the default model
    SetModel {
        /// Model id, e.g. gpt-4o
        model: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = AppContext::load().context("Failed to load configuration")?;

    match cli.command {
        Command::Commit { all, model } => run_commit(&ctx, all, model).await,
        Command::Auth { logout, status } => run_auth(&ctx, logout, status).await,
        Command::Models => run_models(&ctx).await,
        Command::Config { action } => run_config(&ctx, action),
    }
}

/// Logs go to stderr. `RUST_LOG` overrides the level chosen here.
fn init_tracing(verbose: bool) {
    let level = if verbose { "git_autocommit=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn auth_manager(ctx: &AppContext, client: reqwest::Client) -> AuthManager {
    AuthManager::new(
        GitHubIdentityProvider::new(client, ctx.endpoints.clone()),
        CredentialStore::new(&ctx.credentials_path).with_lock_timeout(ctx.lock_timeout()),
    )
}

async fn run_commit(ctx: &AppContext, all: bool, model: Option<String>) -> Result<()> {
    let git = GitInspector::discover(".")?;
    let client = ctx.http_client().context("Failed to build HTTP client")?;

    let tokens: Arc<dyn TokenSource> = Arc::new(auth_manager(ctx, client.clone()));
    let catalog = ModelCatalog::new(
        client.clone(),
        ctx.endpoints.clone(),
        tokens.clone(),
        ctx.config.default_model.clone(),
    );
    let generator = CommitMessageGenerator::new(CompletionClient::new(
        client,
        ctx.endpoints.clone(),
        tokens,
        ctx.retry,
    ));

    let mut prompter = DialoguerPrompter;
    let options = FlowOptions {
        auto_stage: all,
        model,
        token_budget: ctx.config.token_budget,
    };

    let outcome = InteractionController::new(&git, &generator, &catalog, &mut prompter, options)
        .run()
        .await?;

    match outcome {
        FlowOutcome::Committed(message) => {
            println!("✓ Committed: {}", message.lines().next().unwrap_or_default());
        }
        FlowOutcome::Cancelled => println!("Commit cancelled. Nothing was committed."),
    }
    Ok(())
}

/// Prints the device-flow code for the user.
struct TerminalDisplay;

impl DeviceFlowDisplay for TerminalDisplay {
    fn show_instructions(&mut self, instructions: &AuthInstructions) {
        println!("Open {} in your browser", instructions.verification_uri);
        println!("and enter the code: {}\n", instructions.user_code);
        println!("Waiting for authorization (Ctrl-C to cancel)...");
    }
}

async fn run_auth(ctx: &AppContext, logout: bool, status: bool) -> Result<()> {
    let client = ctx.http_client().context("Failed to build HTTP client")?;
    let manager = auth_manager(ctx, client);

    if logout {
        manager.logout()?;
        println!("Signed out. Cached credential removed.");
        return Ok(());
    }

    if status {
        match manager.status()? {
            Some(credential) => match credential.expires_at {
                Some(at) if credential.is_expired() => {
                    println!("Signed in. Token expired at {}; it is refreshed on next use.", at)
                }
                Some(at) => println!("Signed in. Token expires at {}.", at),
                None => println!("Signed in."),
            },
            None => println!("Not signed in. Run `git-autocommit auth`."),
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = manager.authenticate(&mut TerminalDisplay, &cancel).await;
    watcher.abort();
    result?;

    println!("✓ Authenticated with GitHub Copilot");
    Ok(())
}

async fn run_models(ctx: &AppContext) -> Result<()> {
    let client = ctx.http_client().context("Failed to build HTTP client")?;
    let tokens: Arc<dyn TokenSource> = Arc::new(auth_manager(ctx, client.clone()));
    let catalog = ModelCatalog::new(
        client,
        ctx.endpoints.clone(),
        tokens,
        ctx.config.default_model.clone(),
    );

    let models = catalog.list_models().await?;
    if models.is_empty() {
        println!("No models available.");
        return Ok(());
    }
    print_models_table(models);
    Ok(())
}

fn print_models_table(models: &[Model]) {
    let headers = ["ID", "Name", "Vendor", "Version", "Family", "Max Tokens", "Streaming"];
    let rows: Vec<[String; 7]> = models
        .iter()
        .map(|m| {
            [
                m.id.clone(),
                m.display_name.clone(),
                m.vendor.clone(),
                m.version.clone().unwrap_or_else(|| "N/A".to_string()),
                m.family.clone().unwrap_or_else(|| "N/A".to_string()),
                m.max_output_tokens
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "N/A".to_string()),
                m.supports("streaming").to_string(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", line(&headers));
    println!("{}", line(&widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)));
    for row in &rows {
        println!("{}", line(&row.each_ref().map(String::as_str)));
    }
}

fn run_config(ctx: &AppContext, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = &ctx.config;
            println!("Config file:   {}", ctx.config_path.display());
            println!("Credentials:   {}", ctx.credentials_path.display());
            match &config.default_model {
                Some(model) => println!("Default model: {}", model),
                None => println!("Default model: {} (built-in)", DEFAULT_MODEL),
            }
            println!("Token budget:  {}", config.token_budget);
            println!("HTTP timeout:  {}s", ctx.http_timeout.as_secs());
        }
        ConfigAction::SetModel { model } => {
            Config::set_default_model(&ctx.config_path, &model)
                .context("Failed to update configuration")?;
            println!("✓ Default model set to {}", model);
        }
    }
    Ok(())
}
