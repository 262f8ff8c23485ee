//! Trackfill CLI
//!
//! Two operations: `login` establishes a tracker session and persists it,
//! `create` fills (and optionally submits) a new ticket, logging in first
//! when needed.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use trackfill::browser::{BrowserSession, BrowserSessionConfig};
use trackfill::flow::{LoginFlow, TicketFlow};
use trackfill::prompt;
use trackfill::store::{OptionCacheStore, SessionStore};
use trackfill::template::{Template, TemplateFile};
use trackfill::AppConfig;

#[derive(Parser)]
#[command(
    name = "trackfill",
    version,
    about = "Fills tracker tickets through a real Chromium browser"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log into the tracker and persist the session for later runs
    Login,
    /// Fill and optionally submit a new ticket (logs in first if needed)
    Create,
}

#[tokio::main]
async fn main() {
    let _guard = trackfill::init_logging();

    if let Err(error) = run().await {
        error!("{:#}", error);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load();
    // Write defaults on first run so the operator has a file to edit
    config.save();

    let store = SessionStore::at_default_location(
        config.account_email.clone(),
        config.base_url.clone(),
    )
    .context("no config directory available")?;

    let session_config = BrowserSessionConfig::for_run()
        .headless(config.headless)
        .chrome_path(config.chrome_path.clone())
        .window_size(config.window_width, config.window_height);
    let session = BrowserSession::obtain(session_config, None).await?;

    let outcome = match cli.command {
        Commands::Login => run_login(&session, &store, &config).await,
        Commands::Create => run_create(&session, &store, &config).await,
    };

    let _ = session.close().await;
    outcome
}

async fn run_login(
    session: &BrowserSession,
    store: &SessionStore,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let login = LoginFlow::new(session, store, config);
    if login.ensure_authenticated().await? {
        info!("Login complete; session saved for reuse");
        Ok(())
    } else {
        anyhow::bail!("login did not complete")
    }
}

async fn run_create(
    session: &BrowserSession,
    store: &SessionStore,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let login = LoginFlow::new(session, store, config);
    if !login.ensure_authenticated().await? {
        anyhow::bail!("login did not complete; cannot create a ticket");
    }

    let templates = TemplateFile::load_default();
    let template = select_template(&templates)?;

    let mut cache = OptionCacheStore::open_default().context("no config directory available")?;

    let mut flow = TicketFlow::new(session, &mut cache, &template, config.element_wait_secs);
    if flow.run().await? {
        info!("Ticket created");
    } else {
        info!("Run finished without submitting");
    }
    Ok(())
}

fn select_template(templates: &TemplateFile) -> anyhow::Result<Template> {
    if templates.is_empty() {
        info!("No templates defined; every field will be prompted");
        return Ok(Template::blank());
    }

    let names = templates.names();
    match prompt::prompt_pick("Select a template", &names)? {
        Some(index) => templates
            .find(&names[index])
            .cloned()
            .context("template disappeared"),
        None => Ok(Template::blank()),
    }
}
