pub mod augment;
pub mod catalog;
pub mod cli;
pub mod completion;
pub mod config;
pub mod error;
pub mod input;
pub mod interrupt;
pub mod logging;
pub mod model;
pub mod providers;
pub mod repl;
pub mod terminal;
pub mod transcript;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use std::io;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use augment::{ContentAugmenter, LinkAugmenter, Passthrough};
use catalog::ModelCatalog;
use cli::Cli;
use config::Config;
use error::CatalogError;
use providers::openai::OpenAiClient;
use repl::Repl;

pub async fn run() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init();
    terminal::set_color_enabled(!cli.no_color);
    interrupt::init()?;

    let cfg = Config::from_env()?;
    info!(
        api_base_url = %cfg.api_base_url,
        model_timeout_secs = cfg.model_timeout_secs,
        augment_links = cfg.augment_links,
        "loaded runtime configuration"
    );

    let timeout = Duration::from_secs(cfg.model_timeout_secs);
    let client = Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()
        .context("Failed to initialize HTTP client")?;
    let openai = OpenAiClient::new(client.clone(), &cfg);

    let models = catalog::chat_models(openai.list_models().await?, &cfg.model_filter);
    if models.is_empty() {
        return Err(CatalogError::new("No models available").into());
    }
    info!(model_count = models.len(), "loaded model catalog");

    let mut input = io::stdin().lock();
    let mut out = io::stdout();
    let requested = cli.model.as_deref().or(cfg.model.as_deref());
    let Some(model) = catalog::select_model(&models, requested, &mut input, &mut out)? else {
        return Ok(ExitCode::SUCCESS);
    };
    info!(model = %model, "starting chat session");

    let augmenter: Box<dyn ContentAugmenter> = if cfg.augment_links {
        Box::new(LinkAugmenter::new(client, &cfg))
    } else {
        Box::new(Passthrough)
    };

    let mut repl = Repl::new(&cfg, &model, &openai, augmenter.as_ref(), input, out);
    let end = repl.run().await?;
    info!(reason = ?end, "chat session ended");
    Ok(end.exit_code())
}
