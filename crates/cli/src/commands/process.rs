//! Print queue processing command.
//!
//! # Usage
//!
//! ```bash
//! # Orders awaiting shipment that have no tasks yet
//! pl-cli process --limit 50
//!
//! # One order, rebuilt from scratch, with a debug trace
//! pl-cli process -o 1001 --force-recreate --debug-file order-1001.log
//!
//! # Push stored tasks back to ShipStation
//! pl-cli process -o 1001 --shipstation-sync-only
//!
//! # Empty the print queue
//! pl-cli process --clear-all --confirm
//! ```
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` - needed unless `--skip-ai`, `--shipstation-sync-only`
//!   or `--clear-all` is given

use std::sync::Arc;

use thiserror::Error;

use printline_engine::ai::{AiError, AiExtractor, OpenAiClient, PromptSet};
use printline_engine::config::ConfigError;
use printline_engine::customization::{CustomizationFileResolver, HttpArchiveFetcher, ResolveError};
use printline_engine::db::{self, PgReconciliationStore};
use printline_engine::services::{Orchestrator, ProcessOptions, ReconcileError};
use printline_engine::shipstation::{ShipStationClient, ShipStationError};

use crate::ProcessArgs;

/// Errors from the process command.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("ShipStation client error: {0}")]
    ShipStation(#[from] ShipStationError),

    #[error("customization fetcher error: {0}")]
    Resolver(#[from] ResolveError),

    #[error("AI client error: {0}")]
    Ai(#[from] AiError),

    #[error("failed to read prompt file: {0}")]
    Prompt(#[from] std::io::Error),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("{0} order(s) failed")]
    OrdersFailed(usize),
}

/// Run the print queue pipeline.
///
/// # Errors
///
/// Returns `ProcessError` if setup fails, the run cannot start, or any order
/// failed.
pub async fn run(args: ProcessArgs) -> Result<(), ProcessError> {
    let (config, _guard) = super::init()?;

    let pool = db::create_pool(&config.database_url).await?;
    let store = Arc::new(PgReconciliationStore::new(pool));
    let api = Arc::new(ShipStationClient::new(&config.shipstation)?);
    let resolver = CustomizationFileResolver::new(Arc::new(HttpArchiveFetcher::new()?));

    let needs_ai = !(args.skip_ai || args.shipstation_sync_only || args.clear_all);
    let ai = if needs_ai {
        let openai = config.require_openai()?;
        let prompts = PromptSet::load(&config.prompts)?;
        Some(AiExtractor::new(Arc::new(OpenAiClient::new(openai)?), prompts))
    } else {
        None
    };

    let orchestrator = Orchestrator::new(store, api, resolver, ai);

    if args.clear_all {
        let deleted = orchestrator.clear_all_tasks(args.confirm).await?;
        tracing::info!(deleted, "Print queue cleared");
        return Ok(());
    }

    let options = ProcessOptions {
        order: args.order_id,
        limit: args.limit,
        force_recreate: args.force_recreate,
        preserve_text: args.preserve_text,
        dry_run: args.dry_run,
        skip_ai: args.skip_ai,
        shipstation_sync_only: args.shipstation_sync_only,
        debug_file: args.debug_file,
    };
    let summary = orchestrator.run(&options).await?;
    tracing::info!("{summary}");

    if summary.is_success() {
        Ok(())
    } else {
        Err(ProcessError::OrdersFailed(summary.failed))
    }
}
