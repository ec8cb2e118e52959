use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context, Result};
use clap::Parser;
use showmmr_analytics::AnalyticsEngine;
use showmmr_config::AppConfig;
use showmmr_core::{SchemaVariant, SyncMode};
use showmmr_ledger::{CsvLedger, MergeStore};
use showmmr_sync::{
    CellIdCache, Credentials, FetchController, HttpMatchService, HttpSessionConfig, RecordFilter,
    ShutdownSignal, SyncOutcome, SyncSession, TokenCache,
};
use tracing::{debug, info, warn};

use crate::{output, telemetry};

#[derive(Parser, Debug)]
#[command(
    name = "showmmr",
    version,
    about = "Sync ranked match history into a local ledger and print MMR statistics"
)]
pub struct Cli {
    /// Account name; also names the ledger and token files
    pub user: String,
    /// Matches to fetch; 0 only reports on the local ledger
    pub matches: u32,
    /// Configuration file (defaults to ./showmmr.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Environment variable holding the account password
    #[arg(long, default_value = "SHOWMMR_PASSWORD")]
    pub password_env: String,
    /// Stop at the newest known match, or continue past the oldest one
    #[arg(long)]
    pub mode: Option<SyncMode>,
    /// Ledger layout: rich (v2) or minimal (v1)
    #[arg(long)]
    pub schema: Option<SchemaVariant>,
    /// Write the oldest-first MMR series as CSV
    #[arg(long)]
    pub series: Option<PathBuf>,
    /// Print the report as JSON instead of text
    #[arg(long)]
    pub json: bool,
    /// Include net MMR per hero
    #[arg(long)]
    pub heroes: bool,
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
}

pub async fn run() -> Result<()> {
    let cli = parse_args();
    telemetry::init(cli.verbose, cli.log_json);
    // The token cache is left alone here: the identity's files are not resolved yet.
    let mut config = AppConfig::load(cli.config.as_deref())
        .context("invalid configuration; either fix the file or delete it")?;
    if let Some(mode) = cli.mode {
        config.sync.mode = mode;
    }
    if let Some(schema) = cli.schema {
        config.ledger.schema = schema;
    }
    if tracing::enabled!(tracing::Level::DEBUG) {
        debug!(config = %config.to_toml()?, "effective configuration");
    }
    execute(&cli, &config).await
}

/// Usage errors exit with 1; `--help` and `--version` exit with 0.
fn parse_args() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    }
}

pub async fn execute(cli: &Cli, config: &AppConfig) -> Result<()> {
    let tokens = TokenCache::new(config.cache.token_path(&cli.user));
    let ledger = CsvLedger::for_user(&config.ledger.dir, &cli.user, config.ledger.schema);

    let mut store = match MergeStore::load(&ledger) {
        Ok(store) => store,
        Err(err) => {
            discard_token(&tokens);
            return Err(err).with_context(|| {
                format!(
                    "error reading ledger {}; either fix the file or delete it",
                    ledger.path().display()
                )
            });
        }
    };
    info!(
        path = %ledger.path().display(),
        records = store.len(),
        watermark = ?store.watermark(),
        "loaded ledger"
    );

    if cli.matches > 0 {
        let outcome = match sync(cli, config, &tokens, &mut store).await {
            Ok(outcome) => outcome,
            Err(err) => {
                discard_token(&tokens);
                return Err(err);
            }
        };
        if !outcome.should_persist() {
            discard_token(&tokens);
            bail!(
                "sync for {} produced no usable account ({})",
                cli.user,
                outcome.termination
            );
        }
        if !outcome.termination.is_success() {
            warn!(
                termination = %outcome.termination,
                "sync ended early, keeping the matches fetched so far"
            );
        }
        store
            .save(&ledger)
            .with_context(|| format!("failed to write ledger {}", ledger.path().display()))?;
        info!(
            termination = %outcome.termination,
            new_matches = store.inserted_this_session(),
            total = store.len(),
            "done fetching matches"
        );
    }

    let report = AnalyticsEngine::new(config.ledger.schema).compute(store.records());
    if let Some(path) = &cli.series {
        output::write_series(&report, path)?;
        info!(path = %path.display(), points = report.series.len(), "wrote rating series");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        output::write_json(&report, &mut out)?;
    } else {
        output::write_text(&report, cli.heroes, &mut out)?;
    }
    out.flush()?;
    Ok(())
}

async fn sync(
    cli: &Cli,
    config: &AppConfig,
    tokens: &TokenCache,
    store: &mut MergeStore,
) -> Result<SyncOutcome> {
    let password = std::env::var(&cli.password_env)
        .ok()
        .filter(|password| !password.is_empty());
    if password.is_none() && !tokens.exists() {
        warn!(
            env = %cli.password_env,
            "no password set and no cached token; login will fail"
        );
    }

    let cells = CellIdCache::new(config.cache.cell_id_path());
    let session_config = HttpSessionConfig {
        base_url: config.remote.base_url.clone(),
        app_id: config.remote.app_id,
        request_timeout: config.remote.request_timeout(),
        handshake_delay: config.remote.handshake_delay(),
        connect_attempts: config.remote.connect_attempts,
        connect_backoff: config.remote.connect_backoff(),
    };
    info!(base_url = %session_config.base_url, user = %cli.user, "connecting");
    let mut service = HttpMatchService::connect(
        session_config,
        Credentials::new(cli.user.clone(), password),
        tokens.clone(),
        cells,
    )
    .context("failed to start session")?;

    let controller = FetchController::new(cli.matches, RecordFilter::new(config.ledger.schema))
        .with_mode(config.sync.mode)
        .with_page_size_cap(config.sync.page_size_cap);
    let shutdown = ShutdownSignal::new();
    let ctrl_c = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing up");
                shutdown.trigger();
            }
        })
    };

    let outcome = SyncSession::new(controller, store)
        .with_page_interval(config.sync.page_interval())
        .run(&mut service, &shutdown)
        .await;
    ctrl_c.abort();
    Ok(outcome?)
}

fn discard_token(tokens: &TokenCache) {
    if let Err(err) = tokens.invalidate() {
        warn!(path = %tokens.path().display(), error = %err, "failed to remove token cache");
    }
}
