//! Wiring of the sync stack and the periodic trigger loop

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use skillsync_cache::{DatabasePool, SqliteLocalStore};
use skillsync_core::{
    config::Config,
    ports::{ICredentialProvider, RateLimitState},
};
use skillsync_google::{
    ApiClient, ChainedCredentialProvider, GoogleCalendarApi, GoogleDriveApi,
    KeyringCredentialProvider, StaticCredentialProvider,
};
use skillsync_sync::{
    JsonFileStatusSink, RunReport, RunRequest, SkillTools, SyncContext, SyncOrchestrator,
    SyncRuntime, SyncSettings, TracingStatusSink,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Status file written next to the cache database
const STATUS_FILE: &str = "status.json";

/// Owns the store, the orchestrator and the tool surface for one process
pub struct DaemonService {
    config: Config,
    db_pool: DatabasePool,
    orchestrator: Arc<SyncOrchestrator>,
    tools: SkillTools,
}

impl DaemonService {
    /// Opens the store and builds the adapters described by `config`
    pub async fn new(config: Config) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.database.path)
            .await
            .context("Failed to open local store")?;
        let store = Arc::new(SqliteLocalStore::new(db_pool.pool().clone()));

        let credentials = credential_chain(&config);
        let rate_limit = Arc::new(RateLimitState::new());

        let calendar_client = ApiClient::from_config(
            config.api.calendar_base_url.as_str(),
            &config.api,
            Arc::clone(&credentials),
            Arc::clone(&rate_limit),
        )
        .context("Failed to build calendar client")?;
        let drive_client = ApiClient::from_config(
            config.api.drive_base_url.as_str(),
            &config.api,
            Arc::clone(&credentials),
            Arc::clone(&rate_limit),
        )
        .context("Failed to build drive client")?;

        let calendar = Arc::new(GoogleCalendarApi::new(calendar_client));
        let drive = Arc::new(GoogleDriveApi::new(
            drive_client,
            config.api.sheets_base_url.as_str(),
            config.api.docs_base_url.as_str(),
        ));

        let ctx = Arc::new(SyncContext::new(
            store,
            calendar,
            drive,
            credentials,
            SyncSettings::from_config(&config),
        ));
        let runtime = Arc::new(SyncRuntime::new(rate_limit));

        let orchestrator = Arc::new(
            SyncOrchestrator::new(ctx, runtime)
                .with_sink(Arc::new(TracingStatusSink))
                .with_sink(Arc::new(JsonFileStatusSink::new(status_path(&config)))),
        );
        let tools = SkillTools::new(Arc::clone(&orchestrator));

        Ok(Self {
            config,
            db_pool,
            orchestrator,
            tools,
        })
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub fn tools(&self) -> &SkillTools {
        &self.tools
    }

    pub async fn sync_once(&self, request: RunRequest) -> RunReport {
        self.orchestrator.run(request).await
    }

    /// Runs the orchestrator every `sync.poll_interval_minutes` until `shutdown` fires
    ///
    /// The first run starts immediately. A tick that lands while a run is
    /// still in progress is dropped by the orchestrator's guard.
    pub async fn run_loop(&self, shutdown: CancellationToken) -> Result<()> {
        let minutes = self.config.sync.poll_interval_minutes.max(1);
        let mut interval = tokio::time::interval(Duration::from_secs(minutes * 60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(poll_interval_minutes = minutes, "Starting sync loop");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {}
            }

            let report = tokio::select! {
                report = self.orchestrator.run(RunRequest::periodic()) => report,
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received during sync run");
                    break;
                }
            };

            if let Some(error) = &report.error {
                warn!(run_id = %report.run_id, error = %error, "Sync run finished with errors");
            }
        }

        info!("Sync loop terminated");
        Ok(())
    }

    pub async fn close(&self) {
        self.db_pool.close().await;
    }
}

/// Environment token first, then the keyring account when one is configured
fn credential_chain(config: &Config) -> Arc<dyn ICredentialProvider> {
    let env: Arc<dyn ICredentialProvider> = Arc::new(StaticCredentialProvider::from_env(
        &config.auth.access_token_env,
    ));
    let mut providers = vec![env];
    if let Some(account) = &config.auth.keyring_account {
        providers.push(Arc::new(KeyringCredentialProvider::new(account.as_str())));
    }
    Arc::new(ChainedCredentialProvider::new(providers))
}

fn status_path(config: &Config) -> PathBuf {
    config.database.path.with_file_name(STATUS_FILE)
}

/// Cancels `token` on SIGINT or SIGTERM
pub async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
    }

    token.cancel();
}
