use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use candle_store::CandleStore;
use confidence_calibrator::ConfidenceService;
use data_ingestion::{DataCuration, DataIngestion, SignalDataProvider};
use risk_evaluator::{RiskDb, RiskEvaluator};
use signal_core::{NoopMetrics, Settings, VenueAdapter};
use signal_orchestrator::{OrchestratorDeps, RecommendationStore, SignalOrchestrator};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use strategy_ensemble::{AggregatorParams, EnsembleWeightStore};
use worm_store::WormStore;

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";

/// Process-wide application context, built once at boot and threaded
/// through every command explicitly.
pub struct AppContext {
    pub settings: Settings,
    pub symbol: String,
    pub store: CandleStore,
    pub ingestion: Arc<DataIngestion>,
    pub curation: Arc<DataCuration>,
    pub pool: sqlx::SqlitePool,
    pub orchestrator: Arc<SignalOrchestrator>,
}

impl AppContext {
    pub async fn build(symbol: Option<String>) -> Result<AppContext> {
        let settings = Settings::from_env().context("invalid configuration")?;
        let symbol = symbol.unwrap_or_else(|| DEFAULT_SYMBOL.to_string());

        let store = CandleStore::from_settings(&settings);
        let venues = exchange_clients::default_venues(&settings);
        let venue_names: Vec<String> = venues.iter().map(|v| v.venue().to_string()).collect();

        let ingestion = Arc::new(DataIngestion::new(venues, store.clone(), &settings));
        let curation = Arc::new(DataCuration::new(store.clone(), venue_names.clone()));

        let pool = connect_pool(&settings.database_url).await?;
        let recommendation_store = RecommendationStore::new(pool.clone());
        recommendation_store.init_tables().await?;
        let risk_db = RiskDb::new(pool.clone());
        risk_db.init_tables().await?;
        let weight_store = EnsembleWeightStore::new(pool.clone());
        weight_store.init_tables().await?;

        let provider = SignalDataProvider::new(
            DataCuration::new(store.clone(), venue_names),
            symbol.clone(),
        );
        let orchestrator = Arc::new(SignalOrchestrator::new(OrchestratorDeps {
            provider,
            weight_store,
            confidence: ConfidenceService::new(&settings.artifacts_dir),
            risk: RiskEvaluator::new(risk_db, settings.clone()),
            store: recommendation_store,
            worm: WormStore::new(&settings.snapshots_dir),
            settings: settings.clone(),
            aggregator_params: AggregatorParams::default(),
            campaigns_dir: PathBuf::from(&settings.data_dir).join("campaigns"),
            code_commit: std::env::var("CODE_COMMIT").unwrap_or_else(|_| "dev".to_string()),
        }));

        Ok(AppContext {
            settings,
            symbol,
            store,
            ingestion,
            curation,
            pool,
            orchestrator,
        })
    }

    pub fn metrics(&self) -> Arc<NoopMetrics> {
        Arc::new(NoopMetrics)
    }
}

async fn connect_pool(database_url: &str) -> Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid DATABASE_URL: {database_url}"))?
        .create_if_missing(true);
    if let Some(parent) = std::path::Path::new(database_url.trim_start_matches("sqlite://"))
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        let _ = std::fs::create_dir_all(parent);
    }
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open database")
}
