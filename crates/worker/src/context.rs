//! Application context built once at startup and shared by the pool,
//! the poller and the plan service.

use std::sync::Arc;

use radiarch_core::registry::WorkflowRegistry;
use radiarch_db::memory::MemoryStore;
use radiarch_db::sql_store::SqlStore;
use radiarch_db::store::{Store, StoreError};
use radiarch_pacs::access::{AccessError, DataAccess};
use radiarch_pacs::dicomweb::DicomWebAccess;
use radiarch_pacs::notifier::{DicomWebNotifier, DisabledNotifier, Notifier};
use radiarch_pacs::sample::SampleDataAccess;
use radiarch_pipeline::dispatcher::{Dispatcher, FallbackPolicy};
use radiarch_pipeline::engine::{DoseEngine, UnavailableEngine};
use radiarch_pipeline::simulation::DeliverySimulator;
use radiarch_pipeline::synthetic::SyntheticGenerator;

use crate::config::WorkerConfig;
use crate::retry::RetryPolicy;
use crate::runner::JobRunner;
use crate::simulation::SimulationService;

/// Maximum connections in the SQLite pool.
const MAX_DB_CONNECTIONS: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Store initialisation failed: {0}")]
    Store(#[from] StoreError),

    #[error("DICOMweb client initialisation failed: {0}")]
    Access(#[from] AccessError),
}

/// Shared services.
#[derive(Clone)]
pub struct AppContext {
    pub config: WorkerConfig,
    pub registry: Arc<WorkflowRegistry>,
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub simulator: Arc<DeliverySimulator>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppContext {
    /// Assemble a context from explicit parts.
    pub fn new(
        config: WorkerConfig,
        registry: Arc<WorkflowRegistry>,
        store: Arc<dyn Store>,
        dispatcher: Arc<Dispatcher>,
        simulator: Arc<DeliverySimulator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            registry,
            store,
            dispatcher,
            simulator,
            notifier,
        }
    }

    /// Build every service the configuration selects.
    pub async fn from_config(config: WorkerConfig) -> Result<Self, StartupError> {
        let store: Arc<dyn Store> = match &config.database_url {
            Some(url) => {
                let pool = radiarch_db::create_pool(url, MAX_DB_CONNECTIONS)
                    .await
                    .map_err(StoreError::from)?;
                radiarch_db::run_migrations(&pool)
                    .await
                    .map_err(StoreError::from)?;
                tracing::info!(
                    persist_transient_fields = config.persist_transient_fields,
                    "Using SQLite store",
                );
                Arc::new(SqlStore::new(pool).with_transient_fields(config.persist_transient_fields))
            }
            None => {
                tracing::warn!("RADIARCH_DATABASE_URL not set, using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let data: Arc<dyn DataAccess> = match &config.pacs {
            Some(pacs) => {
                tracing::info!(url = %pacs.base_url, "Using DICOMweb data access");
                Arc::new(DicomWebAccess::new(pacs.clone())?)
            }
            None => {
                tracing::info!("RADIARCH_PACS_URL not set, using sample data");
                Arc::new(SampleDataAccess::new())
            }
        };

        let notifier: Arc<dyn Notifier> = match &config.dicomweb {
            Some(target) => {
                tracing::info!(url = %target.base_url, "STOW-RS push enabled");
                Arc::new(DicomWebNotifier::new(target.clone())?)
            }
            None => Arc::new(DisabledNotifier),
        };

        let registry = Arc::new(WorkflowRegistry::builtin());
        let engine: Arc<dyn DoseEngine> = Arc::new(UnavailableEngine);
        let policy = FallbackPolicy::from_force_flag(config.force_synthetic);
        let dispatcher = Dispatcher::with_engine(
            &registry,
            Arc::clone(&engine),
            data,
            config.artifact_dir.clone(),
            policy,
            SyntheticGenerator::new(),
        );
        let simulator = DeliverySimulator::new(
            engine,
            policy,
            SyntheticGenerator::new(),
            config.artifact_dir.clone(),
        );

        Ok(Self::new(
            config,
            registry,
            store,
            Arc::new(dispatcher),
            Arc::new(simulator),
            notifier,
        ))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.retry_max_attempts,
            max_delay: self.config.retry_backoff_max,
            ..Default::default()
        }
    }

    /// A job runner over this context's services.
    pub fn runner(&self) -> JobRunner {
        JobRunner::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.notifier),
        )
        .with_retry(self.retry_policy())
        .with_soft_limit(self.config.soft_time_limit)
    }

    /// A simulation service over this context's store and simulator.
    pub fn simulations(&self) -> SimulationService {
        SimulationService::new(Arc::clone(&self.store), Arc::clone(&self.simulator))
    }
}
