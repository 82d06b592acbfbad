use log::{info, warn};
use raffle_admin_logic::cache::RoundsCache;
use raffle_admin_logic::config::AdminConfig;
use raffle_admin_logic::error::AdminError::{self, *};
use raffle_admin_logic::evm_contract::EvmContract;
use raffle_admin_logic::indexer::Indexer;
use raffle_admin_logic::metadata::{MetaBackend, PgMetaStore};
use raffle_admin_logic::notification::TelegramNotifier;
use raffle_admin_logic::rounds::{AdminRoundView, DrawableRound};
use std::sync::Arc;

pub type SharedState = Arc<AppState>;

/// Clients are optional: a route only fails when the collaborator it needs is missing
pub struct AppState {
    pub config: AdminConfig,
    pub indexer: Option<Indexer>,
    pub contract: Option<EvmContract>,
    pub meta_store: Option<MetaBackend>,
    pub notifier: Option<TelegramNotifier>,
    pub admin_rounds: RoundsCache<Vec<AdminRoundView>>,
    pub drawable_rounds: RoundsCache<Vec<DrawableRound>>,
}

fn optional<T>(what: &str, client: Result<T, AdminError>) -> Option<T> {
    match client {
        Ok(client) => {
            info!("{what} configured");
            Some(client)
        }
        Err(e) => {
            warn!("{what} disabled: {e}");
            None
        }
    }
}

impl AppState {
    pub fn from_config(config: AdminConfig) -> Self {
        let indexer = optional("subgraph", Indexer::new(config.subgraph_url.clone()));
        let contract = optional(
            "raffle manager",
            EvmContract::new(
                config.rpc_url.clone(),
                config.signer_rpc_url.clone(),
                config.operator,
                config.raffle_manager,
                config.multicall,
            ),
        );
        let meta_store = optional(
            "metadata store",
            PgMetaStore::new(config.database_url.clone()).map(MetaBackend::Postgres),
        );
        let notifier = optional("telegram", TelegramNotifier::new(&config));
        Self {
            indexer,
            contract,
            meta_store,
            notifier,
            admin_rounds: RoundsCache::new(config.cache_stale_after),
            drawable_rounds: RoundsCache::new(config.cache_stale_after),
            config,
        }
    }

    pub fn with_meta_store(mut self, store: MetaBackend) -> Self {
        self.meta_store = Some(store);
        self
    }

    pub fn ensure_indexer(&self) -> Result<&Indexer, AdminError> {
        self.indexer.as_ref().ok_or(IndexerNotConfigured)
    }

    pub fn ensure_contract(&self) -> Result<&EvmContract, AdminError> {
        self.contract.as_ref().ok_or(RpcNotConfigured)
    }

    pub fn ensure_meta_store(&self) -> Result<&MetaBackend, AdminError> {
        self.meta_store.as_ref().ok_or(MetaStoreNotConfigured)
    }

    pub fn ensure_notifier(&self) -> Result<&TelegramNotifier, AdminError> {
        self.notifier.as_ref().ok_or(NotifierNotConfigured)
    }

    /// After a write the next read goes back to the subgraph and the chain
    pub async fn invalidate_rounds(&self) {
        self.admin_rounds.invalidate().await;
        self.drawable_rounds.invalidate().await;
    }
}
