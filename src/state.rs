//! Shared application state.
//!
//! Per-network chain adapters are singletons initialized on first use and
//! keyed by network name; DEX route builders and wallet signers are wired at
//! startup. All of it hangs off one cloneable `AppState`.

use crate::chain::evm::EvmAdapter;
use crate::chain::signer::SignerRegistry;
use crate::chain::solana::SolanaAdapter;
use crate::chain::ChainAdapter;
use crate::classify::ErrorClassifier;
use crate::config::Config;
use crate::coordination::CoordinationState;
use crate::dex::cpmm::CpmmRouteBuilder;
use crate::dex::RouteBuilder;
use crate::types::{AppError, TxFamily};
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub coordination: Arc<CoordinationState>,
    pub chains: Arc<ChainRegistry>,
    pub signers: Arc<SignerRegistry>,
    pub dexes: Arc<DexRegistry>,
    pub classifier: Arc<ErrorClassifier>,
}

impl AppState {
    pub fn from_config(cfg: Config) -> anyhow::Result<Self> {
        let cfg = Arc::new(cfg);
        let signers = SignerRegistry::from_config(&cfg)?;
        let classifier =
            ErrorClassifier::default().with_extra_nonce_patterns(&cfg.extra_nonce_error_patterns);
        Ok(Self {
            coordination: Arc::new(CoordinationState::new(&cfg)),
            chains: Arc::new(ChainRegistry::new(cfg.clone())),
            signers: Arc::new(signers),
            dexes: Arc::new(DexRegistry::from_config(cfg.clone())),
            classifier: Arc::new(classifier),
            cfg,
        })
    }
}

/// Network name -> chain adapter, initialized lazily on first use.
pub struct ChainRegistry {
    cfg: Arc<Config>,
    http: reqwest::Client,
    adapters: DashMap<String, Arc<dyn ChainAdapter>>,
}

impl ChainRegistry {
    pub fn new(cfg: Arc<Config>) -> Self {
        Self {
            cfg,
            http: reqwest::Client::new(),
            adapters: DashMap::new(),
        }
    }

    pub fn get(&self, network: &str) -> Result<Arc<dyn ChainAdapter>, AppError> {
        if let Some(adapter) = self.adapters.get(network) {
            return Ok(adapter.clone());
        }
        let net = self.cfg.network(network)?;
        let adapter: Arc<dyn ChainAdapter> = match net.family {
            TxFamily::AccountNonce => {
                Arc::new(EvmAdapter::new(network, &net.rpc_url, self.http.clone())?)
            }
            TxFamily::SignatureHash => Arc::new(SolanaAdapter::new(network, &net.rpc_url)),
        };
        tracing::info!(network, family = ?net.family, "initialized chain adapter");
        let entry = self
            .adapters
            .entry(network.to_string())
            .or_insert(adapter);
        Ok(entry.clone())
    }

    /// Swap in a pre-built adapter (test harnesses).
    #[cfg(test)]
    pub fn insert(&self, network: &str, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(network.to_string(), adapter);
    }
}

/// Dex name -> route builder. One reference connector per registered dex.
pub struct DexRegistry {
    builders: DashMap<String, Arc<dyn RouteBuilder>>,
}

impl DexRegistry {
    pub fn from_config(cfg: Arc<Config>) -> Self {
        let builders: DashMap<String, Arc<dyn RouteBuilder>> = DashMap::new();
        for dex in cfg.pools.keys() {
            builders.insert(
                dex.clone(),
                Arc::new(CpmmRouteBuilder::new(dex, cfg.clone())) as Arc<dyn RouteBuilder>,
            );
        }
        Self { builders }
    }

    pub fn get(&self, dex: &str) -> Result<Arc<dyn RouteBuilder>, AppError> {
        self.builders
            .get(dex)
            .map(|e| e.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("unknown dex: {dex}")))
    }
}
