//! Environment-driven configuration for the gateway.
//!
//! We keep this intentionally small and explicit:
//! - network registry (JSON map: name -> family/rpc)
//! - token registry (JSON map: network -> symbol -> address/decimals)
//! - pool registry (JSON map: dex -> pools)
//! - signing keys
//! - coordination + confirmation tunables with safety clamps

use crate::types::{AppError, PoolFamily, TokenInfo, TxFamily};
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// External leases are hard-bounded regardless of configuration.
pub const MIN_LEASE_TTL_MS: u64 = 1_000;
pub const MAX_LEASE_TTL_MS: u64 = 300_000;

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    pub family: TxFamily,
    pub rpc_url: String,
    /// Account-nonce chains only.
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Symbol of the wrapped-native token in the token registry (e.g. "WETH").
    #[serde(default)]
    pub wrapped_native: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TokenConfig {
    pub address: String,
    pub decimals: u8,
    #[serde(default)]
    pub native: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub network: String,
    pub address: String,
    pub base: String,
    pub quote: String,
    pub family: PoolFamily,
    /// Swap fee charged by the pool.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u32,
    /// Account-nonce family: the router contract transactions go through
    /// (also the allowance spender).
    #[serde(default)]
    pub router: Option<String>,
    /// Signature-hash family: program id owning the pool.
    #[serde(default)]
    pub program_id: Option<String>,
    /// Signature-hash family: pool vault token accounts.
    #[serde(default)]
    pub base_vault: Option<String>,
    #[serde(default)]
    pub quote_vault: Option<String>,
}

fn default_fee_bps() -> u32 {
    30
}

#[derive(Clone)]
pub struct Config {
    /// Axum bind address, host:port.
    pub api_bind: String,
    /// Network name -> chain connection info.
    pub networks: HashMap<String, NetworkConfig>,
    /// Network name -> token symbol -> token info.
    pub tokens: HashMap<String, HashMap<String, TokenConfig>>,
    /// Dex name -> registered pools.
    pub pools: HashMap<String, Vec<PoolConfig>>,

    /// Hex private key for the account-nonce (EVM) software signer.
    pub evm_private_key: Option<String>,
    /// Path to a JSON keypair file for the signature-hash (Solana) signer.
    pub solana_keypair: Option<PathBuf>,

    // --- Nonce cache tunables ---
    pub max_nonce_gap: u64,
    pub nonce_cache_max_age: Duration,
    pub default_lease_ttl_ms: u64,
    pub reap_interval: Duration,

    // --- Quote cache ---
    pub quote_ttl: Duration,
    pub default_slippage_bps: u64,

    // --- Confirmation ---
    pub confirm_timeout: Duration,
    pub poll_interval: Duration,
    pub approve_confirm_timeout: Duration,

    // --- Gas policy ---
    /// Hard cap on the max fee, in gwei. 0 = auto (no cap).
    pub gas_max_gwei: u64,
    /// Percentage applied on top of the chain's base estimate. 0 = auto.
    pub gas_multiplier_pct: u64,
    /// Total priority fee budget per signature-hash transaction, in lamports.
    pub solana_priority_fee_lamports: u64,

    /// Whether a hardware-backed wallet may auto-approve allowances inline.
    /// When false the gateway surfaces an actionable error instead.
    pub hardware_auto_approve: bool,

    /// Extra nonce-stale substrings appended to the classifier defaults.
    pub extra_nonce_error_patterns: Vec<String>,
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let s = v.trim().to_lowercase();
            matches!(s.as_str(), "1" | "true" | "yes" | "y" | "on")
        })
        .unwrap_or(default)
}

fn env_json<T: serde::de::DeserializeOwned + Default>(key: &str) -> anyhow::Result<T> {
    const MAX_LEN: usize = 256 * 1024;
    match env::var(key) {
        Err(_) => Ok(T::default()),
        Ok(raw) => {
            if raw.len() > MAX_LEN {
                anyhow::bail!("{key} too large ({} bytes, max {MAX_LEN})", raw.len());
            }
            serde_json::from_str(&raw).with_context(|| format!("Invalid {key}"))
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    // Secure-by-default bind: only listen on loopback unless explicitly configured.
    let api_bind = env::var("GATEWAY_BIND").unwrap_or_else(|_| "127.0.0.1:15888".to_string());

    let networks: HashMap<String, NetworkConfig> = env_json("GATEWAY_NETWORKS_JSON")?;
    let tokens: HashMap<String, HashMap<String, TokenConfig>> = env_json("GATEWAY_TOKENS_JSON")?;
    let pools: HashMap<String, Vec<PoolConfig>> = env_json("GATEWAY_POOLS_JSON")?;

    for (name, net) in &networks {
        if net.family == TxFamily::AccountNonce && net.chain_id.is_none() {
            anyhow::bail!("network {name}: account-nonce networks require chainId");
        }
        let _ = url_sanity(&net.rpc_url)
            .with_context(|| format!("network {name}: invalid rpcUrl"))?;
    }
    for (dex, dex_pools) in &pools {
        for p in dex_pools {
            if !networks.contains_key(&p.network) {
                anyhow::bail!("dex {dex}: pool {} references unknown network {}", p.address, p.network);
            }
        }
    }

    let evm_private_key = env::var("GATEWAY_EVM_PRIVATE_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());
    let solana_keypair: Option<PathBuf> = env::var("GATEWAY_SOLANA_KEYPAIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .map(|p| {
            // Basic path traversal guard for env-provided paths.
            if !p.is_absolute() {
                return Err(anyhow::anyhow!("GATEWAY_SOLANA_KEYPAIR must be an absolute path"));
            }
            if p.components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
            {
                return Err(anyhow::anyhow!("GATEWAY_SOLANA_KEYPAIR must not contain '..'"));
            }
            Ok(p)
        })
        .transpose()?;

    let max_nonce_gap = env_u64("GATEWAY_MAX_NONCE_GAP", 5).max(1);
    let nonce_cache_max_age = Duration::from_secs(env_u64("GATEWAY_NONCE_CACHE_MAX_AGE_SECS", 120));

    let mut default_lease_ttl_ms = env_u64("GATEWAY_DEFAULT_LEASE_TTL_MS", 60_000);
    if !(MIN_LEASE_TTL_MS..=MAX_LEASE_TTL_MS).contains(&default_lease_ttl_ms) {
        tracing::warn!(
            "GATEWAY_DEFAULT_LEASE_TTL_MS={} out of [{}, {}]; clamping",
            default_lease_ttl_ms,
            MIN_LEASE_TTL_MS,
            MAX_LEASE_TTL_MS
        );
        default_lease_ttl_ms = default_lease_ttl_ms.clamp(MIN_LEASE_TTL_MS, MAX_LEASE_TTL_MS);
    }

    let reap_interval = Duration::from_secs(env_u64("GATEWAY_LOCK_REAP_INTERVAL_SECS", 10).max(1));
    let quote_ttl = Duration::from_secs(env_u64("GATEWAY_QUOTE_TTL_SECS", 30));

    // Slippage arrives as percent on the wire but all math runs in bps.
    let mut default_slippage_bps = env_u64("GATEWAY_DEFAULT_SLIPPAGE_BPS", 100);
    if default_slippage_bps >= 10_000 {
        tracing::warn!(
            "GATEWAY_DEFAULT_SLIPPAGE_BPS={} is invalid (must be < 10000); clamping to 9999",
            default_slippage_bps
        );
        default_slippage_bps = 9_999;
    }

    let confirm_timeout = Duration::from_secs(env_u64("GATEWAY_CONFIRM_TIMEOUT_SECS", 60));
    let poll_interval = Duration::from_millis(env_u64("GATEWAY_POLL_INTERVAL_MS", 2_000).max(100));
    let approve_confirm_timeout =
        Duration::from_secs(env_u64("GATEWAY_APPROVE_CONFIRM_TIMEOUT_SECS", 30));

    let gas_max_gwei = env_u64("GATEWAY_GAS_MAX_GWEI", 0);
    let gas_multiplier_pct = env_u64("GATEWAY_GAS_MULTIPLIER_PCT", 0);
    let solana_priority_fee_lamports = env_u64("GATEWAY_SOLANA_PRIORITY_FEE_LAMPORTS", 10_000);

    let hardware_auto_approve = env_bool("GATEWAY_HARDWARE_AUTO_APPROVE", false);

    let extra_nonce_error_patterns: Vec<String> = env::var("GATEWAY_NONCE_ERROR_PATTERNS")
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(Config {
        api_bind,
        networks,
        tokens,
        pools,
        evm_private_key,
        solana_keypair,
        max_nonce_gap,
        nonce_cache_max_age,
        default_lease_ttl_ms,
        reap_interval,
        quote_ttl,
        default_slippage_bps,
        confirm_timeout,
        poll_interval,
        approve_confirm_timeout,
        gas_max_gwei,
        gas_multiplier_pct,
        solana_priority_fee_lamports,
        hardware_auto_approve,
        extra_nonce_error_patterns,
    })
}

fn url_sanity(raw: &str) -> anyhow::Result<()> {
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        anyhow::bail!("rpc url must be http(s): {raw}");
    }
    Ok(())
}

impl Config {
    pub fn network(&self, name: &str) -> Result<&NetworkConfig, AppError> {
        self.networks
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("unknown network: {name}")))
    }

    /// Resolve a token by symbol (case-insensitive) or by address.
    pub fn token(&self, network: &str, symbol_or_address: &str) -> Result<TokenInfo, AppError> {
        let table = self
            .tokens
            .get(network)
            .ok_or_else(|| AppError::NotFound(format!("no tokens configured for network: {network}")))?;
        let wanted = symbol_or_address.trim();
        for (symbol, t) in table {
            if symbol.eq_ignore_ascii_case(wanted) || t.address.eq_ignore_ascii_case(wanted) {
                return Ok(TokenInfo {
                    symbol: symbol.clone(),
                    address: t.address.clone(),
                    decimals: t.decimals,
                    native: t.native,
                });
            }
        }
        Err(AppError::NotFound(format!("unknown token: {wanted}")))
    }

    /// Wrapped-native token for an account-nonce network, if configured.
    pub fn wrapped_native(&self, network: &str) -> Result<TokenInfo, AppError> {
        let net = self.network(network)?;
        let symbol = net.wrapped_native.as_deref().ok_or_else(|| {
            AppError::Validation(format!("network {network} has no wrapped-native token configured"))
        })?;
        self.token(network, symbol)
    }

    /// Effective slippage in bps: request value when present, config default otherwise.
    pub fn slippage_bps(&self, request_pct: Option<f64>) -> u64 {
        match request_pct {
            Some(pct) => ((pct * 100.0).round() as u64).min(9_999),
            None => self.default_slippage_bps,
        }
    }
}
