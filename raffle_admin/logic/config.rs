use crate::error::AdminError;
use crate::error::AdminError::*;
use crate::rounds::ThresholdPolicy;
use crate::types::*;
use std::time::Duration;

pub const DEFAULT_APP_URL: &str = "https://app.akibamiles.xyz";
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
/// 0.011 CELO
pub const DEFAULT_RANDOMNESS_FEE_WEI: u64 = 11_000_000_000_000_000;
pub const DEFAULT_CACHE_STALE_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// subgraph endpoint
    pub subgraph_url: Option<String>,
    /// JSON-RPC endpoint used for reads
    pub rpc_url: Option<String>,
    /// JSON-RPC endpoint that holds the operator key and signs `eth_sendTransaction`
    pub signer_rpc_url: Option<String>,
    pub operator: Option<Address>,
    pub raffle_manager: Address,
    pub miles_token: Address,
    pub multicall: Address,
    pub database_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Bot API base, without the `/bot<token>` part
    pub telegram_api_url: String,
    pub app_url: String,
    pub threshold: ThresholdPolicy,
    pub randomness_fee: Amount,
    pub cache_stale_after: Duration,
    pub listen_addr: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            subgraph_url: None,
            rpc_url: None,
            signer_rpc_url: None,
            operator: None,
            // constants are valid addresses
            raffle_manager: parse_address(RAFFLE_MANAGER).unwrap_or_default(),
            miles_token: parse_address(MILES_TOKEN).unwrap_or_default(),
            multicall: parse_address(MULTICALL3).unwrap_or_default(),
            database_url: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.into(),
            app_url: DEFAULT_APP_URL.into(),
            threshold: ThresholdPolicy::default(),
            randomness_fee: Amount::from(DEFAULT_RANDOMNESS_FEE_WEI),
            cache_stale_after: Duration::from_secs(DEFAULT_CACHE_STALE_SECS),
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
        }
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl AdminConfig {
    /// Loads the `.env` file if any, then reads the process environment
    pub fn from_env() -> Result<Self, AdminError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(get_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AdminError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AdminConfig::default();

        config.subgraph_url = lookup("SUBGRAPH_URL");
        config.rpc_url = lookup("RPC_URL");
        config.signer_rpc_url = lookup("SIGNER_RPC_URL").or_else(|| config.rpc_url.clone());
        config.operator = lookup("OPERATOR_ADDRESS")
            .map(|a| parse_address(&a))
            .transpose()?;
        if let Some(a) = lookup("RAFFLE_MANAGER") {
            config.raffle_manager = parse_address(&a)?;
        }
        if let Some(a) = lookup("MILES_TOKEN") {
            config.miles_token = parse_address(&a)?;
        }
        if let Some(a) = lookup("MULTICALL_ADDRESS") {
            config.multicall = parse_address(&a)?;
        }
        config.database_url = lookup("DATABASE_URL");
        config.telegram_bot_token = lookup("TELEGRAM_BOT_TOKEN");
        config.telegram_chat_id =
            lookup("TELEGRAM_ANNOUNCE_CHAT_ID").or_else(|| lookup("TELEGRAM_ADMIN_CHAT_ID"));
        if let Some(url) = lookup("TELEGRAM_API_URL") {
            config.telegram_api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("APP_URL") {
            config.app_url = url;
        }
        if let Some(p) = lookup("DRAW_THRESHOLD_PERCENT") {
            let percent = p
                .parse::<u64>()
                .ok()
                .filter(|p| *p <= 100)
                .ok_or(InvalidConfig("DRAW_THRESHOLD_PERCENT"))?;
            config.threshold = ThresholdPolicy::new(percent);
        }
        if let Some(fee) = lookup("RANDOMNESS_FEE_WEI") {
            config.randomness_fee =
                Amount::from_dec_str(&fee).or(Err(InvalidConfig("RANDOMNESS_FEE_WEI")))?;
        }
        if let Some(secs) = lookup("CACHE_STALE_SECS") {
            let secs = secs
                .parse::<u64>()
                .or(Err(InvalidConfig("CACHE_STALE_SECS")))?;
            config.cache_stale_after = Duration::from_secs(secs);
        }
        if let Some(addr) = lookup("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        Ok(config)
    }

    pub fn ensure_operator(&self) -> Result<Address, AdminError> {
        self.operator.ok_or(SenderNotConfigured)
    }

    /// bot token and chat id, both are needed to announce a round
    pub fn ensure_telegram(&self) -> Result<(&str, &str), AdminError> {
        match (&self.telegram_bot_token, &self.telegram_chat_id) {
            (Some(token), Some(chat)) => Ok((token.as_str(), chat.as_str())),
            _ => Err(NotifierNotConfigured),
        }
    }
}
