use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("subgraph url is not configured")]
    IndexerNotConfigured,
    #[error("rpc url is not configured")]
    RpcNotConfigured,
    #[error("operator address is not configured")]
    SenderNotConfigured,
    #[error("Telegram env vars not configured")]
    NotifierNotConfigured,
    #[error("metadata store is not configured")]
    MetaStoreNotConfigured,

    // errors when talking to the outside world
    #[error("http request failed: {0}")]
    HttpRequestFailed(String),
    #[error("invalid response body: {0}")]
    InvalidResponseBody(String),
    #[error("subgraph error: {0}")]
    GraphQl(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("failed to decode the contract response")]
    FailedToDecodeResponse,
    #[error("transaction {0} reverted")]
    TransactionReverted(String),
    #[error("no receipt for transaction {0}")]
    ReceiptTimeout(String),
    #[error("failed to send the notification (status {0})")]
    NotificationFailed(u16),
    #[error("database error: {0}")]
    Database(String),

    // errors when parsing operator input
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("unknown reward token: {0}")]
    UnknownToken(String),
    #[error("invalid config value for {0}")]
    InvalidConfig(&'static str),

    // validation errors
    #[error("roundId is required")]
    RoundIdRequired,
    #[error("roundId and kind are required")]
    KindRequired,
    #[error("Reward must be greater than 0 (unless Physical).")]
    RewardMustBePositive,
    #[error("Reward URI is required for physical prizes.")]
    RewardUriRequired,
    #[error("Prize NFT address not set on the contract yet.")]
    PrizeNftNotSet,
    #[error("unknown raffle type {0}")]
    InvalidRaffleType(u8),
    #[error("duration and max tickets must be greater than 0")]
    InvalidSchedule,
}

impl AdminError {
    /// Input errors the operator can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AdminError::InvalidAddress(_)
                | AdminError::InvalidAmount(_)
                | AdminError::UnknownToken(_)
                | AdminError::RoundIdRequired
                | AdminError::KindRequired
                | AdminError::RewardMustBePositive
                | AdminError::RewardUriRequired
                | AdminError::PrizeNftNotSet
                | AdminError::InvalidRaffleType(_)
                | AdminError::InvalidSchedule
        )
    }
}

impl From<reqwest::Error> for AdminError {
    fn from(error: reqwest::Error) -> Self {
        log::error!("http error: {error:?}");
        if error.is_decode() {
            AdminError::InvalidResponseBody(error.to_string())
        } else {
            AdminError::HttpRequestFailed(error.to_string())
        }
    }
}

impl From<sqlx::Error> for AdminError {
    fn from(error: sqlx::Error) -> Self {
        log::error!("database error: {error:?}");
        AdminError::Database(error.to_string())
    }
}

impl From<ethabi::Error> for AdminError {
    fn from(error: ethabi::Error) -> Self {
        log::debug!("abi error: {error:?}");
        AdminError::FailedToDecodeResponse
    }
}
