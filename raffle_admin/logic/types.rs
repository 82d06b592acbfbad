use crate::error::AdminError;
use serde::{Deserialize, Serialize};

pub use ethabi::Address;

pub type RoundId = u64;
/// Unix timestamp in seconds
pub type Timestamp = i64;
/// Token amount in base units
pub type Amount = ethabi::Uint;
pub type TxHash = String;

pub const RAFFLE_MANAGER: &str = "0xD75dfa972C6136f1c594Fec1945302f885E1ab29";
pub const MILES_TOKEN: &str = "0xEeD878017f027FE96316007D0ca5fDA58Ee93a6b";
pub const MULTICALL3: &str = "0xcA11bde05977b3631167028862bE2a173976CA11";

/// Reward tokens the operator can pick for cash and miles raffles: (symbol, address, decimals)
pub const KNOWN_TOKENS: [(&str, &str, u8); 3] = [
    ("USDT", "0x48065fbBE25f71C9282ddf5e1cD6D6A887483D5e", 6),
    ("cUSD", "0x765de816845861e75a25fca122bb6898b8b1282a", 18),
    ("AkibaMiles", MILES_TOKEN, 18),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RaffleType {
    Single,
    Top3,
    Top5,
    Physical,
}

impl RaffleType {
    pub fn label(&self) -> &'static str {
        match self {
            RaffleType::Single => "Single winner",
            RaffleType::Top3 => "Top 3 (50/30/20)",
            RaffleType::Top5 => "Top 5 (50/25/15/10/10)",
            RaffleType::Physical => "Physical prize (NFT voucher)",
        }
    }

    pub fn badge(&self) -> &'static str {
        match self {
            RaffleType::Single => "Single",
            RaffleType::Top3 => "Top-3",
            RaffleType::Top5 => "Top-5",
            RaffleType::Physical => "Physical",
        }
    }

    pub fn is_physical(&self) -> bool {
        *self == RaffleType::Physical
    }
}

impl TryFrom<u8> for RaffleType {
    type Error = AdminError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RaffleType::Single),
            1 => Ok(RaffleType::Top3),
            2 => Ok(RaffleType::Top5),
            3 => Ok(RaffleType::Physical),
            n => Err(AdminError::InvalidRaffleType(n)),
        }
    }
}

impl From<RaffleType> for u8 {
    fn from(value: RaffleType) -> Self {
        match value {
            RaffleType::Single => 0,
            RaffleType::Top3 => 1,
            RaffleType::Top5 => 2,
            RaffleType::Physical => 3,
        }
    }
}

/// Round tuple returned by `getActiveRound` / `getRound`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainRound {
    pub round_id: RoundId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub max_tickets: u64,
    pub total_tickets: u64,
    pub reward_token: Address,
    pub reward_pool: Amount,
    pub ticket_cost_points: Amount,
    pub winners_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMeta {
    /// placeholder used when the token does not answer `symbol()` / `decimals()`
    pub fn unknown() -> Self {
        Self {
            symbol: "???".into(),
            decimals: 18,
        }
    }
}

pub fn parse_address(value: &str) -> Result<Address, AdminError> {
    let trimmed = value.trim();
    let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let bytes = hex::decode(raw).or(Err(AdminError::InvalidAddress(value.to_string())))?;
    if bytes.len() != 20 {
        return Err(AdminError::InvalidAddress(value.to_string()));
    }
    Ok(Address::from_slice(&bytes))
}

/// lower case, 0x prefixed
pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_bytes()))
}

pub fn unix_now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

pub fn known_token_by_symbol(symbol: &str) -> Option<(&'static str, Address, u8)> {
    KNOWN_TOKENS
        .iter()
        .find(|(s, _, _)| s.eq_ignore_ascii_case(symbol))
        .and_then(|(s, a, d)| parse_address(a).ok().map(|a| (*s, a, *d)))
}

pub fn known_token_by_address(address: &Address) -> Option<(&'static str, Address, u8)> {
    KNOWN_TOKENS
        .iter()
        .filter_map(|(s, a, d)| parse_address(a).ok().map(|a| (*s, a, *d)))
        .find(|(_, a, _)| a == address)
}
