use crate::error::AdminError::{self, *};
use crate::evm_contract::{NewRound, RaffleWriter};
use crate::metadata::RaffleMetaFields;
use crate::notification::RoundStarted;
use crate::types::*;
use crate::units::{format_units, parse_units};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

const PRIZE_NFT_SYMBOL: &str = "PrizeNFT";

fn default_duration_days() -> u64 {
    7
}

fn default_max_tickets() -> u32 {
    1000
}

fn default_ticket_cost() -> String {
    "10".into()
}

fn default_true() -> bool {
    true
}

/// Operator input of the create-round form
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoundRequest {
    #[serde(default)]
    pub raffle_type: u8,
    /// symbol of a known token or its address, USDT when omitted
    #[serde(default)]
    pub token: Option<String>,
    /// human amount in token units
    #[serde(default)]
    pub reward: Option<String>,
    #[serde(default)]
    pub start_in_minutes: u64,
    #[serde(default = "default_duration_days")]
    pub duration_days: u64,
    #[serde(default = "default_max_tickets")]
    pub max_tickets: u32,
    /// AkibaMiles per ticket
    #[serde(default = "default_ticket_cost")]
    pub ticket_cost_miles: String,
    #[serde(default)]
    pub reward_uri: Option<String>,
    #[serde(default = "default_true")]
    pub request_randomness: bool,
    /// display metadata stored next to the round once it exists
    #[serde(default)]
    pub meta: Option<RaffleMetaFields>,
}

impl Default for CreateRoundRequest {
    fn default() -> Self {
        Self {
            raffle_type: 0,
            token: None,
            reward: None,
            start_in_minutes: 0,
            duration_days: default_duration_days(),
            max_tickets: default_max_tickets(),
            ticket_cost_miles: default_ticket_cost(),
            reward_uri: None,
            request_randomness: true,
            meta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundPlan {
    pub round: NewRound,
    pub token_symbol: String,
    pub decimals: u8,
    pub reward_human: String,
    pub ticket_cost_miles: String,
    /// ERC-20 rewards are pulled by the manager and need an allowance first
    pub needs_approval: bool,
}

impl RoundPlan {
    pub fn announcement(&self, round_id: RoundId) -> RoundStarted {
        let physical = self.round.raffle_type.is_physical();
        RoundStarted {
            round_id: Some(json!(round_id)),
            raffle_type: Some(u8::from(self.round.raffle_type)),
            is_physical: physical,
            token_symbol: Some(self.token_symbol.clone()),
            token_address: Some(address_hex(&self.round.token)),
            reward_human: (!physical).then(|| self.reward_human.clone()),
            ticket_cost_miles: Some(json!(self.ticket_cost_miles)),
            max_tickets: Some(json!(self.round.max_tickets)),
            start_time: Some(self.round.start_time),
            duration_seconds: Some(self.round.duration as i64),
            reward_uri: Some(self.round.reward_uri.clone()).filter(|u| !u.is_empty()),
        }
    }
}

/// Validates the form and resolves everything the contract call needs.
/// Physical rounds pay out the prize NFT voucher: reward 0, no approval.
pub fn plan_round(
    request: &CreateRoundRequest,
    prize_nft: Option<Address>,
    miles_token: Address,
    now: Timestamp,
) -> Result<RoundPlan, AdminError> {
    let raffle_type = RaffleType::try_from(request.raffle_type)?;
    if request.duration_days == 0 || request.max_tickets == 0 {
        return Err(InvalidSchedule);
    }
    let start_time = i64::try_from(request.start_in_minutes)
        .ok()
        .and_then(|m| m.checked_mul(60))
        .and_then(|secs| now.checked_add(secs))
        .ok_or(InvalidSchedule)?;
    let duration = request
        .duration_days
        .checked_mul(86_400)
        .filter(|d| i64::try_from(*d).is_ok())
        .ok_or(InvalidSchedule)?;
    let reward_uri = request
        .reward_uri
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let (token, token_symbol, decimals, reward_pool) = if raffle_type.is_physical() {
        let nft = prize_nft.ok_or(PrizeNftNotSet)?;
        if reward_uri.is_empty() {
            return Err(RewardUriRequired);
        }
        (nft, PRIZE_NFT_SYMBOL.to_string(), 0, Amount::zero())
    } else {
        let wanted = request.token.as_deref().unwrap_or(KNOWN_TOKENS[0].0);
        let (symbol, address, decimals) = known_token_by_symbol(wanted)
            .or_else(|| {
                parse_address(wanted)
                    .ok()
                    .and_then(|a| known_token_by_address(&a))
            })
            .ok_or(UnknownToken(wanted.to_string()))?;
        let reward = request
            .reward
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .ok_or(RewardMustBePositive)?;
        let reward_pool = parse_units(reward, decimals)?;
        if reward_pool.is_zero() {
            return Err(RewardMustBePositive);
        }
        (address, symbol.to_string(), decimals, reward_pool)
    };

    let cost = if request.ticket_cost_miles.trim().is_empty() {
        "0"
    } else {
        request.ticket_cost_miles.trim()
    };
    let ticket_cost_points = parse_units(cost, 18)?;

    let needs_approval = !raffle_type.is_physical() && token != miles_token;

    Ok(RoundPlan {
        round: NewRound {
            start_time,
            duration,
            max_tickets: request.max_tickets,
            token,
            raffle_type,
            reward_pool,
            ticket_cost_points,
            reward_uri,
        },
        token_symbol,
        decimals,
        reward_human: format_units(reward_pool, decimals),
        ticket_cost_miles: format_units(ticket_cost_points, 18),
        needs_approval,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRound {
    /// unknown when neither the receipt nor the counter gave it away
    pub round_id: Option<RoundId>,
    pub approve_tx: Option<TxHash>,
    pub create_tx: TxHash,
    pub randomness_tx: Option<TxHash>,
    /// the round exists even when the randomness request failed
    pub randomness_error: Option<String>,
}

/// approve (when needed) -> create -> request randomness (when a fee is given)
pub async fn create_round<W: RaffleWriter>(
    writer: &W,
    plan: &RoundPlan,
    randomness_fee: Option<Amount>,
) -> Result<CreatedRound, AdminError> {
    let approve_tx = if plan.needs_approval {
        Some(writer.approve(plan.round.token, plan.round.reward_pool).await?)
    } else {
        None
    };

    let created = writer.create_round(&plan.round).await?;
    let round_id = match created.round_id {
        Some(id) => Some(id),
        None => match writer.round_count().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("round created in {} but its id is unknown: {e}", created.tx_hash);
                None
            }
        },
    };
    info!("round {round_id:?} created in {}", created.tx_hash);

    let mut result = CreatedRound {
        round_id,
        approve_tx,
        create_tx: created.tx_hash,
        randomness_tx: None,
        randomness_error: None,
    };

    if let (Some(fee), Some(id)) = (randomness_fee, round_id) {
        match writer.request_randomness(id, fee).await {
            Ok(tx) => result.randomness_tx = Some(tx),
            Err(e) => {
                error!("randomness request for round {id} failed: {e}");
                result.randomness_error = Some(e.to_string());
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::evm_contract::CreatedRoundTx;
    use std::sync::Mutex;

    /// Records the writes in order, fails the ones listed in `fail_on`
    #[derive(Default)]
    pub struct RecordingWriter {
        pub calls: Mutex<Vec<String>>,
        pub receipt_round_id: Option<RoundId>,
        pub counter: RoundId,
        pub fail_on: Vec<&'static str>,
    }

    impl RecordingWriter {
        fn record(&self, call: String, name: &'static str) -> Result<TxHash, AdminError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            if self.fail_on.contains(&name) {
                return Err(TransactionReverted(format!("0x{name}")));
            }
            Ok(format!("0x{:02}", calls.len()))
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RaffleWriter for RecordingWriter {
        async fn approve(&self, token: Address, amount: Amount) -> Result<TxHash, AdminError> {
            self.record(format!("approve {} {amount}", address_hex(&token)), "approve")
        }

        async fn create_round(&self, round: &NewRound) -> Result<CreatedRoundTx, AdminError> {
            let tx_hash = self.record(format!("create {}", round.reward_pool), "create")?;
            Ok(CreatedRoundTx {
                tx_hash,
                round_id: self.receipt_round_id,
            })
        }

        async fn round_count(&self) -> Result<RoundId, AdminError> {
            self.record("count".into(), "count")?;
            Ok(self.counter)
        }

        async fn request_randomness(
            &self,
            round_id: RoundId,
            fee: Amount,
        ) -> Result<TxHash, AdminError> {
            self.record(format!("randomness {round_id} {fee}"), "randomness")
        }

        async fn draw_winner(&self, round_id: RoundId) -> Result<TxHash, AdminError> {
            self.record(format!("draw {round_id}"), "draw")
        }

        async fn close_raffle(&self, round_id: RoundId) -> Result<TxHash, AdminError> {
            self.record(format!("close {round_id}"), "close")
        }
    }
}
