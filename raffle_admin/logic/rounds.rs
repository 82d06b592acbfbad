use crate::error::AdminError;
use crate::evm_contract::RaffleReader;
use crate::indexer::{self, parse_count, parse_round_id, parse_timestamp, IndexerClient, RoundEvents, TicketTotals};
use crate::types::*;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;

/// number of rounds listed in the admin overview
pub const ADMIN_ROUNDS_LIMIT: u32 = 100;
/// number of rounds considered for draw / close
pub const DRAWABLE_ROUNDS_LIMIT: u32 = 200;

/// Share of `maxTickets` that must be sold before a round can be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub percent: u64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self { percent: 20 }
    }
}

impl ThresholdPolicy {
    pub fn new(percent: u64) -> Self {
        Self { percent }
    }

    /// false when `max_tickets` is 0: no cap means no threshold to meet
    pub fn meets(&self, total_tickets: u64, max_tickets: u64) -> bool {
        max_tickets > 0
            && (total_tickets as u128) * 100 >= (max_tickets as u128) * (self.percent as u128)
    }

    /// false when `max_tickets` is 0, like [`ThresholdPolicy::meets`]
    pub fn under(&self, total_tickets: u64, max_tickets: u64) -> bool {
        max_tickets > 0
            && (total_tickets as u128) * 100 < (max_tickets as u128) * (self.percent as u128)
    }
}

/// What is known about a round when deciding on the operator action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoundState {
    pub end: Timestamp,
    pub max_tickets: u64,
    pub total_tickets: u64,
    pub drawn: bool,
    pub closed: bool,
    pub randomness_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStatus {
    pub ended: bool,
    pub max_reached: bool,
    pub meets_threshold: bool,
    pub under_threshold: bool,
    pub can_draw: bool,
    pub can_close: bool,
}

pub fn classify(state: &RoundState, policy: &ThresholdPolicy, now: Timestamp) -> RoundStatus {
    let ended = state.end > 0 && now > state.end;
    let max_reached = state.max_tickets > 0 && state.total_tickets >= state.max_tickets;
    let meets_threshold = policy.meets(state.total_tickets, state.max_tickets);
    let under_threshold = policy.under(state.total_tickets, state.max_tickets);
    let settled = state.drawn || state.closed;

    RoundStatus {
        ended,
        max_reached,
        meets_threshold,
        under_threshold,
        can_draw: !settled
            && (ended || max_reached)
            && meets_threshold
            && state.randomness_requested,
        can_close: !settled && ended && under_threshold,
    }
}

/// "Ended", "3d" or "4h 12m"
pub fn ends_label(ends_in: i64) -> String {
    if ends_in <= 0 {
        "Ended".into()
    } else if ends_in >= 86_400 {
        format!("{}d", ends_in / 86_400)
    } else {
        format!("{}h {}m", ends_in / 3600, (ends_in % 3600) / 60)
    }
}

/// Row of the admin overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRoundView {
    pub id: RoundId,
    pub active: bool,
    /// seconds remaining, <= 0 once ended
    pub ends_in: i64,
    pub ends_label: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub max_tickets: u64,
    pub total_tickets: u64,
    pub max_reached: bool,
    pub drawn: bool,
    pub closed: bool,
    pub raffle_type: u8,
    pub participant_events: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Subgraph,
    Chain,
}

/// Row of the draw / close screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawableRound {
    pub id: RoundId,
    pub ends_in: i64,
    pub ends_label: String,
    pub ended: bool,
    pub max_tickets: u64,
    pub total_tickets: u64,
    pub max_reached: bool,
    pub drawn: bool,
    pub closed: bool,
    pub raffle_type: u8,
    pub rand_requested: bool,
    pub meets_threshold: bool,
    pub under_threshold: bool,
    pub can_draw: bool,
    pub can_close: bool,
    /// where the ticket numbers come from
    pub source: DataSource,
}

pub fn combine_admin_rounds(
    events: &RoundEvents,
    totals: &TicketTotals,
    now: Timestamp,
) -> Vec<AdminRoundView> {
    let mut rounds: Vec<AdminRoundView> = events
        .created
        .iter()
        .filter_map(|r| {
            let id = parse_round_id(&r.round_id)?;
            let start = parse_timestamp(r.start_time.as_deref());
            let end = parse_timestamp(r.end_time.as_deref());
            let max_tickets = parse_count(r.max_tickets.as_deref());
            let total_tickets = totals.tickets_of(id);
            let drawn = events.drawn.contains(&id);
            let closed = events.closed.contains(&id);

            Some(AdminRoundView {
                id,
                active: !drawn && !closed && now >= start && now <= end,
                ends_in: end.saturating_sub(now),
                ends_label: ends_label(end.saturating_sub(now)),
                start,
                end,
                max_tickets,
                total_tickets,
                max_reached: max_tickets > 0 && total_tickets >= max_tickets,
                drawn,
                closed,
                raffle_type: r.round_type.unwrap_or(0),
                participant_events: totals.joins_of(id),
            })
        })
        .collect();

    rounds.sort_by(|a, b| b.id.cmp(&a.id));
    rounds
}

/// Classifies every created round. When the contract answered for a round its
/// tuple wins over the subgraph numbers, and `winnersSelected` marks it drawn.
pub fn derive_drawable(
    events: &RoundEvents,
    totals: &TicketTotals,
    on_chain: &HashMap<RoundId, OnChainRound>,
    policy: &ThresholdPolicy,
    now: Timestamp,
) -> Vec<DrawableRound> {
    let mut rounds: Vec<DrawableRound> = events
        .created
        .iter()
        .filter_map(|r| {
            let id = parse_round_id(&r.round_id)?;
            let mut state = RoundState {
                end: parse_timestamp(r.end_time.as_deref()),
                max_tickets: parse_count(r.max_tickets.as_deref()),
                total_tickets: totals.tickets_of(id),
                drawn: events.drawn.contains(&id),
                closed: events.closed.contains(&id),
                randomness_requested: events.randomness_requested.contains(&id),
            };

            let mut source = DataSource::Subgraph;
            if let Some(chain) = on_chain.get(&id) {
                if chain.total_tickets != state.total_tickets {
                    debug!(
                        "round {id}: subgraph counts {} tickets, contract {}",
                        state.total_tickets, chain.total_tickets
                    );
                }
                state.end = chain.end;
                state.max_tickets = chain.max_tickets;
                state.total_tickets = chain.total_tickets;
                state.drawn |= chain.winners_selected;
                source = DataSource::Chain;
            }

            let status = classify(&state, policy, now);
            Some(DrawableRound {
                id,
                ends_in: state.end.saturating_sub(now),
                ends_label: ends_label(state.end.saturating_sub(now)),
                ended: status.ended,
                max_tickets: state.max_tickets,
                total_tickets: state.total_tickets,
                max_reached: status.max_reached,
                drawn: state.drawn,
                closed: state.closed,
                raffle_type: r.round_type.unwrap_or(0),
                rand_requested: state.randomness_requested,
                meets_threshold: status.meets_threshold,
                under_threshold: status.under_threshold,
                can_draw: status.can_draw,
                can_close: status.can_close,
                source,
            })
        })
        .collect();

    rounds.sort_by(|a, b| b.id.cmp(&a.id));
    rounds
}

pub async fn load_admin_rounds<I: IndexerClient>(
    indexer: &I,
    now: Timestamp,
) -> Result<Vec<AdminRoundView>, AdminError> {
    let events = indexer::fetch_round_events(indexer, ADMIN_ROUNDS_LIMIT).await?;
    let totals = indexer::fetch_ticket_totals(indexer, &events.round_ids()).await?;
    Ok(combine_admin_rounds(&events, &totals, now))
}

/// A failed contract read only costs the override: the subgraph numbers are used instead.
pub async fn load_drawable_rounds<I: IndexerClient, R: RaffleReader>(
    indexer: &I,
    reader: Option<&R>,
    policy: &ThresholdPolicy,
    now: Timestamp,
) -> Result<Vec<DrawableRound>, AdminError> {
    let events = indexer::fetch_round_events(indexer, DRAWABLE_ROUNDS_LIMIT).await?;
    let totals = indexer::fetch_ticket_totals(indexer, &events.round_ids()).await?;

    let on_chain = match reader {
        Some(reader) => {
            let ids: Vec<RoundId> = events
                .created
                .iter()
                .filter_map(|r| parse_round_id(&r.round_id))
                .collect();
            reader.fetch_rounds(&ids).await.unwrap_or_else(|e| {
                warn!("on-chain round read failed, using subgraph counts: {e}");
                HashMap::new()
            })
        }
        None => HashMap::new(),
    };

    let rounds = derive_drawable(&events, &totals, &on_chain, policy, now);
    info!(
        "{} rounds, {} drawable, {} closeable",
        rounds.len(),
        rounds.iter().filter(|r| r.can_draw).count(),
        rounds.iter().filter(|r| r.can_close).count()
    );
    Ok(rounds)
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    #[derive(Default)]
    pub struct MockReader {
        pub rounds: HashMap<RoundId, OnChainRound>,
        pub tokens: HashMap<Address, TokenMeta>,
        pub fail: bool,
    }

    impl RaffleReader for MockReader {
        async fn fetch_rounds(
            &self,
            ids: &[RoundId],
        ) -> Result<HashMap<RoundId, OnChainRound>, AdminError> {
            if self.fail {
                return Err(AdminError::Rpc("execution reverted".into()));
            }
            Ok(ids
                .iter()
                .filter_map(|id| self.rounds.get(id).map(|r| (*id, r.clone())))
                .collect())
        }

        async fn token_metadata(
            &self,
            tokens: &[Address],
        ) -> Result<HashMap<Address, TokenMeta>, AdminError> {
            if self.fail {
                return Err(AdminError::Rpc("execution reverted".into()));
            }
            Ok(tokens
                .iter()
                .map(|t| (*t, self.tokens.get(t).cloned().unwrap_or_else(TokenMeta::unknown)))
                .collect())
        }
    }
}
