use crate::error::AdminError;
use crate::evm_contract::RaffleReader;
use crate::indexer::{self, parse_count, parse_round_id, parse_timestamp, IndexerClient, PastRaffleEvents, TicketTotals};
use crate::types::*;
use crate::units::{format_units, format_units_grouped};
use log::{info, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

pub const PAST_RAFFLES_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PastWinner {
    pub address: String,
    pub reward: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PastRaffle {
    pub round_id: RoundId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub duration_sec: i64,
    pub raffle_type: u8,
    pub raffle_type_label: &'static str,
    pub reward_token: Option<String>,
    pub symbol: String,
    /// formatted with the token decimals
    pub reward_pool: String,
    /// grouped amount followed by the symbol
    pub reward_display: String,
    pub max_tickets: u64,
    pub total_tickets: u64,
    pub winner: Option<String>,
    pub winner_reward: Option<String>,
    pub winner_ts: Option<Timestamp>,
    pub winners: Vec<PastWinner>,
}

fn amount_of(value: Option<&str>) -> Amount {
    value
        .and_then(|v| Amount::from_dec_str(v).ok())
        .unwrap_or_default()
}

/// distinct, non-zero reward tokens of the rounds
pub fn reward_tokens(events: &PastRaffleEvents) -> Vec<Address> {
    let mut seen = HashSet::new();
    events
        .rounds
        .iter()
        .filter_map(|r| r.reward_token.as_deref())
        .filter_map(|t| parse_address(t).ok())
        .filter(|a| !a.is_zero() && seen.insert(*a))
        .collect()
}

/// Finished raffles, newest first. A round counts as finished once its end time
/// is past or as soon as a winner event exists for it, whichever comes first.
pub fn merge_past_raffles(
    events: &PastRaffleEvents,
    tokens: &HashMap<Address, TokenMeta>,
    totals: &TicketTotals,
    now: Timestamp,
) -> Vec<PastRaffle> {
    // winner events come newest first, keep the newest per round
    let mut winners: HashMap<RoundId, Vec<(String, Amount, Option<Timestamp>)>> = HashMap::new();
    for w in &events.winners {
        let Some(id) = parse_round_id(&w.round_id) else {
            continue;
        };
        winners.entry(id).or_insert_with(|| {
            vec![(
                w.winner.clone(),
                amount_of(Some(&w.reward)),
                w.block_timestamp.as_deref().map(|t| parse_timestamp(Some(t))),
            )]
        });
    }
    for m in &events.multi_winners {
        let Some(id) = parse_round_id(&m.round_id) else {
            continue;
        };
        let ts = m
            .block_timestamp
            .as_deref()
            .map(|t| parse_timestamp(Some(t)));
        winners.entry(id).or_insert_with(|| {
            m.winners
                .iter()
                .enumerate()
                .map(|(i, a)| (a.clone(), amount_of(m.amounts.get(i).map(String::as_str)), ts))
                .collect()
        });
    }

    let mut past: Vec<PastRaffle> = events
        .rounds
        .iter()
        .filter_map(|r| {
            let round_id = parse_round_id(&r.round_id)?;
            let start = parse_timestamp(r.start_time.as_deref());
            let end = parse_timestamp(r.end_time.as_deref());
            let round_winners = winners.get(&round_id).filter(|w| !w.is_empty());
            if end >= now && round_winners.is_none() {
                return None;
            }

            let token = r.reward_token.as_deref().and_then(|t| parse_address(t).ok());
            let meta = token
                .and_then(|t| tokens.get(&t).cloned())
                .unwrap_or_else(TokenMeta::unknown);
            let pool = amount_of(r.reward_pool.as_deref());
            let raffle_type = r.round_type.unwrap_or(0);
            let list: Vec<PastWinner> = round_winners
                .map(|ws| {
                    ws.iter()
                        .map(|(address, reward, _)| PastWinner {
                            address: address.clone(),
                            reward: format_units(*reward, meta.decimals),
                        })
                        .collect()
                })
                .unwrap_or_default();
            let first = round_winners.and_then(|ws| ws.first());

            Some(PastRaffle {
                round_id,
                start,
                end,
                duration_sec: end.saturating_sub(start),
                raffle_type,
                raffle_type_label: RaffleType::try_from(raffle_type)
                    .map(|t| t.badge())
                    .unwrap_or("Single"),
                reward_token: token.map(|t| address_hex(&t)),
                reward_pool: format_units(pool, meta.decimals),
                reward_display: format!("{} {}", format_units_grouped(pool, meta.decimals), meta.symbol),
                symbol: meta.symbol,
                max_tickets: parse_count(r.max_tickets.as_deref()),
                total_tickets: totals.tickets_of(round_id),
                winner: first.map(|(a, _, _)| a.clone()),
                winner_reward: first.map(|(_, reward, _)| format_units(*reward, meta.decimals)),
                winner_ts: first.and_then(|(_, _, ts)| *ts),
                winners: list,
            })
        })
        .collect();

    past.sort_by(|a, b| b.round_id.cmp(&a.round_id));
    past
}

/// Token metadata is best effort: when the reader is missing or fails every
/// token shows as `???` with 18 decimals.
pub async fn load_past_raffles<I: IndexerClient, R: RaffleReader>(
    indexer: &I,
    reader: Option<&R>,
    now: Timestamp,
) -> Result<Vec<PastRaffle>, AdminError> {
    let events = indexer::fetch_past_raffle_events(indexer, PAST_RAFFLES_LIMIT).await?;
    let round_ids: Vec<String> = events.rounds.iter().map(|r| r.round_id.clone()).collect();
    let totals = indexer::fetch_ticket_totals(indexer, &round_ids).await?;

    let token_addrs = reward_tokens(&events);
    let tokens = match reader {
        Some(reader) if !token_addrs.is_empty() => reader
            .token_metadata(&token_addrs)
            .await
            .unwrap_or_else(|e| {
                warn!("token metadata unavailable: {e}");
                HashMap::new()
            }),
        _ => HashMap::new(),
    };

    let past = merge_past_raffles(&events, &tokens, &totals, now);
    info!("{} past raffles out of {} rounds", past.len(), events.rounds.len());
    Ok(past)
}
