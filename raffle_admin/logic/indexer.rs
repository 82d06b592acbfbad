use crate::error::AdminError::{self, *};
use crate::types::*;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// Anything able to answer a GraphQL query against the raffle subgraph
pub trait IndexerClient: Send + Sync {
    fn query<T>(
        &self,
        query: &str,
        variables: Value,
    ) -> impl Future<Output = Result<T, AdminError>> + Send
    where
        T: DeserializeOwned + Send;
}

#[derive(Deserialize, Debug)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Value>,
}

pub struct Indexer {
    endpoint: String,
    http: reqwest::Client,
}

impl Indexer {
    pub fn new(url: Option<String>) -> Result<Self, AdminError> {
        let endpoint = url.ok_or(IndexerNotConfigured)?;
        Ok(Self {
            endpoint,
            http: reqwest::Client::new(),
        })
    }
}

impl IndexerClient for Indexer {
    async fn query<T>(&self, query: &str, variables: Value) -> Result<T, AdminError>
    where
        T: DeserializeOwned + Send,
    {
        let body = json!({ "query": query, "variables": variables });
        debug!("subgraph query: {body}");

        let resp = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = resp.status();
        let result: GraphQlResponse<T> = resp.json().await?;

        if let Some(errors) = result.errors {
            return Err(GraphQl(errors.to_string()));
        }
        if !status.is_success() {
            return Err(GraphQl(status.to_string()));
        }
        result
            .data
            .ok_or(InvalidResponseBody("missing data".into()))
    }
}

/// `roundCreated` entity, only the fields asked by the query are present
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundCreatedNode {
    pub round_id: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_tickets: Option<String>,
    pub ticket_cost_points: Option<String>,
    pub round_type: Option<u8>,
    pub reward_token: Option<String>,
    pub reward_pool: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundRefNode {
    pub round_id: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoinedNode {
    pub id: String,
    pub round_id: String,
    pub tickets: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WinnerSelectedNode {
    pub round_id: String,
    pub winner: String,
    pub reward: String,
    #[serde(default)]
    pub block_timestamp: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiWinnersSelectedNode {
    pub round_id: String,
    pub winners: Vec<String>,
    pub amounts: Vec<String>,
    #[serde(default)]
    pub block_timestamp: Option<String>,
}

/// Parses the numeric strings the subgraph uses for `BigInt` fields.
/// Anything unreadable counts as zero.
pub fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Same as [`parse_count`] for seconds since the epoch; past `i64::MAX` is unreadable
pub fn parse_timestamp(value: Option<&str>) -> Timestamp {
    Timestamp::try_from(parse_count(value)).unwrap_or(0)
}

pub fn parse_round_id(value: &str) -> Option<RoundId> {
    let id = value.parse().ok();
    if id.is_none() {
        warn!("ignoring event with round id {value:?}");
    }
    id
}

fn id_set(nodes: &[RoundRefNode]) -> HashSet<RoundId> {
    nodes
        .iter()
        .filter_map(|n| parse_round_id(&n.round_id))
        .collect()
}

const ROUND_EVENTS_QUERY: &str = r#"
  query RoundEvents($first: Int!) {
    roundCreateds(first: $first, orderBy: roundId, orderDirection: desc) {
      roundId
      startTime
      endTime
      maxTickets
      ticketCostPoints
      roundType
    }
    winnerSelecteds(first: 1000, orderBy: roundId, orderDirection: desc) { roundId }
    multiWinnersSelecteds(first: 1000, orderBy: roundId, orderDirection: desc) { roundId }
    raffleCloseds(first: 1000, orderBy: roundId, orderDirection: desc) { roundId }
    randomnessRequesteds(first: 1000, orderBy: roundId, orderDirection: desc) { roundId }
  }
"#;

const JOINS_FIRST_PAGE_QUERY: &str = r#"
  query JoinsFirst($ids: [String!]!) {
    participantJoineds(
      first: 1000
      orderBy: id
      orderDirection: desc
      where: { roundId_in: $ids }
    ) {
      id
      roundId
      tickets
    }
  }
"#;

const JOINS_PAGE_QUERY: &str = r#"
  query Joins($ids: [String!]!, $cursor: String) {
    participantJoineds(
      first: 1000
      orderBy: id
      orderDirection: desc
      where: { roundId_in: $ids, id_lt: $cursor }
    ) {
      id
      roundId
      tickets
    }
  }
"#;

const PAST_RAFFLES_QUERY: &str = r#"
  query PastRaffles($first: Int!) {
    roundCreateds(first: $first, orderBy: roundId, orderDirection: desc) {
      roundId
      startTime
      endTime
      rewardToken
      rewardPool
      maxTickets
      ticketCostPoints
      roundType
    }
    winnerSelecteds(first: $first, orderBy: blockTimestamp, orderDirection: desc) {
      roundId
      winner
      reward
      blockTimestamp
    }
    multiWinnersSelecteds(first: $first, orderBy: blockTimestamp, orderDirection: desc) {
      roundId
      winners
      amounts
      blockTimestamp
    }
  }
"#;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct RoundEventsData {
    round_createds: Vec<RoundCreatedNode>,
    winner_selecteds: Vec<RoundRefNode>,
    multi_winners_selecteds: Vec<RoundRefNode>,
    raffle_closeds: Vec<RoundRefNode>,
    randomness_requesteds: Vec<RoundRefNode>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct JoinsData {
    participant_joineds: Vec<ParticipantJoinedNode>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct PastRafflesData {
    round_createds: Vec<RoundCreatedNode>,
    winner_selecteds: Vec<WinnerSelectedNode>,
    multi_winners_selecteds: Vec<MultiWinnersSelectedNode>,
}

/// Lifecycle events of the latest rounds
#[derive(Debug, Clone, Default)]
pub struct RoundEvents {
    pub created: Vec<RoundCreatedNode>,
    /// rounds with a `WinnerSelected` or `MultiWinnersSelected` event
    pub drawn: HashSet<RoundId>,
    pub closed: HashSet<RoundId>,
    pub randomness_requested: HashSet<RoundId>,
}

impl RoundEvents {
    pub fn round_ids(&self) -> Vec<String> {
        self.created.iter().map(|r| r.round_id.clone()).collect()
    }
}

/// Tickets sold and number of join events, per round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketTotals {
    pub tickets: HashMap<RoundId, u64>,
    pub joins: HashMap<RoundId, u64>,
}

impl TicketTotals {
    pub fn add(&mut self, event: &ParticipantJoinedNode) {
        let Some(round_id) = parse_round_id(&event.round_id) else {
            return;
        };
        let tickets = parse_count(Some(&event.tickets));
        let sum = self.tickets.entry(round_id).or_default();
        *sum = sum.saturating_add(tickets);
        let joins = self.joins.entry(round_id).or_default();
        *joins = joins.saturating_add(1);
    }

    pub fn tickets_of(&self, round_id: RoundId) -> u64 {
        self.tickets.get(&round_id).copied().unwrap_or(0)
    }

    pub fn joins_of(&self, round_id: RoundId) -> u64 {
        self.joins.get(&round_id).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PastRaffleEvents {
    pub rounds: Vec<RoundCreatedNode>,
    pub winners: Vec<WinnerSelectedNode>,
    pub multi_winners: Vec<MultiWinnersSelectedNode>,
}

pub async fn fetch_round_events<I: IndexerClient>(
    indexer: &I,
    first: u32,
) -> Result<RoundEvents, AdminError> {
    let data: RoundEventsData = indexer
        .query(ROUND_EVENTS_QUERY, json!({ "first": first }))
        .await?;

    let mut drawn = id_set(&data.winner_selecteds);
    drawn.extend(id_set(&data.multi_winners_selecteds));

    let events = RoundEvents {
        created: data.round_createds,
        drawn,
        closed: id_set(&data.raffle_closeds),
        randomness_requested: id_set(&data.randomness_requesteds),
    };
    debug!(
        "{} rounds, drawn {:?}, closed {:?}",
        events.created.len(),
        events.drawn,
        events.closed
    );
    Ok(events)
}

/// Sums the ticket-join events of the given rounds.
/// Walks every page (cursor = last seen event id) until an empty one comes back.
pub async fn fetch_ticket_totals<I: IndexerClient>(
    indexer: &I,
    round_ids: &[String],
) -> Result<TicketTotals, AdminError> {
    let mut totals = TicketTotals::default();
    if round_ids.is_empty() {
        debug!("no round ids, no joins to fetch");
        return Ok(totals);
    }

    let mut page: JoinsData = indexer
        .query(JOINS_FIRST_PAGE_QUERY, json!({ "ids": round_ids }))
        .await?;
    let mut nb_events = 0usize;
    let mut cursor: Option<String> = None;

    while let Some(last) = page.participant_joineds.last() {
        // a page ending on the cursor we just sent means the indexer ignored it
        if cursor.as_deref() == Some(last.id.as_str()) {
            warn!("join pagination did not advance past {last:?}, stopping");
            break;
        }
        nb_events += page.participant_joineds.len();
        for event in &page.participant_joineds {
            totals.add(event);
        }

        cursor = Some(last.id.clone());
        debug!("next join page, cursor {cursor:?}");
        page = indexer
            .query(JOINS_PAGE_QUERY, json!({ "ids": round_ids, "cursor": cursor }))
            .await?;
    }

    info!(
        "{nb_events} join events for {} rounds",
        round_ids.len()
    );
    Ok(totals)
}

pub async fn fetch_past_raffle_events<I: IndexerClient>(
    indexer: &I,
    first: u32,
) -> Result<PastRaffleEvents, AdminError> {
    let data: PastRafflesData = indexer
        .query(PAST_RAFFLES_QUERY, json!({ "first": first }))
        .await?;
    Ok(PastRaffleEvents {
        rounds: data.round_createds,
        winners: data.winner_selecteds,
        multi_winners: data.multi_winners_selecteds,
    })
}
