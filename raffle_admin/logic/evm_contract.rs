use crate::error::AdminError::{self, *};
use crate::types::*;
use crate::units::MAX_DECIMALS;
use ethabi::{ParamType, Token};
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_MAX_POLLS: u32 = 90;

/// Read side of the raffle manager, the seam the derivations are written against
pub trait RaffleReader: Send + Sync {
    /// Batched round tuples. Rounds whose read failed are simply missing from the map.
    fn fetch_rounds(
        &self,
        ids: &[RoundId],
    ) -> impl Future<Output = Result<HashMap<RoundId, OnChainRound>, AdminError>> + Send;

    /// `symbol()` / `decimals()` of each token, [`TokenMeta::unknown`] parts when a call fails
    fn token_metadata(
        &self,
        tokens: &[Address],
    ) -> impl Future<Output = Result<HashMap<Address, TokenMeta>, AdminError>> + Send;
}

/// Write side of the raffle manager. Each call waits for the receipt.
pub trait RaffleWriter: Send + Sync {
    fn approve(
        &self,
        token: Address,
        amount: Amount,
    ) -> impl Future<Output = Result<TxHash, AdminError>> + Send;

    fn create_round(
        &self,
        round: &NewRound,
    ) -> impl Future<Output = Result<CreatedRoundTx, AdminError>> + Send;

    fn round_count(&self) -> impl Future<Output = Result<RoundId, AdminError>> + Send;

    fn request_randomness(
        &self,
        round_id: RoundId,
        fee: Amount,
    ) -> impl Future<Output = Result<TxHash, AdminError>> + Send;

    fn draw_winner(&self, round_id: RoundId)
        -> impl Future<Output = Result<TxHash, AdminError>> + Send;

    fn close_raffle(&self, round_id: RoundId)
        -> impl Future<Output = Result<TxHash, AdminError>> + Send;
}

/// Arguments of `createRaffleRound`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRound {
    pub start_time: Timestamp,
    pub duration: u64,
    pub max_tickets: u32,
    pub token: Address,
    pub raffle_type: RaffleType,
    pub reward_pool: Amount,
    pub ticket_cost_points: Amount,
    pub reward_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRoundTx {
    pub tx_hash: TxHash,
    /// decoded from the `RoundCreated` log when the receipt carries one
    pub round_id: Option<RoundId>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<ReceiptLog>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ReceiptLog {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

#[derive(Deserialize, Debug)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize, Debug)]
struct RpcResponse<R> {
    #[serde(default = "Option::default")]
    result: Option<R>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Minimal JSON-RPC transport
#[derive(Clone)]
pub struct JsonRpc {
    url: String,
    http: reqwest::Client,
}

impl JsonRpc {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::new(),
        }
    }

    /// `null` results are returned as `None`
    pub async fn call_optional<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<R>, AdminError> {
        debug!("rpc {method}: {params}");
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let resp: RpcResponse<R> = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(e) = resp.error {
            return Err(Rpc(format!("{} ({})", e.message, e.code)));
        }
        Ok(resp.result)
    }

    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, AdminError> {
        self.call_optional(method, params)
            .await?
            .ok_or(InvalidResponseBody(format!("{method} returned no result")))
    }
}

/// First four bytes of keccak256 of the canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

pub fn encode_call(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend(ethabi::encode(args));
    data
}

fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, AdminError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .or(Err(InvalidResponseBody(format!("not hex: {value}"))))
}

fn to_u64(value: &Amount) -> Result<u64, AdminError> {
    if value.bits() > 64 {
        return Err(FailedToDecodeResponse);
    }
    Ok(value.low_u64())
}

fn to_timestamp(value: &Amount) -> Result<Timestamp, AdminError> {
    Timestamp::try_from(to_u64(value)?).or(Err(FailedToDecodeResponse))
}

fn round_tuple_types() -> Vec<ParamType> {
    vec![
        ParamType::Uint(256), // roundId
        ParamType::Uint(256), // start
        ParamType::Uint(256), // end
        ParamType::Uint(32),  // maxTickets
        ParamType::Uint(32),  // totalTickets
        ParamType::Address,   // rewardToken
        ParamType::Uint(256), // rewardPool
        ParamType::Uint(256), // ticketCostPoints
        ParamType::Bool,      // winnersSelected
    ]
}

/// Decodes `(roundId, start, end, maxTickets, totalTickets, rewardToken, rewardPool, ticketCostPoints, winnersSelected)`
pub fn decode_round(raw: &[u8]) -> Result<OnChainRound, AdminError> {
    let decoded = ethabi::decode(&round_tuple_types(), raw)?;
    let [Token::Uint(round_id), Token::Uint(start), Token::Uint(end), Token::Uint(max_tickets), Token::Uint(total_tickets), Token::Address(reward_token), Token::Uint(reward_pool), Token::Uint(ticket_cost), Token::Bool(winners_selected)] =
        decoded.as_slice()
    else {
        return Err(FailedToDecodeResponse);
    };

    Ok(OnChainRound {
        round_id: to_u64(round_id)?,
        start: to_timestamp(start)?,
        end: to_timestamp(end)?,
        max_tickets: to_u64(max_tickets)?,
        total_tickets: to_u64(total_tickets)?,
        reward_token: *reward_token,
        reward_pool: *reward_pool,
        ticket_cost_points: *ticket_cost,
        winners_selected: *winners_selected,
    })
}

/// `RoundCreated` as the manager emits it, fields in subgraph order
pub const ROUND_CREATED_EVENT: &str =
    "RoundCreated(uint256,uint256,uint256,address,uint256,uint32,uint256,uint8)";

/// keccak256 of the event signature, the log's first topic
pub fn event_topic(signature: &str) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(signature.as_bytes()));
    out
}

/// Round id of the manager's `RoundCreated` log: the leading event argument,
/// either as first indexed topic or as first data word.
/// Other manager events in the same transaction are skipped.
pub fn round_id_from_receipt(receipt: &TransactionReceipt, manager: &Address) -> Option<RoundId> {
    let topic = event_topic(ROUND_CREATED_EVENT);
    let log = receipt.logs.iter().find(|l| {
        parse_address(&l.address).ok().as_ref() == Some(manager)
            && l.topics
                .first()
                .and_then(|t| decode_hex(t).ok())
                .is_some_and(|t| t == topic)
    })?;

    let word = match log.topics.get(1) {
        Some(topic) => decode_hex(topic).ok()?,
        None => decode_hex(&log.data).ok()?.get(..32)?.to_vec(),
    };
    if word.len() != 32 {
        return None;
    }
    to_u64(&Amount::from_big_endian(&word)).ok()
}

/// `symbol()` and `decimals()` results; anything unreadable or a scale past
/// [`MAX_DECIMALS`] gives the placeholder
pub fn decode_token_meta(symbol: Option<&[u8]>, decimals: Option<&[u8]>) -> TokenMeta {
    let fallback = TokenMeta::unknown();
    let decimals = decimals
        .and_then(|raw| ethabi::decode(&[ParamType::Uint(8)], raw).ok())
        .and_then(|t| t.into_iter().next())
        .and_then(|t| t.into_uint())
        .filter(|d| d.bits() <= 8)
        .map(|d| d.low_u32() as u8);
    let decimals = match decimals {
        Some(d) if d <= MAX_DECIMALS => d,
        Some(_) => return fallback,
        None => fallback.decimals,
    };
    let symbol = symbol
        .and_then(|raw| ethabi::decode(&[ParamType::String], raw).ok())
        .and_then(|t| t.into_iter().next())
        .and_then(|t| t.into_string())
        .unwrap_or(fallback.symbol);
    TokenMeta { symbol, decimals }
}

pub struct EvmContract {
    rpc: JsonRpc,
    signer: Option<JsonRpc>,
    operator: Option<Address>,
    manager: Address,
    multicall: Address,
}

impl EvmContract {
    pub fn new(
        rpc: Option<String>,
        signer_rpc: Option<String>,
        operator: Option<Address>,
        manager: Address,
        multicall: Address,
    ) -> Result<Self, AdminError> {
        let rpc = rpc.ok_or(RpcNotConfigured)?;
        Ok(Self {
            rpc: JsonRpc::new(rpc),
            signer: signer_rpc.map(JsonRpc::new),
            operator,
            manager,
            multicall,
        })
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, AdminError> {
        let result: String = self
            .rpc
            .call(
                "eth_call",
                json!([{ "to": address_hex(&to), "data": hex_data(&data) }, "latest"]),
            )
            .await?;
        decode_hex(&result)
    }

    /// Multicall3 `aggregate3` with `allowFailure` on every call.
    /// `None` for the calls that reverted.
    pub async fn multicall(
        &self,
        calls: &[(Address, Vec<u8>)],
    ) -> Result<Vec<Option<Vec<u8>>>, AdminError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        let tokens: Vec<Token> = calls
            .iter()
            .map(|(target, data)| {
                Token::Tuple(vec![
                    Token::Address(*target),
                    Token::Bool(true),
                    Token::Bytes(data.clone()),
                ])
            })
            .collect();
        let data = encode_call("aggregate3((address,bool,bytes)[])", &[Token::Array(tokens)]);
        let raw = self.eth_call(self.multicall, data).await?;

        let decoded = ethabi::decode(
            &[ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Bool,
                ParamType::Bytes,
            ])))],
            &raw,
        )?;
        let [Token::Array(results)] = decoded.as_slice() else {
            return Err(FailedToDecodeResponse);
        };

        let results: Vec<Option<Vec<u8>>> = results
            .iter()
            .map(|r| match r {
                Token::Tuple(parts) => match parts.as_slice() {
                    [Token::Bool(true), Token::Bytes(bytes)] => Some(bytes.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        if results.len() != calls.len() {
            return Err(FailedToDecodeResponse);
        }
        Ok(results)
    }

    async fn batched_round_reads(
        &self,
        signature: &str,
        ids: &[RoundId],
    ) -> Result<Vec<Option<Vec<u8>>>, AdminError> {
        let calls: Vec<(Address, Vec<u8>)> = ids
            .iter()
            .map(|id| {
                (
                    self.manager,
                    encode_call(signature, &[Token::Uint((*id).into())]),
                )
            })
            .collect();
        self.multicall(&calls).await
    }

    pub async fn round_count(&self) -> Result<RoundId, AdminError> {
        let raw = self
            .eth_call(self.manager, encode_call("roundIdCounter()", &[]))
            .await?;
        let decoded = ethabi::decode(&[ParamType::Uint(256)], &raw)?;
        let [Token::Uint(count)] = decoded.as_slice() else {
            return Err(FailedToDecodeResponse);
        };
        to_u64(count)
    }

    /// Voucher NFT used as reward token for physical rounds, `None` when unset
    pub async fn prize_nft(&self) -> Result<Option<Address>, AdminError> {
        let raw = self
            .eth_call(self.manager, encode_call("prizeNFT()", &[]))
            .await?;
        let decoded = ethabi::decode(&[ParamType::Address], &raw)?;
        let [Token::Address(address)] = decoded.as_slice() else {
            return Err(FailedToDecodeResponse);
        };
        Ok(Some(*address).filter(|a| !a.is_zero()))
    }

    pub async fn winners_of_round(&self, round_id: RoundId) -> Result<Vec<Address>, AdminError> {
        let raw = self
            .eth_call(
                self.manager,
                encode_call("getWinners(uint256)", &[Token::Uint(round_id.into())]),
            )
            .await?;
        let decoded = ethabi::decode(&[ParamType::Array(Box::new(ParamType::Address))], &raw)?;
        let [Token::Array(winners)] = decoded.as_slice() else {
            return Err(FailedToDecodeResponse);
        };
        Ok(winners
            .iter()
            .filter_map(|t| match t {
                Token::Address(a) => Some(*a),
                _ => None,
            })
            .collect())
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
        value: Amount,
    ) -> Result<TransactionReceipt, AdminError> {
        let signer = self.signer.as_ref().ok_or(RpcNotConfigured)?;
        let from = self.operator.ok_or(SenderNotConfigured)?;

        let tx_hash: String = signer
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": address_hex(&from),
                    "to": address_hex(&to),
                    "data": hex_data(&data),
                    "value": format!("{value:#x}"),
                }]),
            )
            .await?;
        info!("transaction sent: {tx_hash}");
        self.wait_for_receipt(&tx_hash).await
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TransactionReceipt, AdminError> {
        for _ in 0..RECEIPT_MAX_POLLS {
            let receipt: Option<TransactionReceipt> = self
                .rpc
                .call_optional("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                if receipt.status.as_deref() == Some("0x0") {
                    error!("transaction {tx_hash} reverted");
                    return Err(TransactionReverted(tx_hash.to_string()));
                }
                return Ok(receipt);
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
        Err(ReceiptTimeout(tx_hash.to_string()))
    }

    async fn send_to_manager(
        &self,
        signature: &str,
        args: &[Token],
        value: Amount,
    ) -> Result<TransactionReceipt, AdminError> {
        self.send_transaction(self.manager, encode_call(signature, args), value)
            .await
    }
}

impl RaffleReader for EvmContract {
    /// `getActiveRound` and `getRound` are read together; the legacy accessor
    /// only answers for the rounds the active one refuses (ended rounds).
    async fn fetch_rounds(
        &self,
        ids: &[RoundId],
    ) -> Result<HashMap<RoundId, OnChainRound>, AdminError> {
        let (active, legacy) = tokio::join!(
            self.batched_round_reads("getActiveRound(uint256)", ids),
            self.batched_round_reads("getRound(uint256)", ids),
        );

        let (active, legacy) = match (active, legacy) {
            (Err(e), Err(_)) => return Err(e),
            (active, legacy) => (
                active.unwrap_or_else(|e| {
                    warn!("getActiveRound batch failed: {e}");
                    vec![None; ids.len()]
                }),
                legacy.unwrap_or_else(|e| {
                    warn!("getRound batch failed: {e}");
                    vec![None; ids.len()]
                }),
            ),
        };

        let mut rounds = HashMap::new();
        for (i, id) in ids.iter().enumerate() {
            let raw = active
                .get(i)
                .cloned()
                .flatten()
                .or_else(|| legacy.get(i).cloned().flatten());
            let Some(raw) = raw else {
                debug!("no on-chain data for round {id}");
                continue;
            };
            match decode_round(&raw) {
                Ok(round) => {
                    rounds.insert(*id, round);
                }
                Err(e) => warn!("failed to decode round {id}: {e}"),
            }
        }
        Ok(rounds)
    }

    async fn token_metadata(
        &self,
        tokens: &[Address],
    ) -> Result<HashMap<Address, TokenMeta>, AdminError> {
        let calls: Vec<(Address, Vec<u8>)> = tokens
            .iter()
            .flat_map(|t| {
                [
                    (*t, encode_call("symbol()", &[])),
                    (*t, encode_call("decimals()", &[])),
                ]
            })
            .collect();
        let results = self.multicall(&calls).await?;

        let mut metas = HashMap::new();
        for (i, token) in tokens.iter().enumerate() {
            let symbol = results.get(i * 2).cloned().flatten();
            let decimals = results.get(i * 2 + 1).cloned().flatten();
            let meta = decode_token_meta(symbol.as_deref(), decimals.as_deref());
            if meta == TokenMeta::unknown() {
                warn!("token {} metadata unusable", address_hex(token));
            }
            metas.insert(*token, meta);
        }
        Ok(metas)
    }
}

impl RaffleWriter for EvmContract {
    async fn approve(&self, token: Address, amount: Amount) -> Result<TxHash, AdminError> {
        info!("approve {amount} of {} for the manager", address_hex(&token));
        let data = encode_call(
            "approve(address,uint256)",
            &[Token::Address(self.manager), Token::Uint(amount)],
        );
        let receipt = self.send_transaction(token, data, Amount::zero()).await?;
        Ok(receipt.transaction_hash)
    }

    async fn create_round(&self, round: &NewRound) -> Result<CreatedRoundTx, AdminError> {
        info!("create round {round:?}");
        let receipt = self
            .send_to_manager(
                "createRaffleRound(uint256,uint256,uint32,address,uint8,uint256,uint256,string)",
                &[
                    Token::Uint((round.start_time.max(0) as u64).into()),
                    Token::Uint(round.duration.into()),
                    Token::Uint(round.max_tickets.into()),
                    Token::Address(round.token),
                    Token::Uint(u8::from(round.raffle_type).into()),
                    Token::Uint(round.reward_pool),
                    Token::Uint(round.ticket_cost_points),
                    Token::String(round.reward_uri.clone()),
                ],
                Amount::zero(),
            )
            .await?;
        Ok(CreatedRoundTx {
            round_id: round_id_from_receipt(&receipt, &self.manager),
            tx_hash: receipt.transaction_hash,
        })
    }

    async fn round_count(&self) -> Result<RoundId, AdminError> {
        EvmContract::round_count(self).await
    }

    async fn request_randomness(
        &self,
        round_id: RoundId,
        fee: Amount,
    ) -> Result<TxHash, AdminError> {
        info!("request randomness for round {round_id} with fee {fee}");
        let receipt = self
            .send_to_manager(
                "requestRoundRandomness(uint256)",
                &[Token::Uint(round_id.into())],
                fee,
            )
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn draw_winner(&self, round_id: RoundId) -> Result<TxHash, AdminError> {
        info!("draw winner for round {round_id}");
        let receipt = self
            .send_to_manager(
                "drawWinner(uint256)",
                &[Token::Uint(round_id.into())],
                Amount::zero(),
            )
            .await?;
        Ok(receipt.transaction_hash)
    }

    async fn close_raffle(&self, round_id: RoundId) -> Result<TxHash, AdminError> {
        info!("close round {round_id}");
        let receipt = self
            .send_to_manager(
                "closeRaffle(uint256)",
                &[Token::Uint(round_id.into())],
                Amount::zero(),
            )
            .await?;
        Ok(receipt.transaction_hash)
    }
}
