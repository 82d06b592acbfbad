use crate::config::AdminConfig;
use crate::error::AdminError::{self, *};
use crate::types::RaffleType;
use chrono::{DateTime, SecondsFormat};
use log::{debug, error, info};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Only JSON numbers count, anything else is treated as absent
fn number_only<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        _ => None,
    })
}

fn lenient_type<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => Some(n.as_u64().and_then(|n| u8::try_from(n).ok()).unwrap_or(u8::MAX)),
        Some(Value::String(s)) => Some(s.trim().parse().unwrap_or(u8::MAX)),
        _ => None,
    })
}

/// Announcement of a freshly created round
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundStarted {
    #[serde(default)]
    pub round_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_type")]
    pub raffle_type: Option<u8>,
    #[serde(default)]
    pub is_physical: bool,
    #[serde(default)]
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub reward_human: Option<String>,
    #[serde(default)]
    pub ticket_cost_miles: Option<Value>,
    #[serde(default)]
    pub max_tickets: Option<Value>,
    /// unix seconds
    #[serde(default, deserialize_with = "number_only")]
    pub start_time: Option<i64>,
    #[serde(default, deserialize_with = "number_only")]
    pub duration_seconds: Option<i64>,
    #[serde(default, rename = "rewardURI")]
    pub reward_uri: Option<String>,
}

/// Text of a value, `None` for null, false, 0 and ""
fn present(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".into()),
        _ => None,
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn type_label(raffle_type: Option<u8>) -> &'static str {
    RaffleType::try_from(raffle_type.unwrap_or(0))
        .map(|t| t.label())
        .unwrap_or("Unknown type")
}

/// Markdown message for the announcement channel
pub fn format_round_started(input: &RoundStarted, app_url: &str) -> Result<String, AdminError> {
    let round_id = present(input.round_id.as_ref()).ok_or(RoundIdRequired)?;

    let mut lines = vec![
        "🎉 *New AkibaMiles Raffle Started!*".to_string(),
        String::new(),
        format!("• Round: *#{round_id}* ({})", type_label(input.raffle_type)),
    ];

    let symbol = non_empty(&input.token_symbol);
    if input.is_physical {
        lines.push("• Prize: *Physical item* (NFT voucher)".into());
    } else if let (Some(reward), Some(symbol)) = (non_empty(&input.reward_human), symbol) {
        lines.push(format!("• Prize pool: *{reward} {symbol}*"));
    }
    if let (Some(symbol), Some(address)) = (symbol, non_empty(&input.token_address)) {
        lines.push(format!("• Reward token: `{symbol}` (`{address}`)"));
    }
    if let Some(cost) = present(input.ticket_cost_miles.as_ref()) {
        lines.push(format!("• Ticket cost: *{cost} AkibaMiles*"));
    }
    if let Some(max) = present(input.max_tickets.as_ref()) {
        lines.push(format!("• Max tickets: *{max}*"));
    }
    if let Some(start) = input.start_time.and_then(|s| DateTime::from_timestamp(s, 0)) {
        lines.push(format!(
            "• Starts at: `{}`",
            start.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
    }
    if let Some(seconds) = input.duration_seconds {
        let hours = (seconds as f64 / 3600.0).round() as i64;
        lines.push(format!("• Duration: ~*{hours} hours*"));
    }
    if let Some(uri) = non_empty(&input.reward_uri) {
        lines.push(String::new());
        lines.push(format!("Reward URI: {uri}"));
    }
    lines.push(String::new());
    lines.push(format!("Join on AkibaMiles: {app_url}"));

    Ok(lines.join("\n"))
}

/// Bot API client posting to the announcement chat
pub struct TelegramNotifier {
    api_base: String,
    bot_token: String,
    chat_id: String,
    app_url: String,
    http: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(config: &AdminConfig) -> Result<Self, AdminError> {
        let (bot_token, chat_id) = config.ensure_telegram().map_err(|e| {
            error!("Missing TELEGRAM_BOT_TOKEN or TELEGRAM_ANNOUNCE_CHAT_ID / TELEGRAM_ADMIN_CHAT_ID");
            e
        })?;
        Ok(Self {
            api_base: config.telegram_api_url.clone(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            app_url: config.app_url.clone(),
            http: reqwest::Client::new(),
        })
    }

    pub async fn send_round_started(&self, input: &RoundStarted) -> Result<(), AdminError> {
        let text = format_round_started(input, &self.app_url)?;
        self.send_message(&text).await
    }

    pub async fn send_message(&self, text: &str) -> Result<(), AdminError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        debug!("telegram sendMessage to chat {}", self.chat_id);
        let resp = self
            .http
            .post(url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Telegram sendMessage failed {status}: {body}");
            return Err(NotificationFailed(status.as_u16()));
        }
        info!("round announcement sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(body: Value) -> RoundStarted {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn full_cash_round_message() {
        let input = started(json!({
            "roundId": 42,
            "raffleType": 1,
            "tokenSymbol": "USDT",
            "tokenAddress": "0x48065fbbe25f71c9282ddf5e1cd6d6a887483d5e",
            "rewardHuman": "250",
            "ticketCostMiles": "10",
            "maxTickets": 500,
            "startTime": 1_700_000_000,
            "durationSeconds": 604_800,
        }));
        let text = format_round_started(&input, "https://app.akibamiles.xyz").unwrap();
        let expected = [
            "🎉 *New AkibaMiles Raffle Started!*",
            "",
            "• Round: *#42* (Top 3 (50/30/20))",
            "• Prize pool: *250 USDT*",
            "• Reward token: `USDT` (`0x48065fbbe25f71c9282ddf5e1cd6d6a887483d5e`)",
            "• Ticket cost: *10 AkibaMiles*",
            "• Max tickets: *500*",
            "• Starts at: `2023-11-14T22:13:20.000Z`",
            "• Duration: ~*168 hours*",
            "",
            "Join on AkibaMiles: https://app.akibamiles.xyz",
        ]
        .join("\n");
        assert_eq!(expected, text);
    }

    #[test]
    fn physical_round_message() {
        let input = started(json!({
            "roundId": "7",
            "raffleType": 3,
            "isPhysical": true,
            "rewardHuman": "ignored",
            "tokenSymbol": "PrizeNFT",
            "durationSeconds": 5400,
            "rewardURI": "ipfs://voucher",
        }));
        let text = format_round_started(&input, "https://x").unwrap();
        assert!(text.contains("• Round: *#7* (Physical prize (NFT voucher))"));
        assert!(text.contains("• Prize: *Physical item* (NFT voucher)"));
        assert!(!text.contains("Prize pool"));
        assert!(!text.contains("Reward token"));
        assert!(text.contains("• Duration: ~*2 hours*"));
        assert!(text.ends_with("\n\nReward URI: ipfs://voucher\n\nJoin on AkibaMiles: https://x"));
    }

    #[test]
    fn unknown_type_and_skipped_fields() {
        let input = started(json!({
            "roundId": 9,
            "raffleType": 8,
            "maxTickets": 0,
            "startTime": "soon",
        }));
        let text = format_round_started(&input, "https://x").unwrap();
        assert_eq!(
            "🎉 *New AkibaMiles Raffle Started!*\n\n• Round: *#9* (Unknown type)\n\nJoin on AkibaMiles: https://x",
            text
        );
    }

    #[test]
    fn round_id_is_required() {
        for body in [json!({}), json!({ "roundId": 0 }), json!({ "roundId": "" })] {
            assert_eq!(Err(RoundIdRequired), format_round_started(&started(body), "https://x"));
        }
    }

    #[test]
    fn notifier_needs_token_and_chat() {
        let config = AdminConfig::default();
        assert!(matches!(TelegramNotifier::new(&config), Err(NotifierNotConfigured)));

        let config = AdminConfig {
            telegram_bot_token: Some("t".into()),
            telegram_chat_id: Some("-1".into()),
            ..Default::default()
        };
        assert!(TelegramNotifier::new(&config).is_ok());
    }
}
