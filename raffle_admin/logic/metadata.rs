use crate::error::AdminError::{self, *};
use crate::types::RoundId;
use log::{debug, error, info};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::Mutex;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS raffle_meta (
    round_id BIGINT PRIMARY KEY,
    kind TEXT NOT NULL,
    card_title TEXT,
    description TEXT,
    card_image_url TEXT,
    prize_title TEXT,
    winners INTEGER
)"#;

const UPSERT: &str = r#"
INSERT INTO raffle_meta (round_id, kind, card_title, description, card_image_url, prize_title, winners)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (round_id) DO UPDATE SET
    kind = EXCLUDED.kind,
    card_title = EXCLUDED.card_title,
    description = EXCLUDED.description,
    card_image_url = EXCLUDED.card_image_url,
    prize_title = EXCLUDED.prize_title,
    winners = EXCLUDED.winners"#;

const SELECT: &str = r#"
SELECT round_id, kind, card_title, description, card_image_url, prize_title, winners
FROM raffle_meta WHERE round_id = $1"#;

/// Accepts `3`, `"3"` or nothing
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Display fields an operator attaches to a round
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RaffleMetaFields {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub card_title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub card_image_url: Option<String>,
    #[serde(default)]
    pub prize_title: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub winners: Option<i32>,
}

impl RaffleMetaFields {
    pub fn for_round(self, round_id: RoundId) -> Result<RaffleMeta, AdminError> {
        let kind = self
            .kind
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(KindRequired)?;
        let round_id = i64::try_from(round_id).map_err(|_| RoundIdRequired)?;
        if round_id == 0 {
            return Err(RoundIdRequired);
        }
        Ok(RaffleMeta {
            round_id,
            kind,
            card_title: self.card_title,
            description: self.description,
            card_image_url: self.card_image_url,
            prize_title: self.prize_title,
            winners: self.winners,
        })
    }
}

/// Body of the metadata upsert route. `roundId` arrives as a number or a string.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct RaffleMetaInput {
    #[serde(default)]
    pub round_id: Value,
    #[serde(flatten)]
    pub fields: RaffleMetaFields,
}

impl RaffleMetaInput {
    pub fn validate(self) -> Result<RaffleMeta, AdminError> {
        let round_id = match &self.round_id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|id| *id > 0)
        .ok_or(RoundIdRequired)?;
        self.fields.for_round(round_id)
    }
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RaffleMeta {
    pub round_id: i64,
    pub kind: String,
    pub card_title: Option<String>,
    pub description: Option<String>,
    pub card_image_url: Option<String>,
    pub prize_title: Option<String>,
    pub winners: Option<i32>,
}

/// Round display metadata, one record per round, last write wins
pub trait MetaStore: Send + Sync {
    /// Replaces the whole record. Fields left out become null.
    fn upsert(&self, meta: &RaffleMeta) -> impl Future<Output = Result<(), AdminError>> + Send;

    fn get(
        &self,
        round_id: RoundId,
    ) -> impl Future<Output = Result<Option<RaffleMeta>, AdminError>> + Send;
}

#[derive(Clone)]
pub struct PgMetaStore {
    pool: PgPool,
}

impl PgMetaStore {
    /// Connections are opened on first use
    pub fn new(database_url: Option<String>) -> Result<Self, AdminError> {
        let Some(url) = database_url else {
            error!("database url not configured");
            return Err(MetaStoreNotConfigured);
        };
        let pool = PgPoolOptions::new().max_connections(5).connect_lazy(&url)?;
        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> Result<(), AdminError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        info!("raffle_meta table ready");
        Ok(())
    }
}

impl MetaStore for PgMetaStore {
    async fn upsert(&self, meta: &RaffleMeta) -> Result<(), AdminError> {
        debug!("upsert raffle_meta for round {}", meta.round_id);
        sqlx::query(UPSERT)
            .bind(meta.round_id)
            .bind(&meta.kind)
            .bind(&meta.card_title)
            .bind(&meta.description)
            .bind(&meta.card_image_url)
            .bind(&meta.prize_title)
            .bind(meta.winners)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, round_id: RoundId) -> Result<Option<RaffleMeta>, AdminError> {
        let round_id = i64::try_from(round_id).map_err(|_| RoundIdRequired)?;
        let meta = sqlx::query_as::<_, RaffleMeta>(SELECT)
            .bind(round_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(meta)
    }
}

/// Process-local store for running without a database
#[derive(Default)]
pub struct MemoryMetaStore {
    records: Mutex<HashMap<i64, RaffleMeta>>,
}

impl MetaStore for MemoryMetaStore {
    async fn upsert(&self, meta: &RaffleMeta) -> Result<(), AdminError> {
        self.records
            .lock()
            .await
            .insert(meta.round_id, meta.clone());
        Ok(())
    }

    async fn get(&self, round_id: RoundId) -> Result<Option<RaffleMeta>, AdminError> {
        let round_id = i64::try_from(round_id).map_err(|_| RoundIdRequired)?;
        Ok(self.records.lock().await.get(&round_id).cloned())
    }
}

pub enum MetaBackend {
    Postgres(PgMetaStore),
    Memory(MemoryMetaStore),
}

impl MetaStore for MetaBackend {
    async fn upsert(&self, meta: &RaffleMeta) -> Result<(), AdminError> {
        match self {
            MetaBackend::Postgres(store) => store.upsert(meta).await,
            MetaBackend::Memory(store) => store.upsert(meta).await,
        }
    }

    async fn get(&self, round_id: RoundId) -> Result<Option<RaffleMeta>, AdminError> {
        match self {
            MetaBackend::Postgres(store) => store.get(round_id).await,
            MetaBackend::Memory(store) => store.get(round_id).await,
        }
    }
}
