use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use super::store::{newest_first, AlertStore};
use super::types::{AlertDefinition, AlertUpdate, NewAlert};
use crate::constants::{
    ALERTS_BY_SYMBOL_PREFIX, ALERTS_BY_USER_PREFIX, ALERTS_INDEX_KEY, ALERT_KEY_PREFIX,
};
use crate::errors::{NotifierError, Result};
use crate::utils::Validator;

/// Alert definitions kept in Redis so the gateway and the processor share them.
///
/// Layout: one JSON document per alert at `alert:{id}` plus id sets indexed by
/// symbol, by user and overall.
#[derive(Clone)]
pub struct RedisAlertStore {
    conn: ConnectionManager,
}

impl RedisAlertStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        info!("Alert store connected to Redis");
        Ok(Self { conn })
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn alert_key(id: &str) -> String {
        format!("{}{}", ALERT_KEY_PREFIX, id)
    }

    fn symbol_key(symbol: &str) -> String {
        format!("{}{}", ALERTS_BY_SYMBOL_PREFIX, symbol)
    }

    fn user_key(user_id: &str) -> String {
        format!("{}{}", ALERTS_BY_USER_PREFIX, user_id)
    }

    async fn save(&self, alert: &AlertDefinition, previous: Option<&AlertDefinition>) -> Result<()> {
        let payload = serde_json::to_string(alert)?;
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(Self::alert_key(&alert.id), payload)
            .ignore()
            .sadd(Self::symbol_key(&alert.symbol), &alert.id)
            .ignore()
            .sadd(Self::user_key(&alert.user_id), &alert.id)
            .ignore()
            .sadd(ALERTS_INDEX_KEY, &alert.id)
            .ignore();

        if let Some(previous) = previous {
            if previous.symbol != alert.symbol {
                pipe.srem(Self::symbol_key(&previous.symbol), &alert.id).ignore();
            }
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn load_index(&self, index_key: &str) -> Result<Vec<AlertDefinition>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(index_key).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| Self::alert_key(id)).collect();
        let documents: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await?;

        let mut alerts = Vec::with_capacity(documents.len());
        for (id, document) in ids.iter().zip(documents) {
            match document {
                Some(raw) => match serde_json::from_str::<AlertDefinition>(&raw) {
                    Ok(alert) => alerts.push(alert),
                    Err(e) => warn!(alert_id = %id, error = %e, "Skipping unreadable alert document"),
                },
                None => debug!(alert_id = %id, index = %index_key, "Index references a missing alert"),
            }
        }

        Ok(newest_first(alerts))
    }
}

#[async_trait]
impl AlertStore for RedisAlertStore {
    async fn create(&self, request: NewAlert) -> Result<AlertDefinition> {
        Validator::validate_new_alert(&request)?;

        let alert = AlertDefinition::from_request(request, Utc::now());
        self.save(&alert, None).await?;

        info!(alert_id = %alert.id, symbol = %alert.symbol, "Created alert");
        Ok(alert)
    }

    async fn get(&self, id: &str) -> Result<AlertDefinition> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(Self::alert_key(id)).await?;

        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Err(NotifierError::not_found(format!("Alert {} not found", id))),
        }
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<AlertDefinition>> {
        self.load_index(&Self::user_key(user_id)).await
    }

    async fn list_by_symbol(&self, symbol: &str) -> Result<Vec<AlertDefinition>> {
        self.load_index(&Self::symbol_key(symbol)).await
    }

    async fn list_all(&self) -> Result<Vec<AlertDefinition>> {
        self.load_index(ALERTS_INDEX_KEY).await
    }

    async fn update(&self, id: &str, update: AlertUpdate) -> Result<AlertDefinition> {
        let existing = self.get(id).await?;

        let mut updated = existing.clone();
        updated.apply(update, Utc::now());
        Validator::validate_definition(&updated)?;

        self.save(&updated, Some(&existing)).await?;
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let existing = self.get(id).await?;
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .del(Self::alert_key(id))
            .ignore()
            .srem(Self::symbol_key(&existing.symbol), id)
            .ignore()
            .srem(Self::user_key(&existing.user_id), id)
            .ignore()
            .srem(ALERTS_INDEX_KEY, id)
            .ignore()
            .query_async(&mut conn)
            .await?;

        info!(alert_id = %id, "Deleted alert");
        Ok(())
    }
}
