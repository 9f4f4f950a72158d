use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;

use super::types::{AlertDefinition, AlertUpdate, NewAlert};
use crate::errors::{NotifierError, Result};
use crate::utils::Validator;

/// Storage for alert definitions.
///
/// Every write path validates, so readers (the matching engine in particular)
/// can assume at least one threshold is present.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, request: NewAlert) -> Result<AlertDefinition>;

    async fn get(&self, id: &str) -> Result<AlertDefinition>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<AlertDefinition>>;

    /// Definitions for one symbol, as consumed once per tick.
    async fn list_by_symbol(&self, symbol: &str) -> Result<Vec<AlertDefinition>>;

    async fn list_all(&self) -> Result<Vec<AlertDefinition>>;

    async fn update(&self, id: &str, update: AlertUpdate) -> Result<AlertDefinition>;

    async fn delete(&self, id: &str) -> Result<()>;
}

pub(crate) fn newest_first(mut alerts: Vec<AlertDefinition>) -> Vec<AlertDefinition> {
    alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    alerts
}

/// Process-local store, used by tests and the standalone role.
#[derive(Default)]
pub struct InMemoryAlertStore {
    alerts: RwLock<HashMap<String, AlertDefinition>>,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, filter: F) -> Vec<AlertDefinition>
    where
        F: Fn(&AlertDefinition) -> bool,
    {
        let alerts = self.alerts.read();
        newest_first(alerts.values().filter(|a| filter(a)).cloned().collect())
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn create(&self, request: NewAlert) -> Result<AlertDefinition> {
        Validator::validate_new_alert(&request)?;

        let alert = AlertDefinition::from_request(request, Utc::now());
        self.alerts.write().insert(alert.id.clone(), alert.clone());

        info!(alert_id = %alert.id, symbol = %alert.symbol, "Created alert");
        Ok(alert)
    }

    async fn get(&self, id: &str) -> Result<AlertDefinition> {
        self.alerts
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| NotifierError::not_found(format!("Alert {} not found", id)))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<AlertDefinition>> {
        Ok(self.collect(|a| a.user_id == user_id))
    }

    async fn list_by_symbol(&self, symbol: &str) -> Result<Vec<AlertDefinition>> {
        Ok(self.collect(|a| a.symbol == symbol))
    }

    async fn list_all(&self) -> Result<Vec<AlertDefinition>> {
        Ok(self.collect(|_| true))
    }

    async fn update(&self, id: &str, update: AlertUpdate) -> Result<AlertDefinition> {
        let mut alerts = self.alerts.write();
        let existing = alerts
            .get(id)
            .ok_or_else(|| NotifierError::not_found(format!("Alert {} not found", id)))?;

        let mut updated = existing.clone();
        updated.apply(update, Utc::now());
        Validator::validate_definition(&updated)?;

        alerts.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self.alerts.write().remove(id) {
            Some(_) => {
                info!(alert_id = %id, "Deleted alert");
                Ok(())
            }
            None => Err(NotifierError::not_found(format!("Alert {} not found", id))),
        }
    }
}
