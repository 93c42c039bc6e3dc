//! In-Memory Settings Store
//!
//! Reference `SettingsStore` backed by process memory. Used as the default
//! store in tests and by embedders that have not wired real persistence.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::domain::entities::settings::{SettingsPatch, UserSettings};
use crate::domain::repositories::settings_store::{
    ExecutionLogRecord, GlobalStats, SettingsStore, StoreError, StoreResult, TradeRecord,
    UserProfile,
};

#[derive(Default)]
pub struct MemorySettingsStore {
    settings: RwLock<HashMap<String, UserSettings>>,
    trades: RwLock<HashMap<String, Vec<TradeRecord>>>,
    execution_logs: RwLock<HashMap<String, Vec<ExecutionLogRecord>>>,
    activities: RwLock<HashMap<String, Vec<(String, serde_json::Value)>>>,
    users: RwLock<HashMap<String, UserProfile>>,
    global: RwLock<GlobalStats>,
    next_trade_id: AtomicU64,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(user: impl Into<String>, settings: UserSettings) -> Self {
        let mut store = Self::new();
        store.settings.get_mut().insert(user.into(), settings);
        store
    }

    pub async fn set_settings(&self, user: impl Into<String>, settings: UserSettings) {
        self.settings.write().await.insert(user.into(), settings);
    }

    pub async fn trades_for(&self, user: &str) -> Vec<TradeRecord> {
        self.trades
            .read()
            .await
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn execution_logs_for(&self, user: &str) -> Vec<ExecutionLogRecord> {
        self.execution_logs
            .read()
            .await
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn activities_for(&self, user: &str) -> Vec<(String, serde_json::Value)> {
        self.activities
            .read()
            .await
            .get(user)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_settings(&self, user: &str) -> StoreResult<Option<UserSettings>> {
        Ok(self.settings.read().await.get(user).cloned())
    }

    async fn save_settings(&self, user: &str, patch: SettingsPatch) -> StoreResult<()> {
        let mut settings = self.settings.write().await;
        let entry = settings
            .get_mut(user)
            .ok_or_else(|| StoreError::QueryFailed(format!("Unknown user: {}", user)))?;
        patch.apply(entry);
        Ok(())
    }

    async fn save_trade(&self, user: &str, trade: TradeRecord) -> StoreResult<String> {
        let trade_id = format!("trade_{}", self.next_trade_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.trades
            .write()
            .await
            .entry(user.to_string())
            .or_default()
            .push(trade);
        Ok(trade_id)
    }

    async fn save_execution_log(&self, user: &str, record: ExecutionLogRecord) -> StoreResult<()> {
        self.execution_logs
            .write()
            .await
            .entry(user.to_string())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn log_activity(
        &self,
        user: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> StoreResult<()> {
        self.activities
            .write()
            .await
            .entry(user.to_string())
            .or_default()
            .push((kind.to_string(), payload));
        Ok(())
    }

    async fn get_user(&self, user: &str) -> StoreResult<Option<UserProfile>> {
        Ok(self.users.read().await.get(user).cloned())
    }

    async fn create_or_update_user(&self, profile: UserProfile) -> StoreResult<()> {
        self.users
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
        Ok(())
    }

    async fn get_global_stats(&self) -> StoreResult<GlobalStats> {
        Ok(*self.global.read().await)
    }

    async fn update_global_stats(&self, stats: GlobalStats) -> StoreResult<()> {
        *self.global.write().await = stats;
        Ok(())
    }
}
