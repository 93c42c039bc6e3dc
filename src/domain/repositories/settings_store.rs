//! Settings and Record Store Port
//!
//! Persistence of user settings, trades, execution logs, activity entries,
//! and trade counters lives outside this crate; the engines only speak
//! this interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::entities::order::OrderSide;
use crate::domain::entities::settings::{SettingsPatch, UserSettings};

/// Common result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

/// Executed trade as persisted for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub strategy: String,
    pub pnl: Option<f64>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionAction {
    Executed,
    Skipped,
}

impl std::fmt::Display for ExecutionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionAction::Executed => write!(f, "EXECUTED"),
            ExecutionAction::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// One structured entry of the execution decision trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogRecord {
    pub symbol: String,
    pub action: ExecutionAction,
    pub reason: Option<String>,
    pub accuracy_used: Option<f64>,
    pub latency_ms: Option<f64>,
    pub slippage_pct: Option<f64>,
    pub strategy: Option<String>,
    pub logged_at: DateTime<Utc>,
}

impl ExecutionLogRecord {
    pub fn skipped(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        ExecutionLogRecord {
            symbol: symbol.into(),
            action: ExecutionAction::Skipped,
            reason: Some(reason.into()),
            accuracy_used: None,
            latency_ms: None,
            slippage_pct: None,
            strategy: None,
            logged_at: Utc::now(),
        }
    }

    pub fn executed(
        symbol: impl Into<String>,
        accuracy_used: f64,
        latency_ms: f64,
        slippage_pct: f64,
        strategy: impl Into<String>,
    ) -> Self {
        ExecutionLogRecord {
            symbol: symbol.into(),
            action: ExecutionAction::Executed,
            reason: None,
            accuracy_used: Some(accuracy_used),
            latency_ms: Some(latency_ms),
            slippage_pct: Some(slippage_pct),
            strategy: Some(strategy.into()),
            logged_at: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy_used = Some(accuracy);
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }
}

/// Per-user trade counter record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub total_trades: u64,
}

/// Process-wide trade counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_trades: u64,
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_settings(&self, user: &str) -> StoreResult<Option<UserSettings>>;

    /// Apply a partial settings update.
    async fn save_settings(&self, user: &str, patch: SettingsPatch) -> StoreResult<()>;

    /// Persist a trade record, returning its id.
    async fn save_trade(&self, user: &str, trade: TradeRecord) -> StoreResult<String>;

    async fn save_execution_log(&self, user: &str, record: ExecutionLogRecord) -> StoreResult<()>;

    /// Free-form activity log entry (position closures, pauses, resumes).
    async fn log_activity(
        &self,
        user: &str,
        kind: &str,
        payload: serde_json::Value,
    ) -> StoreResult<()>;

    async fn get_user(&self, user: &str) -> StoreResult<Option<UserProfile>>;

    async fn create_or_update_user(&self, profile: UserProfile) -> StoreResult<()>;

    async fn get_global_stats(&self) -> StoreResult<GlobalStats>;

    async fn update_global_stats(&self, stats: GlobalStats) -> StoreResult<()>;
}
