//! Risk management - per-user limits, cooldowns, and trading pauses
//!
//! `RiskManager` owns every user's `RiskState` and answers "can this trade
//! happen" before any order leaves an engine. Denials are result values
//! with a human-readable reason; only an unreachable settings store (or a
//! user without settings) surfaces as an error, and callers must treat
//! that as a denial.
//!
//! Check order in `can_trade`, first failing check wins:
//! 1. persisted status pause, 2. in-memory pause (cooldown auto-clears),
//! 3. consecutive-failure threshold, 4. max position, 5. per-trade risk,
//! 6. daily loss, 7. drawdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::RiskConfig;
use crate::domain::entities::settings::{EngineStatus, SettingsPatch, UserSettings};
use crate::domain::repositories::lifecycle::EngineLifecycle;
use crate::domain::repositories::order_gateway::PositionTracking;
use crate::domain::repositories::settings_store::{SettingsStore, StoreError};

/// Outcome of a risk check.
#[derive(Debug, Clone)]
pub struct RiskVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl RiskVerdict {
    fn allow() -> Self {
        RiskVerdict {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        RiskVerdict {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("No settings found for user: {0}")]
    MissingSettings(String),

    #[error("Settings store error: {0}")]
    Store(#[from] StoreError),
}

/// Per-user risk accounting. Owned exclusively by `RiskManager`; created
/// lazily on the first check and never destroyed while the process runs.
#[derive(Debug, Clone)]
pub struct RiskState {
    /// Live balance: seeded from persisted settings, advanced by recorded
    /// pnl thereafter.
    pub balance: f64,
    pub daily_loss: f64,
    pub daily_start_balance: f64,
    pub day: NaiveDate,
    pub peak_balance: f64,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<Instant>,
    pub paused: bool,
    pub pause_reason: Option<String>,
}

impl RiskState {
    fn new(balance: f64, day: NaiveDate) -> Self {
        RiskState {
            balance,
            daily_loss: 0.0,
            daily_start_balance: balance,
            day,
            peak_balance: balance,
            consecutive_failures: 0,
            last_failure_at: None,
            paused: false,
            pause_reason: None,
        }
    }

    /// Reset daily accounting when the calendar day changes.
    fn roll_over_if_new_day(&mut self, today: NaiveDate) {
        if today != self.day {
            self.daily_loss = 0.0;
            self.daily_start_balance = self.balance;
            self.day = today;
        }
    }

    fn enter_pause(&mut self, reason: String) {
        self.paused = true;
        self.pause_reason = Some(reason);
    }

    fn clear_pause(&mut self) {
        self.paused = false;
        self.pause_reason = None;
    }
}

pub struct RiskManager {
    config: RiskConfig,
    store: Arc<dyn SettingsStore>,
    positions: Option<Arc<dyn PositionTracking>>,
    lifecycle: RwLock<Option<Arc<dyn EngineLifecycle>>>,
    states: RwLock<HashMap<String, Arc<Mutex<RiskState>>>>,
}

impl RiskManager {
    pub fn new(config: RiskConfig, store: Arc<dyn SettingsStore>) -> Self {
        RiskManager {
            config,
            store,
            positions: None,
            lifecycle: RwLock::new(None),
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Wire in the position-tracking capability of the order gateway.
    pub fn with_position_tracking(mut self, positions: Arc<dyn PositionTracking>) -> Self {
        self.positions = Some(positions);
        self
    }

    /// Wire in the engine-stop hook invoked on risk pauses.
    pub async fn set_lifecycle(&self, lifecycle: Arc<dyn EngineLifecycle>) {
        *self.lifecycle.write().await = Some(lifecycle);
    }

    /// Snapshot of a user's risk state, if one exists yet.
    pub async fn get_state(&self, user: &str) -> Option<RiskState> {
        let states = self.states.read().await;
        match states.get(user) {
            Some(state) => Some(state.lock().await.clone()),
            None => None,
        }
    }

    /// Check whether a trade of `trade_size` may happen for `user` right
    /// now. Denials carry the failing check's reason; no side effect
    /// occurs on allow.
    pub async fn can_trade(
        &self,
        user: &str,
        symbol: &str,
        trade_size: f64,
        mid_price: Option<f64>,
        assumed_adverse_move: Option<f64>,
    ) -> Result<RiskVerdict, RiskError> {
        let settings = self
            .store
            .get_settings(user)
            .await?
            .ok_or_else(|| RiskError::MissingSettings(user.to_string()))?;

        // 1. Persisted manual or risk pause.
        if settings.status.is_paused() {
            return Ok(RiskVerdict::deny(format!(
                "Trading is {} for this account",
                settings.status
            )));
        }

        let state = self.state_for(user, &settings).await;
        let mut state = state.lock().await;

        // 2. In-memory pause; the cooldown clears it automatically.
        if state.paused {
            let cooled = state
                .last_failure_at
                .map(|at| at.elapsed() >= self.config.failure_cooldown)
                .unwrap_or(true);
            if !cooled {
                let reason = state
                    .pause_reason
                    .clone()
                    .unwrap_or_else(|| "Trading paused".to_string());
                return Ok(RiskVerdict::deny(reason));
            }
            state.clear_pause();
            info!(user, "Risk pause cooldown elapsed, resuming evaluation");
        }

        // 3. Consecutive failures.
        if state.consecutive_failures >= self.config.failure_threshold {
            let within_cooldown = state
                .last_failure_at
                .map(|at| at.elapsed() < self.config.failure_cooldown)
                .unwrap_or(false);
            if within_cooldown {
                let reason = format!(
                    "{} consecutive failed trades, trading paused",
                    state.consecutive_failures
                );
                self.enter_risk_pause(user, &mut state, &reason).await;
                return Ok(RiskVerdict::deny(reason));
            }
            state.consecutive_failures = 0;
        }

        // 4. Max position.
        let current_position = self.current_position(user, symbol).await;
        let projected = current_position + trade_size;
        if projected.abs() > settings.max_position_size {
            return Ok(RiskVerdict::deny(format!(
                "Position limit exceeded: projected {:.6} exceeds max {:.6}",
                projected, settings.max_position_size
            )));
        }

        // 5. Per-trade risk.
        let adverse = assumed_adverse_move.unwrap_or(self.config.default_adverse_move);
        let estimated_risk = match mid_price {
            Some(mid) => trade_size.abs() * mid * adverse,
            None => trade_size.abs() * self.config.flat_notional_per_unit * adverse,
        };
        let max_trade_risk = state.balance * settings.per_trade_risk_pct / 100.0;
        if estimated_risk > max_trade_risk {
            return Ok(RiskVerdict::deny(format!(
                "Estimated trade risk {:.2} exceeds per-trade limit {:.2}",
                estimated_risk, max_trade_risk
            )));
        }

        // 6. Daily loss.
        let max_daily_loss = state.balance * settings.max_daily_loss_pct / 100.0;
        if state.daily_loss < -max_daily_loss {
            let reason = format!(
                "Daily loss limit exceeded: {:.2} (max {:.2})",
                state.daily_loss.abs(),
                max_daily_loss
            );
            self.enter_risk_pause(user, &mut state, &reason).await;
            return Ok(RiskVerdict::deny(reason));
        }

        // 7. Drawdown.
        let drawdown = state.peak_balance - state.balance;
        if drawdown > state.peak_balance * settings.max_drawdown_pct / 100.0 {
            let reason = format!(
                "Drawdown limit exceeded: {:.2} below peak balance {:.2}",
                drawdown, state.peak_balance
            );
            self.enter_risk_pause(user, &mut state, &reason).await;
            return Ok(RiskVerdict::deny(reason));
        }

        Ok(RiskVerdict::allow())
    }

    /// Record the outcome of a trade attempt. Pure state mutation plus a
    /// log emission; rolls daily accounting over at day boundaries.
    pub async fn record_trade_result(&self, user: &str, pnl: f64, success: bool) {
        let state = self.state_or_default(user).await;
        let mut state = state.lock().await;
        Self::apply_trade_result(&mut state, pnl, success, Local::now().date_naive());
        debug!(
            user,
            pnl,
            success,
            daily_loss = state.daily_loss,
            consecutive_failures = state.consecutive_failures,
            "Recorded trade result"
        );
    }

    fn apply_trade_result(state: &mut RiskState, pnl: f64, success: bool, today: NaiveDate) {
        state.roll_over_if_new_day(today);
        state.daily_loss += pnl;
        state.balance += pnl;
        if state.balance > state.peak_balance {
            state.peak_balance = state.balance;
        }
        if success {
            state.consecutive_failures = 0;
        } else {
            state.consecutive_failures += 1;
            state.last_failure_at = Some(Instant::now());
        }
    }

    /// Manually pause the user: persist the status and stop the engine.
    pub async fn pause_engine(&self, user: &str, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let state = self.state_or_default(user).await;
            let mut state = state.lock().await;
            state.enter_pause(reason.clone());
        }
        self.persist_status(user, EngineStatus::PausedManual).await;
        self.stop_engine(user).await;
        info!(user, %reason, "Engine paused");
    }

    /// Clear pause flags and persist an active status.
    pub async fn resume_engine(&self, user: &str) {
        {
            let state = self.state_or_default(user).await;
            let mut state = state.lock().await;
            state.clear_pause();
            state.consecutive_failures = 0;
        }
        self.persist_status(user, EngineStatus::Active).await;
        info!(user, "Engine resumed");
    }

    /// Transition into a risk pause: flag the state, persist the status,
    /// and stop the user's engine.
    async fn enter_risk_pause(&self, user: &str, state: &mut RiskState, reason: &str) {
        warn!(user, reason, "Entering risk pause");
        state.enter_pause(reason.to_string());
        if state.last_failure_at.is_none() {
            state.last_failure_at = Some(Instant::now());
        }
        self.persist_status(user, EngineStatus::PausedRisk).await;
        self.stop_engine(user).await;
    }

    async fn persist_status(&self, user: &str, status: EngineStatus) {
        if let Err(e) = self
            .store
            .save_settings(user, SettingsPatch::status(status))
            .await
        {
            warn!(user, %e, "Failed to persist engine status");
        }
    }

    async fn stop_engine(&self, user: &str) {
        let lifecycle = self.lifecycle.read().await.clone();
        match lifecycle {
            Some(hook) => hook.stop_engine(user).await,
            None => debug!(user, "No engine lifecycle hook wired, skipping stop"),
        }
    }

    async fn current_position(&self, user: &str, symbol: &str) -> f64 {
        let Some(positions) = &self.positions else {
            return 0.0;
        };
        match positions.net_position(user, symbol).await {
            Ok(net) => net,
            Err(e) => {
                warn!(user, symbol, %e, "Position query failed, assuming flat");
                0.0
            }
        }
    }

    async fn state_for(&self, user: &str, settings: &UserSettings) -> Arc<Mutex<RiskState>> {
        self.ensure_state(user, settings.balance).await
    }

    async fn state_or_default(&self, user: &str) -> Arc<Mutex<RiskState>> {
        if let Some(state) = self.states.read().await.get(user) {
            return state.clone();
        }
        let balance = match self.store.get_settings(user).await {
            Ok(Some(settings)) => settings.balance,
            Ok(None) => 0.0,
            Err(e) => {
                warn!(user, %e, "Settings unavailable while seeding risk state");
                0.0
            }
        };
        self.ensure_state(user, balance).await
    }

    async fn ensure_state(&self, user: &str, balance: f64) -> Arc<Mutex<RiskState>> {
        {
            let states = self.states.read().await;
            if let Some(state) = states.get(user) {
                return state.clone();
            }
        }
        let mut states = self.states.write().await;
        states
            .entry(user.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(RiskState::new(
                    balance,
                    Local::now().date_naive(),
                )))
            })
            .clone()
    }
}
