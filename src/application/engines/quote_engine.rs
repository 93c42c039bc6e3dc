//! Quote Engine
//!
//! Continuous market-making loop for one symbol. Each cycle the loop asks
//! the risk manager for permission, reads the top of book, guards against
//! adverse mid-price moves, and re-quotes both sides strictly inside the
//! spread. Cancellation always happens before replacement on a side, so
//! the engine never rests two orders on the same side at once.
//!
//! Per-quote cancellation timers are tagged with the run generation; a
//! `stop()` or re-quote bumps the generation and pending timers become
//! no-ops instead of firing after teardown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::QuoteConfig;
use crate::domain::entities::order::{OrderRequest, OrderSide};
use crate::domain::errors::EngineError;
use crate::domain::repositories::market_data::MarketDataFeed;
use crate::domain::repositories::order_gateway::{OrderGateway, PositionTracking};
use crate::domain::services::risk_manager::RiskManager;

/// Resting quote bookkeeping for the engine's symbol.
#[derive(Debug, Clone, Default)]
pub struct QuoteState {
    pub bid_order_id: Option<String>,
    pub ask_order_id: Option<String>,
    pub placed_at: Option<Instant>,
    /// Mid-price the resting quotes were computed from.
    pub baseline_mid: f64,
}

impl QuoteState {
    pub fn has_active_quote(&self) -> bool {
        self.bid_order_id.is_some() || self.ask_order_id.is_some()
    }
}

/// Read-only engine status snapshot.
#[derive(Debug, Clone)]
pub struct QuoteEngineStatus {
    pub running: bool,
    pub config: QuoteConfig,
}

/// Cloning is cheap and shares the same engine: all mutable state lives
/// behind `Arc`s, which is what lets the loop and the cancel timers run
/// as detached tasks.
#[derive(Clone)]
pub struct QuoteEngine {
    config: QuoteConfig,
    user: Option<String>,
    risk: Arc<RiskManager>,
    feed: Arc<dyn MarketDataFeed>,
    gateway: Arc<dyn OrderGateway>,
    positions: Option<Arc<dyn PositionTracking>>,
    running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    state: Arc<Mutex<QuoteState>>,
    cancel_timers: Arc<Mutex<Vec<JoinHandle<()>>>>,
    loop_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl QuoteEngine {
    pub fn new(
        config: QuoteConfig,
        risk: Arc<RiskManager>,
        feed: Arc<dyn MarketDataFeed>,
        gateway: Arc<dyn OrderGateway>,
    ) -> Self {
        QuoteEngine {
            config,
            user: None,
            risk,
            feed,
            gateway,
            positions: None,
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(QuoteState::default())),
            cancel_timers: Arc::new(Mutex::new(Vec::new())),
            loop_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Set the trading context. An engine without one refuses to start.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_position_tracking(mut self, positions: Arc<dyn PositionTracking>) -> Self {
        self.positions = Some(positions);
        self
    }

    pub fn get_status(&self) -> QuoteEngineStatus {
        QuoteEngineStatus {
            running: self.running.load(Ordering::SeqCst),
            config: self.config.clone(),
        }
    }

    /// Start the quoting loop.
    ///
    /// # Errors
    /// `MissingUserContext` when no trading context was configured (a
    /// caller-side contract violation, not a business denial), and
    /// `AlreadyRunning` when the engine is running.
    pub async fn start(&self) -> Result<(), EngineError> {
        let user = self
            .user
            .clone()
            .ok_or(EngineError::MissingUserContext)?;
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            symbol = %self.config.symbol,
            %user,
            "Quote engine starting"
        );

        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine.run_loop(user, generation).await;
        });
        *self.loop_task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the loop, cancel resting quotes best-effort, and clear state.
    /// Safe to call concurrently with an in-flight cycle, and idempotent.
    pub async fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        // Invalidate pending cancellation timers regardless; a second stop
        // must leave state identical to the first.
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(handle) = self.loop_task.lock().await.take() {
            handle.abort();
        }
        for handle in self.cancel_timers.lock().await.drain(..) {
            handle.abort();
        }

        let mut state = self.state.lock().await;
        self.cancel_active_quotes(&mut state).await;
        *state = QuoteState::default();

        if was_running {
            info!(symbol = %self.config.symbol, "Quote engine stopped");
        } else {
            debug!(symbol = %self.config.symbol, "Quote engine already stopped");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(&self, user: String, generation: u64) {
        while self.is_current(generation) {
            match self.run_cycle(&user, generation).await {
                Ok(()) => sleep(self.config.cycle_interval).await,
                Err(e) => {
                    error!(symbol = %self.config.symbol, %e, "Quote cycle failed, backing off");
                    sleep(self.config.error_backoff).await;
                }
            }
        }
        debug!(symbol = %self.config.symbol, "Quote loop exited");
    }

    /// One scheduling cycle. Risk denials, empty books, and adverse-move
    /// cancels end the cycle without error.
    async fn run_cycle(&self, user: &str, generation: u64) -> Result<(), EngineError> {
        let verdict = match self
            .risk
            .can_trade(user, &self.config.symbol, self.config.quote_size, None, None)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(user, %e, "Risk check unavailable, not quoting");
                return Ok(());
            }
        };
        if !verdict.allowed {
            debug!(
                user,
                reason = verdict.reason.as_deref().unwrap_or_default(),
                "Quoting denied by risk manager"
            );
            return Ok(());
        }
        if !self.is_current(generation) {
            return Ok(());
        }

        let book = timeout(
            self.config.io_timeout,
            self.feed
                .get_orderbook(&self.config.symbol, self.config.book_depth),
        )
        .await
        .map_err(|_| EngineError::Timeout("orderbook"))??;

        let (best_bid, best_ask) = match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => (bid, ask),
            _ => {
                debug!(symbol = %self.config.symbol, "Order book empty, skipping cycle");
                return Ok(());
            }
        };
        let mid = (best_bid + best_ask) / 2.0;
        if !self.is_current(generation) {
            return Ok(());
        }

        let mut state = self.state.lock().await;

        // Adverse-selection guard: a young quote in a fast market gets
        // cancelled, and nothing replaces it this cycle.
        if let Some(placed_at) = state.placed_at {
            if state.has_active_quote()
                && placed_at.elapsed() < self.config.cancel_interval
                && state.baseline_mid > 0.0
            {
                let move_pct = ((mid - state.baseline_mid) / state.baseline_mid).abs();
                if move_pct > self.config.adverse_move_pct {
                    warn!(
                        symbol = %self.config.symbol,
                        move_pct,
                        baseline = state.baseline_mid,
                        mid,
                        "Adverse move against resting quotes, cancelling"
                    );
                    self.cancel_active_quotes(&mut state).await;
                    return Ok(());
                }
            }
        }

        // Re-quote when nothing rests or the quote has gone stale.
        let stale = state
            .placed_at
            .map(|at| at.elapsed() > self.config.cancel_interval * 2)
            .unwrap_or(true);
        if state.has_active_quote() && !stale {
            return Ok(());
        }

        self.cancel_active_quotes(&mut state).await;
        if !self.is_current(generation) {
            return Ok(());
        }
        self.place_quotes(user, &mut state, best_bid, best_ask, mid, generation)
            .await
    }

    /// Place bid/ask strictly inside the spread, each side gated by its
    /// own projected-position cap.
    async fn place_quotes(
        &self,
        user: &str,
        state: &mut QuoteState,
        best_bid: f64,
        best_ask: f64,
        mid: f64,
        generation: u64,
    ) -> Result<(), EngineError> {
        let half_spread = (best_ask - best_bid) / 2.0;
        if half_spread <= 0.0 {
            debug!(symbol = %self.config.symbol, "Crossed or empty spread, not quoting");
            return Ok(());
        }
        let inset = half_spread * self.config.quote_inset_frac;
        let bid_price = best_bid + inset;
        let ask_price = best_ask - inset;

        let position = self.current_position(user).await;
        let allow_bid = position + self.config.quote_size <= self.config.max_position_size;
        let allow_ask = position - self.config.quote_size >= -self.config.max_position_size;

        state.placed_at = Some(Instant::now());
        state.baseline_mid = mid;

        if allow_bid {
            let request = OrderRequest::limit(
                &self.config.symbol,
                OrderSide::Buy,
                self.config.quote_size,
                bid_price,
            )?;
            let order = timeout(self.config.io_timeout, self.gateway.place_order(user, &request))
                .await
                .map_err(|_| EngineError::Timeout("bid placement"))??;
            debug!(order_id = %order.id, price = bid_price, "Bid quote placed");
            state.bid_order_id = Some(order.id.clone());
            self.arm_cancel_timer(order.id, OrderSide::Buy, generation).await;
        } else {
            debug!(position, "Bid would breach the long position cap, skipping side");
        }

        if allow_ask {
            let request = OrderRequest::limit(
                &self.config.symbol,
                OrderSide::Sell,
                self.config.quote_size,
                ask_price,
            )?;
            let order = timeout(self.config.io_timeout, self.gateway.place_order(user, &request))
                .await
                .map_err(|_| EngineError::Timeout("ask placement"))??;
            debug!(order_id = %order.id, price = ask_price, "Ask quote placed");
            state.ask_order_id = Some(order.id.clone());
            self.arm_cancel_timer(order.id, OrderSide::Sell, generation).await;
        } else {
            debug!(position, "Ask would breach the short position cap, skipping side");
        }

        Ok(())
    }

    /// Arm a cancellation timer for one resting order. The timer is a
    /// no-op once the run generation moves on or the order was already
    /// replaced.
    async fn arm_cancel_timer(&self, order_id: String, side: OrderSide, generation: u64) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            sleep(engine.config.cancel_interval).await;
            if !engine.is_current(generation) {
                return;
            }
            let mut state = engine.state.lock().await;
            let slot = match side {
                OrderSide::Buy => &mut state.bid_order_id,
                OrderSide::Sell => &mut state.ask_order_id,
            };
            if slot.as_deref() != Some(order_id.as_str()) {
                return;
            }
            *slot = None;
            drop(state);
            match timeout(engine.config.io_timeout, engine.gateway.cancel_order(&order_id)).await
            {
                Ok(Ok(())) => debug!(%order_id, "Resting quote expired and cancelled"),
                Ok(Err(e)) => warn!(%order_id, %e, "Failed to cancel expired quote"),
                Err(_) => warn!(%order_id, "Expiry cancel timed out"),
            }
        });

        let mut timers = self.cancel_timers.lock().await;
        timers.retain(|timer| !timer.is_finished());
        timers.push(handle);
    }

    /// Cancel whatever rests right now. Best-effort: a failure on one side
    /// never prevents attempting the other.
    async fn cancel_active_quotes(&self, state: &mut QuoteState) {
        for order_id in [state.bid_order_id.take(), state.ask_order_id.take()]
            .into_iter()
            .flatten()
        {
            match timeout(self.config.io_timeout, self.gateway.cancel_order(&order_id)).await {
                Ok(Ok(())) => debug!(%order_id, "Quote cancelled"),
                Ok(Err(e)) => warn!(%order_id, %e, "Quote cancel failed, continuing"),
                Err(_) => warn!(%order_id, "Quote cancel timed out, continuing"),
            }
        }
        state.placed_at = None;
        state.baseline_mid = 0.0;
    }

    async fn current_position(&self, user: &str) -> f64 {
        let Some(positions) = &self.positions else {
            return 0.0;
        };
        match positions.net_position(user, &self.config.symbol).await {
            Ok(net) => net,
            Err(e) => {
                warn!(user, %e, "Position query failed, assuming flat");
                0.0
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn quote_state(&self) -> QuoteState {
        self.state.lock().await.clone()
    }

    #[cfg(test)]
    pub(crate) fn force_running(&self, generation: u64) {
        self.running.store(true, Ordering::SeqCst);
        self.generation.store(generation, Ordering::SeqCst);
    }
}
