//! Execution Engine
//!
//! The accuracy engine: a periodic loop that runs research for a symbol,
//! gates the result against the user's settings and the risk manager,
//! dispatches the configured strategy for a trade decision, and places the
//! resulting order. Every decision, skip, and execution leaves a
//! structured log entry and a broadcast event so observers can rebuild
//! the full trail without reading engine state.
//!
//! The loop is an error boundary: no single cycle may kill it. Execute-path
//! failures are recorded as failed trades so risk state reflects reality
//! even on partial failure (after placement, after settlement logging).

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::ExecutionConfig;
use crate::domain::entities::order::{OrderRequest, OrderSide};
use crate::domain::entities::signal::{ResearchResult, Signal, TradeDecision};
use crate::domain::entities::settings::UserSettings;
use crate::domain::errors::EngineError;
use crate::domain::repositories::event_sink::{AdminChannel, EngineEvent, EventSink, MetricsSink};
use crate::domain::repositories::market_data::MarketDataFeed;
use crate::domain::repositories::order_gateway::{OrderGateway, PositionTracking};
use crate::domain::repositories::research::ResearchProvider;
use crate::domain::repositories::settings_store::{
    ExecutionLogRecord, GlobalStats, SettingsStore, TradeRecord, UserProfile,
};
use crate::domain::repositories::strategy_engine::{StrategyEngine, StrategyError, HIGH_FREQUENCY_MM};
use crate::domain::services::risk_manager::RiskManager;
use crate::domain::value_objects::price::Price;

/// How many per-symbol research snapshots to keep for read access.
const RESEARCH_CACHE_CAPACITY: usize = 64;

/// Required collaborators, bundled to keep construction readable.
#[derive(Clone)]
pub struct ExecutionDeps {
    pub risk: Arc<RiskManager>,
    pub research: Arc<dyn ResearchProvider>,
    pub feed: Arc<dyn MarketDataFeed>,
    pub gateway: Arc<dyn OrderGateway>,
    pub store: Arc<dyn SettingsStore>,
    pub strategies: Arc<dyn StrategyEngine>,
    pub events: Arc<dyn EventSink>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// Read-only engine status snapshot.
#[derive(Debug, Clone)]
pub struct ExecutionEngineStatus {
    pub running: bool,
    pub symbol: Option<String>,
    pub cycle_interval: Option<Duration>,
}

/// Cloning is cheap and shares the same engine: all mutable state lives
/// behind `Arc`s so the loop runs as a detached task.
#[derive(Clone)]
pub struct ExecutionEngine {
    user: String,
    config: ExecutionConfig,
    deps: ExecutionDeps,
    positions: Option<Arc<dyn PositionTracking>>,
    admin: Option<Arc<dyn AdminChannel>>,
    running: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    active: Arc<Mutex<Option<(String, Duration)>>>,
    loop_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    last_research: Arc<Mutex<LruCache<String, ResearchResult>>>,
    last_exit_check: Arc<Mutex<Option<Instant>>>,
}

impl ExecutionEngine {
    pub fn new(user: impl Into<String>, config: ExecutionConfig, deps: ExecutionDeps) -> Self {
        ExecutionEngine {
            user: user.into(),
            config,
            deps,
            positions: None,
            admin: None,
            running: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            active: Arc::new(Mutex::new(None)),
            loop_task: Arc::new(Mutex::new(None)),
            last_research: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(RESEARCH_CACHE_CAPACITY).expect("capacity is non-zero"),
            ))),
            last_exit_check: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_position_tracking(mut self, positions: Arc<dyn PositionTracking>) -> Self {
        self.positions = Some(positions);
        self
    }

    pub fn with_admin_channel(mut self, admin: Arc<dyn AdminChannel>) -> Self {
        self.admin = Some(admin);
        self
    }

    pub async fn get_status(&self) -> ExecutionEngineStatus {
        let active = self.active.lock().await.clone();
        ExecutionEngineStatus {
            running: self.running.load(Ordering::SeqCst),
            symbol: active.as_ref().map(|(symbol, _)| symbol.clone()),
            cycle_interval: active.map(|(_, interval)| interval),
        }
    }

    /// Most recent research snapshot seen for `symbol`.
    pub async fn last_research(&self, symbol: &str) -> Option<ResearchResult> {
        self.last_research.lock().await.get(symbol).cloned()
    }

    /// Start the loop: one cycle immediately, then every `interval`.
    pub async fn start(&self, symbol: &str, interval: Duration) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.active.lock().await = Some((symbol.to_string(), interval));

        info!(user = %self.user, symbol, ?interval, "Execution engine starting");

        let engine = self.clone();
        let symbol = symbol.to_string();
        let handle = tokio::spawn(async move {
            engine.run_loop(symbol, interval, generation).await;
        });
        *self.loop_task.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the loop. Safe to call concurrently with an in-flight cycle,
    /// and idempotent.
    pub async fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.loop_task.lock().await.take() {
            handle.abort();
        }
        *self.active.lock().await = None;
        if was_running {
            info!(user = %self.user, "Execution engine stopped");
        } else {
            debug!(user = %self.user, "Execution engine already stopped");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::SeqCst)
            && self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(&self, symbol: String, interval: Duration, generation: u64) {
        while self.is_current(generation) {
            match self.run_cycle(&symbol).await {
                Ok(()) => sleep(interval).await,
                Err(e) => {
                    error!(%symbol, %e, "Execution cycle failed, backing off");
                    sleep(self.config.error_backoff).await;
                }
            }
        }
        debug!(%symbol, "Execution loop exited");
    }

    /// One research-and-execute cycle plus the throttled exit sweep. The
    /// exit monitor runs even when the trading step fails; its own
    /// failures are logged and ignored.
    async fn run_cycle(&self, symbol: &str) -> Result<(), EngineError> {
        let outcome = self.run_trading_step(symbol).await;
        self.maybe_check_exits(symbol).await;
        outcome
    }

    async fn run_trading_step(&self, symbol: &str) -> Result<(), EngineError> {
        let cycle_start = Instant::now();

        // 1. Research, broadcast unconditionally.
        let research = timeout(self.config.io_timeout, self.deps.research.run_research(symbol))
            .await
            .map_err(|_| EngineError::Timeout("research"))??;
        self.deps.events.broadcast(EngineEvent::ResearchCompleted {
            symbol: symbol.to_string(),
            signal: research.signal,
            accuracy: research.accuracy,
            recommended_action: research.recommended_action.clone(),
        });
        self.last_research
            .lock()
            .await
            .put(symbol.to_string(), research.clone());

        // 2. Settings.
        let settings = timeout(self.config.io_timeout, self.deps.store.get_settings(&self.user))
            .await
            .map_err(|_| EngineError::Timeout("settings"))??
            .ok_or_else(|| EngineError::MissingSettings(self.user.clone()))?;

        // 3. Decision gate.
        if !settings.auto_trade_enabled {
            self.log_skip(symbol, &research, "Auto-trade disabled", Some(&settings.strategy))
                .await;
            return Ok(());
        }
        if research.accuracy < settings.min_accuracy {
            let reason = format!(
                "Accuracy {:.2} below threshold {:.2}",
                research.accuracy, settings.min_accuracy
            );
            self.log_skip(symbol, &research, &reason, Some(&settings.strategy))
                .await;
            return Ok(());
        }
        if research.signal == Signal::Hold {
            self.log_skip(symbol, &research, "Hold signal", Some(&settings.strategy))
                .await;
            return Ok(());
        }

        // 4-7. Execute path; failures feed back into risk state.
        if let Err(e) = self
            .execute(symbol, &research, &settings, cycle_start)
            .await
        {
            warn!(symbol, %e, "Trade execution failed");
            self.deps.risk.record_trade_result(&self.user, 0.0, false).await;
            self.deps
                .metrics
                .record_trade(&self.user, &settings.strategy, false, None);
            let record = ExecutionLogRecord::skipped(symbol, e.to_string())
                .with_accuracy(research.accuracy)
                .with_strategy(&settings.strategy);
            if let Err(log_err) = self.deps.store.save_execution_log(&self.user, record).await {
                warn!(%log_err, "Failed to persist execution log for failed trade");
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        symbol: &str,
        research: &ResearchResult,
        settings: &UserSettings,
        cycle_start: Instant,
    ) -> Result<(), EngineError> {
        // Fresh book for an up-to-date mid-price.
        let book = timeout(
            self.config.io_timeout,
            self.deps.feed.get_orderbook(symbol, self.config.book_depth),
        )
        .await
        .map_err(|_| EngineError::Timeout("orderbook"))??;
        let mid = book.mid_price();

        // Risk gate; an unreachable risk store counts as a denial.
        let verdict = match self
            .deps
            .risk
            .can_trade(
                &self.user,
                symbol,
                settings.trade_size,
                mid,
                Some(self.config.assumed_adverse_move),
            )
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(%e, "Risk check unavailable, denying trade");
                crate::domain::services::risk_manager::RiskVerdict {
                    allowed: false,
                    reason: Some(format!("Risk check unavailable: {}", e)),
                }
            }
        };
        if !verdict.allowed {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "Risk check denied".to_string());
            self.log_skip(symbol, research, &reason, Some(&settings.strategy))
                .await;
            self.deps.events.broadcast(EngineEvent::RiskAlert {
                user: self.user.clone(),
                symbol: symbol.to_string(),
                reason,
            });
            return Ok(());
        }

        // The high-frequency market maker only runs inside the quote
        // engine; dispatching it here is a configuration error.
        if settings.strategy == HIGH_FREQUENCY_MM {
            return Err(EngineError::ReservedStrategy(settings.strategy.clone()));
        }

        // Idempotent initialization: repeats are not an error.
        let strategy_config = serde_json::json!({
            "symbol": symbol,
            "trade_size": settings.trade_size,
        });
        match self
            .deps
            .strategies
            .initialize(&self.user, &settings.strategy, strategy_config)
            .await
        {
            Ok(()) => {}
            Err(StrategyError::AlreadyInitialized(_)) => {
                debug!(strategy = %settings.strategy, "Strategy already initialized");
            }
            Err(e) => return Err(e.into()),
        }

        let decision = self
            .deps
            .strategies
            .execute(&self.user, &settings.strategy, research, &book)
            .await?;

        let Some(decision) = decision else {
            self.log_skip(symbol, research, "Strategy returned no decision", Some(&settings.strategy))
                .await;
            return Ok(());
        };

        match decision.action {
            Signal::Hold => {
                let reason = decision
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Strategy held".to_string());
                self.log_skip(symbol, research, &reason, Some(&settings.strategy))
                    .await;
                Ok(())
            }
            Signal::Buy | Signal::Sell => {
                self.place_and_record(symbol, research, settings, &decision, cycle_start)
                    .await
            }
        }
    }

    /// 5. Place the order and run the settlement chain: risk record,
    /// trade record, counters, execution log, broadcast, metrics, admin
    /// notice.
    async fn place_and_record(
        &self,
        symbol: &str,
        research: &ResearchResult,
        settings: &UserSettings,
        decision: &TradeDecision,
        cycle_start: Instant,
    ) -> Result<(), EngineError> {
        let side = match decision.action {
            Signal::Buy => OrderSide::Buy,
            Signal::Sell => OrderSide::Sell,
            Signal::Hold => unreachable!("hold decisions never reach placement"),
        };
        let price = decision
            .price
            .map(Price::new)
            .transpose()?;
        let request = OrderRequest::new(
            symbol,
            side,
            decision.order_type,
            crate::domain::value_objects::quantity::Quantity::new(decision.quantity)?,
            price,
        )?;

        let order = timeout(
            self.config.io_timeout,
            self.deps.gateway.place_order(&self.user, &request),
        )
        .await
        .map_err(|_| EngineError::Timeout("order placement"))??;

        let latency_ms = cycle_start.elapsed().as_secs_f64() * 1000.0;
        let fill_price = order.fill_price();
        let slippage_pct = match (decision.price, fill_price) {
            (Some(reference), Some(filled)) if reference > 0.0 => {
                (filled - reference).abs() / reference
            }
            _ => 0.0,
        };

        self.deps.risk.record_trade_result(&self.user, 0.0, true).await;

        let trade = TradeRecord {
            symbol: symbol.to_string(),
            side,
            quantity: decision.quantity,
            price: fill_price.or(decision.price).unwrap_or_default(),
            strategy: settings.strategy.clone(),
            pnl: None,
            executed_at: Utc::now(),
        };
        let trade_id = self.deps.store.save_trade(&self.user, trade).await?;

        let mut profile = self
            .deps
            .store
            .get_user(&self.user)
            .await?
            .unwrap_or_else(|| UserProfile {
                user_id: self.user.clone(),
                total_trades: 0,
            });
        profile.total_trades += 1;
        self.deps.store.create_or_update_user(profile).await?;

        let mut stats: GlobalStats = self.deps.store.get_global_stats().await?;
        stats.total_trades += 1;
        self.deps.store.update_global_stats(stats).await?;

        self.deps
            .store
            .save_execution_log(
                &self.user,
                ExecutionLogRecord::executed(
                    symbol,
                    research.accuracy,
                    latency_ms,
                    slippage_pct,
                    &settings.strategy,
                ),
            )
            .await?;

        info!(
            user = %self.user,
            symbol,
            %side,
            %trade_id,
            quantity = decision.quantity,
            accuracy = research.accuracy,
            latency_ms,
            slippage_pct,
            strategy = %settings.strategy,
            "Trade executed"
        );

        self.deps.events.broadcast(EngineEvent::TradeExecuted {
            user: self.user.clone(),
            symbol: symbol.to_string(),
            side,
            quantity: decision.quantity,
            price: fill_price,
            strategy: settings.strategy.clone(),
            accuracy: research.accuracy,
            latency_ms,
            slippage_pct,
        });
        self.deps
            .metrics
            .record_trade(&self.user, &settings.strategy, true, Some(latency_ms));

        if let Some(admin) = &self.admin {
            let message = format!(
                "{} {} {:.6} {} ({})",
                side,
                symbol,
                decision.quantity,
                fill_price.map(|p| format!("@ {:.2}", p)).unwrap_or_default(),
                settings.strategy
            );
            if let Err(e) = admin.notify(&message).await {
                warn!(%e, "Admin notification failed");
            }
        }

        Ok(())
    }

    async fn log_skip(
        &self,
        symbol: &str,
        research: &ResearchResult,
        reason: &str,
        strategy: Option<&str>,
    ) {
        info!(user = %self.user, symbol, reason, "Execution skipped");
        let mut record =
            ExecutionLogRecord::skipped(symbol, reason).with_accuracy(research.accuracy);
        if let Some(strategy) = strategy {
            record = record.with_strategy(strategy);
        }
        if let Err(e) = self.deps.store.save_execution_log(&self.user, record).await {
            warn!(%e, "Failed to persist execution log");
        }
        self.deps.events.broadcast(EngineEvent::ExecutionSkipped {
            user: self.user.clone(),
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        });
    }

    /// 8. Exit monitor, throttled independently of the main cadence.
    async fn maybe_check_exits(&self, symbol: &str) {
        {
            let mut last = self.last_exit_check.lock().await;
            let throttled = last
                .map(|at| at.elapsed() < self.config.exit_check_interval)
                .unwrap_or(false);
            if throttled {
                return;
            }
            *last = Some(Instant::now());
        }

        // Capability check: a gateway without position tracking simply
        // has no exit monitoring.
        let Some(positions) = self.positions.clone() else {
            return;
        };
        if let Err(e) = self.check_exits(positions.as_ref(), symbol).await {
            warn!(symbol, %e, "Exit monitor sweep failed");
        }
    }

    async fn check_exits(
        &self,
        positions: &dyn PositionTracking,
        symbol: &str,
    ) -> Result<(), EngineError> {
        let book = timeout(
            self.config.io_timeout,
            self.deps.feed.get_orderbook(symbol, self.config.book_depth),
        )
        .await
        .map_err(|_| EngineError::Timeout("orderbook"))??;
        let Some(mid) = book.mid_price() else {
            return Ok(());
        };
        let price = Price::new(mid)?;
        let now = Utc::now();

        let open = timeout(self.config.io_timeout, positions.open_positions(&self.user, symbol))
            .await
            .map_err(|_| EngineError::Timeout("open positions"))??;

        for position in open {
            let Some(reason) = position.exit_trigger(price, now) else {
                continue;
            };
            let closed = timeout(
                self.config.io_timeout,
                positions.close_position(&self.user, symbol, &position.id),
            )
            .await;
            match closed {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(position_id = %position.id, %e, "Failed to close position");
                    continue;
                }
                Err(_) => {
                    warn!(position_id = %position.id, "Position close timed out");
                    continue;
                }
            }
            info!(
                user = %self.user,
                symbol,
                position_id = %position.id,
                %reason,
                price = mid,
                "Position closed by exit monitor"
            );
            if let Err(e) = self
                .deps
                .store
                .log_activity(
                    &self.user,
                    "position_closed",
                    serde_json::json!({
                        "position_id": position.id,
                        "symbol": symbol,
                        "reason": reason.to_string(),
                        "price": mid,
                    }),
                )
                .await
            {
                warn!(%e, "Failed to log position closure");
            }
            self.deps.events.broadcast(EngineEvent::PositionClosed {
                user: self.user.clone(),
                symbol: symbol.to_string(),
                position_id: position.id.clone(),
                reason,
                price: mid,
            });
        }
        Ok(())
    }
}
