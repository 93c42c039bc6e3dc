//! End-to-end runs of both engines against in-process mock collaborators.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kestrel::application::engines::execution_engine::{ExecutionDeps, ExecutionEngine};
use kestrel::application::engines::quote_engine::QuoteEngine;
use kestrel::config::{ExecutionConfig, QuoteConfig, RiskConfig};
use kestrel::domain::entities::order::{Order, OrderRequest, OrderSide, OrderStatus, OrderType};
use kestrel::domain::entities::settings::UserSettings;
use kestrel::domain::entities::signal::{ResearchResult, Signal, TradeDecision};
use kestrel::domain::repositories::event_sink::EngineEvent;
use kestrel::domain::repositories::lifecycle::EngineLifecycle;
use kestrel::domain::repositories::market_data::{
    BookLevel, MarketDataFeed, MarketDataResult, OrderBook,
};
use kestrel::domain::repositories::order_gateway::{GatewayResult, OrderGateway};
use kestrel::domain::repositories::research::{ResearchError, ResearchProvider};
use kestrel::domain::repositories::settings_store::SettingsStore;
use kestrel::domain::repositories::strategy_engine::{StrategyEngine, StrategyError};
use kestrel::domain::services::metrics::TradingMetrics;
use kestrel::domain::services::risk_manager::RiskManager;
use kestrel::infrastructure::event_bus::EventBus;
use kestrel::infrastructure::memory_store::MemorySettingsStore;

struct StaticFeed {
    bid: f64,
    ask: f64,
}

#[async_trait]
impl MarketDataFeed for StaticFeed {
    async fn get_orderbook(&self, _symbol: &str, _depth: usize) -> MarketDataResult<OrderBook> {
        Ok(OrderBook {
            bids: vec![BookLevel { price: self.bid, quantity: 10.0 }],
            asks: vec![BookLevel { price: self.ask, quantity: 10.0 }],
        })
    }
}

#[derive(Default)]
struct RecordingGateway {
    placed: Mutex<Vec<OrderRequest>>,
    cancelled: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    async fn place_order(&self, _user: &str, request: &OrderRequest) -> GatewayResult<Order> {
        let id = format!("order_{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.placed.lock().unwrap().push(request.clone());
        Ok(Order {
            id,
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity.value(),
            price: request.price.map(|p| p.value()),
            avg_price: request.price.map(|p| p.value()),
            status: OrderStatus::Filled,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> GatewayResult<()> {
        self.cancelled.lock().unwrap().push(order_id.to_string());
        Ok(())
    }
}

struct BullishResearch;

#[async_trait]
impl ResearchProvider for BullishResearch {
    async fn run_research(&self, symbol: &str) -> Result<ResearchResult, ResearchError> {
        Ok(ResearchResult {
            symbol: symbol.to_string(),
            signal: Signal::Buy,
            accuracy: 0.92,
            recommended_action: "Enter long".to_string(),
        })
    }
}

struct FollowTheSignal;

#[async_trait]
impl StrategyEngine for FollowTheSignal {
    async fn initialize(
        &self,
        _user: &str,
        _name: &str,
        _config: serde_json::Value,
    ) -> Result<(), StrategyError> {
        Ok(())
    }

    async fn execute(
        &self,
        _user: &str,
        _name: &str,
        research: &ResearchResult,
        book: &OrderBook,
    ) -> Result<Option<TradeDecision>, StrategyError> {
        Ok(Some(TradeDecision {
            action: research.signal,
            order_type: OrderType::Limit,
            quantity: 0.01,
            price: book.mid_price(),
            reason: None,
        }))
    }
}

/// Stops the wired quote engine when the risk manager pauses a user.
struct QuoteEngineStopper {
    engine: Arc<QuoteEngine>,
}

#[async_trait]
impl EngineLifecycle for QuoteEngineStopper {
    async fn stop_engine(&self, _user: &str) {
        // Detach so a pause raised from inside the engine's own cycle
        // never tears down the task it is running on.
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.stop().await;
        });
    }
}

#[tokio::test]
async fn test_execution_engine_trades_end_to_end() {
    let store = Arc::new(MemorySettingsStore::new());
    store.set_settings("alice", UserSettings::default()).await;

    let risk = Arc::new(RiskManager::new(RiskConfig::default(), store.clone()));
    let gateway = Arc::new(RecordingGateway::default());
    let metrics = Arc::new(TradingMetrics::new());
    let bus = Arc::new(EventBus::new(64));
    let mut events = bus.subscribe();

    let deps = ExecutionDeps {
        risk: risk.clone(),
        research: Arc::new(BullishResearch),
        feed: Arc::new(StaticFeed { bid: 49990.0, ask: 50010.0 }),
        gateway: gateway.clone(),
        store: store.clone(),
        strategies: Arc::new(FollowTheSignal),
        events: bus.clone(),
        metrics: metrics.clone(),
    };
    let engine = Arc::new(ExecutionEngine::new("alice", ExecutionConfig::default(), deps));

    engine
        .start("BTCUSDT", Duration::from_secs(60))
        .await
        .unwrap();

    // The first cycle runs immediately; give it a moment to settle.
    tokio::time::sleep(Duration::from_millis(100)).await;
    engine.stop().await;

    // One order placed through the gateway at the mid-price.
    let placed = gateway.placed.lock().unwrap().clone();
    assert_eq!(placed.len(), 1, "exactly one order per cycle");
    assert_eq!(placed[0].side, OrderSide::Buy);

    // The decision trail arrived on the event bus in order.
    let first = events.try_recv().expect("research event");
    assert!(matches!(first, EngineEvent::ResearchCompleted { .. }));
    let second = events.try_recv().expect("execution event");
    assert!(matches!(second, EngineEvent::TradeExecuted { .. }));

    // Records, counters, and metrics all moved.
    assert_eq!(store.trades_for("alice").await.len(), 1);
    assert_eq!(
        store.get_user("alice").await.unwrap().unwrap().total_trades,
        1
    );
    assert_eq!(store.get_global_stats().await.unwrap().total_trades, 1);
    assert_eq!(metrics.snapshot().successful_trades, 1);

    // Success resets the failure streak.
    let state = risk.get_state("alice").await.unwrap();
    assert_eq!(state.consecutive_failures, 0);
}

#[tokio::test]
async fn test_quote_engine_quotes_and_stops_cleanly() {
    let store = Arc::new(MemorySettingsStore::new());
    store.set_settings("bob", UserSettings::default()).await;
    let risk = Arc::new(RiskManager::new(RiskConfig::default(), store.clone()));
    let gateway = Arc::new(RecordingGateway::default());

    let config = QuoteConfig {
        cancel_interval: Duration::from_secs(30),
        ..QuoteConfig::new("ETHUSDT")
    };
    let engine = Arc::new(
        QuoteEngine::new(
            config,
            risk,
            Arc::new(StaticFeed { bid: 2999.0, ask: 3001.0 }),
            gateway.clone(),
        )
        .with_user("bob"),
    );

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    engine.stop().await;

    let placed = gateway.placed.lock().unwrap().clone();
    assert_eq!(placed.len(), 2, "one bid and one ask");
    let sides: Vec<OrderSide> = placed.iter().map(|request| request.side).collect();
    assert!(sides.contains(&OrderSide::Buy));
    assert!(sides.contains(&OrderSide::Sell));

    // Quotes sit strictly inside the spread.
    for request in &placed {
        let price = request.price.unwrap().value();
        assert!(price > 2999.0 && price < 3001.0, "quote at {} is inside", price);
    }

    // Stop cancelled everything that was resting.
    let cancelled = gateway.cancelled.lock().unwrap().clone();
    assert_eq!(cancelled.len(), 2, "both quotes cancelled on stop");

    // A second stop changes nothing.
    engine.stop().await;
    assert_eq!(gateway.cancelled.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_risk_pause_stops_quote_engine_via_lifecycle() {
    let store = Arc::new(MemorySettingsStore::new());
    store.set_settings("carol", UserSettings::default()).await;
    let risk = Arc::new(RiskManager::new(RiskConfig::default(), store.clone()));
    let gateway = Arc::new(RecordingGateway::default());

    let engine = Arc::new(
        QuoteEngine::new(
            QuoteConfig::new("BTCUSDT"),
            risk.clone(),
            Arc::new(StaticFeed { bid: 49990.0, ask: 50010.0 }),
            gateway.clone(),
        )
        .with_user("carol"),
    );
    risk.set_lifecycle(Arc::new(QuoteEngineStopper {
        engine: engine.clone(),
    }))
    .await;

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(engine.get_status().running);

    // Blow through the daily loss limit; the next check pauses the user
    // and the lifecycle hook stops the engine.
    risk.record_trade_result("carol", -600.0, true).await;
    let verdict = risk
        .can_trade("carol", "BTCUSDT", 0.01, Some(50000.0), Some(0.01))
        .await
        .unwrap();
    assert!(!verdict.allowed);
    assert!(verdict
        .reason
        .unwrap()
        .contains("Daily loss limit exceeded"));

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!engine.get_status().running, "engine stopped by risk pause");
}
