//! Engine configuration
//!
//! All policy constants live here as configurable parameters with the
//! defaults the engines ship with. `from_env` constructors validate ranges
//! and fall back to the defaults on bad input.

use std::time::Duration;

/// Parse an env var as f64, keeping `default` unless the value parses and
/// passes `valid`.
fn env_f64(name: &str, default: f64, valid: impl Fn(f64) -> bool) -> f64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<f64>() {
            Ok(value) if valid(value) => value,
            Ok(value) => {
                tracing::warn!(
                    "Invalid {} value: {} (out of range), using default: {}",
                    name,
                    value,
                    default
                );
                default
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {} '{}': {}, using default: {}",
                    name,
                    raw,
                    e,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

fn env_ms(name: &str, default: Duration, min_ms: u64, max_ms: u64) -> Duration {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(ms) if (min_ms..=max_ms).contains(&ms) => Duration::from_millis(ms),
            Ok(ms) => {
                tracing::warn!(
                    "Invalid {} value: {}ms (must be {}..={}ms), using default: {:?}",
                    name,
                    ms,
                    min_ms,
                    max_ms,
                    default
                );
                default
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to parse {} '{}': {}, using default: {:?}",
                    name,
                    raw,
                    e,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}

fn env_u32(name: &str, default: u32, valid: impl Fn(u32) -> bool) -> u32 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u32>() {
            Ok(value) if valid(value) => value,
            _ => {
                tracing::warn!("Invalid {} value '{}', using default: {}", name, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Risk manager policy knobs.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Consecutive failed trades before the user is paused.
    pub failure_threshold: u32,
    /// How long a failure-triggered pause holds.
    pub failure_cooldown: Duration,
    /// Adverse move assumed when the caller does not supply one.
    pub default_adverse_move: f64,
    /// Per-unit notional used when no mid-price is available.
    pub flat_notional_per_unit: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            failure_threshold: 3,
            failure_cooldown: Duration::from_secs(300),
            default_adverse_move: 0.01,
            flat_notional_per_unit: 10_000.0,
        }
    }
}

impl RiskConfig {
    pub fn from_env() -> Self {
        let defaults = RiskConfig::default();
        RiskConfig {
            failure_threshold: env_u32("RISK_FAILURE_THRESHOLD", defaults.failure_threshold, |v| {
                (1..=100).contains(&v)
            }),
            failure_cooldown: env_ms(
                "RISK_FAILURE_COOLDOWN_MS",
                defaults.failure_cooldown,
                1_000,
                86_400_000,
            ),
            default_adverse_move: env_f64(
                "RISK_DEFAULT_ADVERSE_MOVE",
                defaults.default_adverse_move,
                |v| (0.0001..=0.5).contains(&v),
            ),
            flat_notional_per_unit: env_f64(
                "RISK_FLAT_NOTIONAL_PER_UNIT",
                defaults.flat_notional_per_unit,
                |v| v > 0.0,
            ),
        }
    }
}

/// Configuration for one quote engine run. Immutable while running.
#[derive(Debug, Clone)]
pub struct QuoteConfig {
    pub symbol: String,
    pub quote_size: f64,
    /// Relative mid-price move that triggers the adverse-selection guard.
    pub adverse_move_pct: f64,
    /// Resting time before a quote side is cancelled.
    pub cancel_interval: Duration,
    pub max_position_size: f64,
    /// Scheduling cadence of the quoting loop.
    pub cycle_interval: Duration,
    /// Fraction of the half-spread the quotes sit inside the touch.
    pub quote_inset_frac: f64,
    pub error_backoff: Duration,
    pub io_timeout: Duration,
    pub book_depth: usize,
}

impl QuoteConfig {
    pub fn new(symbol: impl Into<String>) -> Self {
        QuoteConfig {
            symbol: symbol.into(),
            quote_size: 0.01,
            adverse_move_pct: 0.002,
            cancel_interval: Duration::from_secs(5),
            max_position_size: 1.0,
            cycle_interval: Duration::from_millis(100),
            quote_inset_frac: 0.5,
            error_backoff: Duration::from_secs(1),
            io_timeout: Duration::from_secs(5),
            book_depth: 5,
        }
    }

    pub fn from_env(symbol: impl Into<String>) -> Self {
        let defaults = QuoteConfig::new(symbol);
        QuoteConfig {
            quote_size: env_f64("QUOTE_SIZE", defaults.quote_size, |v| v > 0.0),
            adverse_move_pct: env_f64("QUOTE_ADVERSE_MOVE_PCT", defaults.adverse_move_pct, |v| {
                (0.00001..=0.5).contains(&v)
            }),
            cancel_interval: env_ms(
                "QUOTE_CANCEL_INTERVAL_MS",
                defaults.cancel_interval,
                100,
                600_000,
            ),
            max_position_size: env_f64("QUOTE_MAX_POSITION_SIZE", defaults.max_position_size, |v| {
                v > 0.0
            }),
            cycle_interval: env_ms("QUOTE_CYCLE_INTERVAL_MS", defaults.cycle_interval, 10, 60_000),
            quote_inset_frac: env_f64("QUOTE_INSET_FRAC", defaults.quote_inset_frac, |v| {
                (0.0..1.0).contains(&v)
            }),
            error_backoff: env_ms("QUOTE_ERROR_BACKOFF_MS", defaults.error_backoff, 100, 60_000),
            io_timeout: env_ms("QUOTE_IO_TIMEOUT_MS", defaults.io_timeout, 100, 60_000),
            book_depth: env_u32("QUOTE_BOOK_DEPTH", defaults.book_depth as u32, |v| {
                (1..=100).contains(&v)
            }) as usize,
            ..defaults
        }
    }
}

/// Configuration for the execution (accuracy) engine.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Cadence of the research-and-execute cycle.
    pub cycle_interval: Duration,
    /// Exit monitor throttle, independent of the main cadence.
    pub exit_check_interval: Duration,
    /// Adverse move passed to the risk check before placing.
    pub assumed_adverse_move: f64,
    pub error_backoff: Duration,
    pub io_timeout: Duration,
    pub book_depth: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            cycle_interval: Duration::from_secs(60),
            exit_check_interval: Duration::from_secs(2),
            assumed_adverse_move: 0.01,
            error_backoff: Duration::from_secs(1),
            io_timeout: Duration::from_secs(5),
            book_depth: 5,
        }
    }
}

impl ExecutionConfig {
    pub fn from_env() -> Self {
        let defaults = ExecutionConfig::default();
        ExecutionConfig {
            cycle_interval: env_ms(
                "EXECUTION_CYCLE_INTERVAL_MS",
                defaults.cycle_interval,
                1_000,
                3_600_000,
            ),
            exit_check_interval: env_ms(
                "EXECUTION_EXIT_CHECK_INTERVAL_MS",
                defaults.exit_check_interval,
                100,
                600_000,
            ),
            assumed_adverse_move: env_f64(
                "EXECUTION_ASSUMED_ADVERSE_MOVE",
                defaults.assumed_adverse_move,
                |v| (0.0001..=0.5).contains(&v),
            ),
            error_backoff: env_ms(
                "EXECUTION_ERROR_BACKOFF_MS",
                defaults.error_backoff,
                100,
                60_000,
            ),
            io_timeout: env_ms("EXECUTION_IO_TIMEOUT_MS", defaults.io_timeout, 100, 60_000),
            book_depth: env_u32("EXECUTION_BOOK_DEPTH", defaults.book_depth as u32, |v| {
                (1..=100).contains(&v)
            }) as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_defaults() {
        let config = RiskConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.failure_cooldown, Duration::from_secs(300));
        assert_eq!(config.default_adverse_move, 0.01);
    }

    #[test]
    fn test_quote_defaults() {
        let config = QuoteConfig::new("BTCUSDT");
        assert_eq!(config.symbol, "BTCUSDT");
        assert_eq!(config.cycle_interval, Duration::from_millis(100));
        assert_eq!(config.quote_inset_frac, 0.5);
        assert_eq!(config.cancel_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_execution_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.exit_check_interval, Duration::from_secs(2));
        assert_eq!(config.assumed_adverse_move, 0.01);
    }

    #[test]
    fn test_env_f64_rejects_out_of_range() {
        std::env::set_var("KESTREL_TEST_F64", "7.5");
        assert_eq!(env_f64("KESTREL_TEST_F64", 1.0, |v| v < 5.0), 1.0);
        std::env::set_var("KESTREL_TEST_F64", "2.5");
        assert_eq!(env_f64("KESTREL_TEST_F64", 1.0, |v| v < 5.0), 2.5);
        std::env::remove_var("KESTREL_TEST_F64");
    }

    #[test]
    fn test_env_ms_parses() {
        std::env::set_var("KESTREL_TEST_MS", "250");
        assert_eq!(
            env_ms("KESTREL_TEST_MS", Duration::from_secs(1), 100, 1_000),
            Duration::from_millis(250)
        );
        std::env::set_var("KESTREL_TEST_MS", "50");
        assert_eq!(
            env_ms("KESTREL_TEST_MS", Duration::from_secs(1), 100, 1_000),
            Duration::from_secs(1)
        );
        std::env::remove_var("KESTREL_TEST_MS");
    }
}
