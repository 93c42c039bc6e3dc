use serde::{Deserialize, Serialize};

/// Persisted engine status for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Active,
    PausedManual,
    PausedRisk,
}

impl EngineStatus {
    pub fn is_paused(&self) -> bool {
        !matches!(self, EngineStatus::Active)
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStatus::Active => write!(f, "active"),
            EngineStatus::PausedManual => write!(f, "paused"),
            EngineStatus::PausedRisk => write!(f, "risk_paused"),
        }
    }
}

/// Per-user trading settings as persisted by the settings store.
///
/// Percentage fields are in percent units: `1.0` means 1%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub status: EngineStatus,
    pub balance: f64,
    pub auto_trade_enabled: bool,
    /// Minimum research accuracy required before executing.
    pub min_accuracy: f64,
    pub trade_size: f64,
    pub strategy: String,
    pub max_position_size: f64,
    pub per_trade_risk_pct: f64,
    pub max_daily_loss_pct: f64,
    pub max_drawdown_pct: f64,
}

impl Default for UserSettings {
    fn default() -> Self {
        UserSettings {
            status: EngineStatus::Active,
            balance: 10_000.0,
            auto_trade_enabled: true,
            min_accuracy: 0.7,
            trade_size: 0.01,
            strategy: "trend-following".to_string(),
            max_position_size: 1.0,
            per_trade_risk_pct: 1.0,
            max_daily_loss_pct: 5.0,
            max_drawdown_pct: 15.0,
        }
    }
}

/// Partial settings update for `SettingsStore::save_settings`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub status: Option<EngineStatus>,
    pub auto_trade_enabled: Option<bool>,
    pub balance: Option<f64>,
}

impl SettingsPatch {
    pub fn status(status: EngineStatus) -> Self {
        SettingsPatch {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn apply(&self, settings: &mut UserSettings) {
        if let Some(status) = self.status {
            settings.status = status;
        }
        if let Some(enabled) = self.auto_trade_enabled {
            settings.auto_trade_enabled = enabled;
        }
        if let Some(balance) = self.balance {
            settings.balance = balance;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_paused() {
        assert!(!EngineStatus::Active.is_paused());
        assert!(EngineStatus::PausedManual.is_paused());
        assert!(EngineStatus::PausedRisk.is_paused());
    }

    #[test]
    fn test_patch_apply() {
        let mut settings = UserSettings::default();
        let patch = SettingsPatch {
            status: Some(EngineStatus::PausedRisk),
            auto_trade_enabled: Some(false),
            balance: None,
        };
        patch.apply(&mut settings);
        assert_eq!(settings.status, EngineStatus::PausedRisk);
        assert!(!settings.auto_trade_enabled);
        assert_eq!(settings.balance, UserSettings::default().balance);
    }
}
