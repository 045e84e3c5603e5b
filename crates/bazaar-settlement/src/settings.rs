use chrono::Duration;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct SettlementSettings {
    pub currency: String,
    pub success_url: String,
    pub failure_url: String,
    pub minimum_withdrawal: Decimal,
    pub renewal_window: Duration,
    pub stale_after: Duration,
    pub recent_entries: usize,
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            currency: "XAF".to_string(),
            success_url: String::new(),
            failure_url: String::new(),
            minimum_withdrawal: Decimal::new(1000, 0),
            renewal_window: Duration::days(7),
            stale_after: Duration::seconds(300),
            recent_entries: 20,
        }
    }
}
