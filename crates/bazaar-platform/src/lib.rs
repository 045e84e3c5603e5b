pub mod config;
pub mod contracts;
pub mod db;
pub mod payment_gateway;
pub mod redis_bus;
pub mod sinks;

pub use config::{GatewayConfig, ReconcileConfig, ServiceConfig, settlement_settings_from_env};
pub use contracts::{
    AutoRenewRequest, ConfirmPaymentResponse, CreatePurchaseRequest, CreatePurchaseResponse,
    CreateWithdrawalRequest, PaymentCallback, RequestStatusResponse, ReviewRequest,
    WithdrawalListQuery, payee_from,
};
pub use db::{apply_schema, connect_database};
pub use payment_gateway::HttpPaymentGateway;
pub use redis_bus::{NOTIFICATIONS_CHANNEL, RedisBus, SETTLEMENT_EVENTS_CHANNEL};
pub use sinks::{RedisNotificationSink, RedisStatusSink};
