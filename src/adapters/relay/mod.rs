//! Event relay adapter - durable in-process broker plus its consumer.

mod broker;
mod consumer;

pub use broker::{
    BrokerConfig, DeadLetter, Delivery, EventBroker, ReconnectPolicy, RelayStats,
};
pub use consumer::{DashboardEventHandler, RelayConsumer};
