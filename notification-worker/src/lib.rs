//! Notifier - RabbitMQ notification worker.
//!
//! This library holds the pieces wired together by the `notification-worker`
//! binary:
//! - `broker`: RabbitMQ connection, queue declaration and subscriptions
//! - `dispatch`: queue-to-handler registry and per-queue dispatch loops
//! - `handler`: the handler contract
//! - `email`: email delivery capability
//! - `handlers`: concrete notification handlers
//!
//! ## Architecture
//!
//! ```text
//! RabbitMQ queue → DeliveryStream → dispatch loop → MessageHandler → EmailSender
//! ```
//!
//! Deliveries are acknowledged on receipt, so a failed handler drops the
//! message rather than requeueing it.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod email;
pub mod handler;
pub mod handlers;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod log_capture;

// Re-export commonly used types
pub use broker::{AmqpConnection, Broker, BrokerError, Delivery, DeliveryStream};
pub use config::{Config, SmtpConfig};
pub use dispatch::{run_dispatch_loop, Dispatcher};
pub use email::{EmailError, EmailSender, SmtpEmailSender};
pub use handler::{handler_fn, MessageHandler};
pub use handlers::{UserVerificationEmailHandler, USER_VERIFICATION_QUEUE};
