//! Guardian notification over a third-party messaging API.
//!
//! `Notifier` is the collaborator seam: `send(contact, message)` with no
//! delivery guarantee. `TwilioNotifier` delivers over WhatsApp; `LogNotifier`
//! only records the message and is used when no credentials are configured.

pub mod client;
pub mod error;

use async_trait::async_trait;
use tracing::info;

pub use client::TwilioNotifier;
pub use error::NotifyError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, contact: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that writes messages to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, contact: &str, message: &str) -> Result<(), NotifyError> {
        info!(contact = contact, message = message, "Notification (not delivered)");
        Ok(())
    }
}
