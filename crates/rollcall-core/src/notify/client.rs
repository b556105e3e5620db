//! WhatsApp delivery through the Twilio Messages API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{Notifier, NotifyError};
use crate::config::TwilioSettings;
use crate::utils::sanitize_phone;

/// Twilio REST API version segment
const API_VERSION: &str = "2010-04-01";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const WHATSAPP_PREFIX: &str = "whatsapp:";

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct TwilioNotifier {
    client: Client,
    settings: TwilioSettings,
}

impl TwilioNotifier {
    pub fn new(settings: TwilioSettings) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, settings })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/Accounts/{}/Messages.json",
            self.settings.api_base.trim_end_matches('/'),
            API_VERSION,
            self.settings.account_sid
        )
    }

    fn sender(&self) -> String {
        if self.settings.from_number.starts_with(WHATSAPP_PREFIX) {
            self.settings.from_number.clone()
        } else {
            format!("{}{}", WHATSAPP_PREFIX, self.settings.from_number)
        }
    }

    /// WhatsApp recipient address for a raw phone number
    pub fn recipient(contact: &str) -> Result<String, NotifyError> {
        let digits =
            sanitize_phone(contact).ok_or_else(|| NotifyError::InvalidContact(contact.to_string()))?;
        Ok(format!("{}+{}", WHATSAPP_PREFIX, digits))
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, contact: &str, message: &str) -> Result<(), NotifyError> {
        let to = Self::recipient(contact)?;
        let from = self.sender();
        let url = self.messages_url();
        debug!(to = %to, "Sending WhatsApp message");

        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .post(&url)
                .basic_auth(&self.settings.account_sid, Some(&self.settings.auth_token))
                .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", message)])
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body: MessageResponse = response
                    .json()
                    .await
                    .map_err(|e| NotifyError::InvalidResponse(e.to_string()))?;
                info!(to = %to, sid = %body.sid, "WhatsApp message sent");
                return Ok(());
            }

            if status.as_u16() == 429 && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                warn!(retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::from_status(status, &body));
        }
    }
}
