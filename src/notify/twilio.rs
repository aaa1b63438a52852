use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{escape_xml, NotificationReceipt, Notifier};
use crate::config::TwilioCredentials;
use crate::error::AppError;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Places a voice call that reads the notification out loud.
pub struct TwilioNotifier {
    http: reqwest::Client,
    api_base_url: String,
    voice: String,
    credentials: TwilioCredentials,
}

#[derive(Debug, Deserialize)]
struct TwilioCallResponse {
    sid: String,
    status: String,
}

impl TwilioNotifier {
    pub fn new(
        api_base_url: &str,
        voice: &str,
        credentials: TwilioCredentials,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            voice: voice.to_string(),
            credentials,
        })
    }

    pub fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.api_base_url, self.credentials.account_sid
        )
    }

    pub fn twiml(&self, message: &str) -> String {
        format!(
            "<Response><Say voice=\"{}\">{}</Say></Response>",
            escape_xml(&self.voice),
            escape_xml(message)
        )
    }

    fn compact_error_body(body: &str) -> String {
        let normalized = body.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.chars().count() > 180 {
            format!("{}...", normalized.chars().take(180).collect::<String>())
        } else {
            normalized
        }
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send_notification(&self, message: &str) -> Result<NotificationReceipt, AppError> {
        let twiml = self.twiml(message);
        let resp = self
            .http
            .post(self.calls_url())
            .basic_auth(
                &self.credentials.account_sid,
                Some(&self.credentials.auth_token),
            )
            .form(&[
                ("To", self.credentials.to_number.as_str()),
                ("From", self.credentials.from_number.as_str()),
                ("Twiml", twiml.as_str()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::NotificationApi {
                status: status.as_u16(),
                msg: Self::compact_error_body(&body),
            });
        }

        let call: TwilioCallResponse = resp.json().await?;
        tracing::info!(call_sid = %call.sid, status = %call.status, "Call initiated");
        Ok(NotificationReceipt {
            identifier: call.sid,
            delivery_status: call.status,
        })
    }
}
