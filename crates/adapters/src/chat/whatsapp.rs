// SPDX-License-Identifier: Apache-2.0

//! WhatsApp chat adapter: Meta Cloud API over HTTPS.
//!
//! The 24-hour customer-service window constraint is enforced by the
//! fanout router, which has access to
//! `AdapterMetadata::last_customer_message_at`; this adapter only
//! knows how to place calls against the Cloud API.

use super::http::HttpTransport;
use super::{ChatAdapter, ChatError, SentMessageId};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use teleclaude_core::session::AdapterKey;

const MAX_MESSAGE_LENGTH: usize = 4096;

type HmacSha256 = Hmac<Sha256>;

pub struct WhatsAppChatAdapter<T: HttpTransport> {
    transport: T,
    phone_number_id: String,
    access_token: String,
}

impl<T: HttpTransport> WhatsAppChatAdapter<T> {
    pub fn new(transport: T, phone_number_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            transport,
            phone_number_id: phone_number_id.into(),
            access_token: access_token.into(),
        }
    }

    fn api_url(&self) -> String {
        format!("https://graph.facebook.com/v20.0/{}/messages", self.phone_number_id)
    }
}

/// Verifies the `X-Hub-Signature-256` header Meta attaches to inbound
/// webhook deliveries, using the app secret as the HMAC key.
pub fn verify_webhook_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[async_trait]
impl<T: HttpTransport> ChatAdapter for WhatsAppChatAdapter<T> {
    fn adapter_key(&self) -> AdapterKey {
        AdapterKey::WhatsApp
    }

    fn max_message_length(&self) -> usize {
        MAX_MESSAGE_LENGTH
    }

    /// WhatsApp has no markup dialect to speak of; strip to plain text
    /// at the engine layer before this is called.
    fn to_platform_markdown(&self, body: &str) -> String {
        body.to_string()
    }

    async fn send_message(&self, channel_id: &str, body: &str) -> Result<SentMessageId, ChatError> {
        let value = self
            .transport
            .post_json(
                &self.api_url(),
                serde_json::json!({
                    "messaging_product": "whatsapp",
                    "to": channel_id,
                    "type": "text",
                    "text": { "body": body },
                }),
            )
            .await?;
        message_id_from_result(&value)
    }

    async fn send_file(
        &self,
        channel_id: &str,
        filename: &str,
        data: &[u8],
    ) -> Result<SentMessageId, ChatError> {
        let value = self
            .transport
            .post_multipart(&self.api_url(), "file", filename, data.to_vec())
            .await?;
        let _ = channel_id;
        message_id_from_result(&value)
    }

    async fn send_voice(&self, channel_id: &str, data: &[u8]) -> Result<SentMessageId, ChatError> {
        self.send_file(channel_id, "voice.ogg", data).await
    }

    async fn edit_message(
        &self,
        _channel_id: &str,
        _message_id: &SentMessageId,
        _body: &str,
    ) -> Result<(), ChatError> {
        // The Cloud API has no message-edit endpoint; callers fall back
        // to sending a follow-up message.
        Err(ChatError::PlatformConstraint(
            "WhatsApp does not support editing sent messages".into(),
        ))
    }

    /// WhatsApp has no channel concept: the phone number IS the channel.
    async fn ensure_channel(&self, session_label: &str) -> Result<String, ChatError> {
        Ok(session_label.to_string())
    }

    async fn update_title(&self, _channel_id: &str, _title: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn close_channel(&self, _channel_id: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn delete_channel(&self, _channel_id: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn typing_indicator(&self, _channel_id: &str) -> Result<(), ChatError> {
        // No typing-indicator endpoint on the Cloud API.
        Ok(())
    }
}

fn message_id_from_result(value: &serde_json::Value) -> Result<SentMessageId, ChatError> {
    value["messages"][0]["id"]
        .as_str()
        .map(|id| SentMessageId(id.to_string()))
        .ok_or_else(|| ChatError::Transient("missing message id in response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let secret = "shh";
        let body = b"{\"hello\":true}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={sig}");

        assert!(verify_webhook_signature(secret, body, &header));
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = "shh";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(b"original");
        let sig = hex::encode(mac.finalize().into_bytes());
        let header = format!("sha256={sig}");

        assert!(!verify_webhook_signature(secret, b"tampered", &header));
    }

    #[test]
    fn missing_prefix_fails_verification() {
        assert!(!verify_webhook_signature("shh", b"body", "not-a-signature"));
    }
}
