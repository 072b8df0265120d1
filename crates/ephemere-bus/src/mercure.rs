//! Mercure-compatible HTTP hub publisher.
//!
//! Publishes one form-encoded POST per event, authorized by a short
//! HS256-signed JWT granting publish capability for exactly the target
//! topic. The hub handles fan-out and SSE delivery to subscribers; this
//! side only ever publishes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use ephemere_shared::derive::base64_url_encode;
use ephemere_shared::RoomEvent;

use crate::BusError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct MercureBus {
    hub_url: String,
    jwt_key: String,
    http: reqwest::Client,
}

impl MercureBus {
    pub fn new(hub_url: String, jwt_key: String) -> Self {
        Self {
            hub_url,
            jwt_key,
            http: reqwest::Client::new(),
        }
    }

    /// Publish an event to its room topic on the hub.
    pub async fn publish(&self, event: &RoomEvent) -> Result<(), BusError> {
        let topic = format!(
            "{}{}",
            ephemere_shared::constants::TOPIC_PREFIX,
            event.room_hash
        );
        let jwt = publisher_jwt(&topic, &self.jwt_key);
        let data = serde_json::to_string(event)?;

        let response = self
            .http
            .post(&self.hub_url)
            .bearer_auth(jwt)
            .form(&[
                ("topic", topic.as_str()),
                ("data", data.as_str()),
                ("type", event.kind()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BusError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Build the minimal capability token the hub expects:
/// `{"mercure": {"publish": [topic]}}`, HS256-signed.
fn publisher_jwt(topic: &str, key: &str) -> String {
    let header = base64_url_encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({ "mercure": { "publish": [topic] } });
    // Serializing a literal json! value cannot fail.
    let payload =
        base64_url_encode(serde_json::to_string(&claims).unwrap_or_default().as_bytes());

    let signing_input = format!("{header}.{payload}");
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("hmac accepts any key size");
    mac.update(signing_input.as_bytes());
    let signature = base64_url_encode(&mac.finalize().into_bytes());

    format!("{signing_input}.{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_has_three_segments() {
        let jwt = publisher_jwt("room:abc", "!ChangeMe!");
        let parts: Vec<_> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        // Header decodes to the fixed HS256 header.
        let header = ephemere_shared::derive::base64_url_decode(parts[0]).unwrap();
        assert_eq!(header, br#"{"alg":"HS256","typ":"JWT"}"#);

        // Claims carry the publish capability for exactly our topic.
        let claims = ephemere_shared::derive::base64_url_decode(parts[1]).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&claims).unwrap();
        assert_eq!(claims["mercure"]["publish"][0], "room:abc");
    }

    #[test]
    fn jwt_is_deterministic_per_key_and_topic() {
        assert_eq!(publisher_jwt("room:a", "k"), publisher_jwt("room:a", "k"));
        assert_ne!(publisher_jwt("room:a", "k"), publisher_jwt("room:b", "k"));
        assert_ne!(publisher_jwt("room:a", "k1"), publisher_jwt("room:a", "k2"));
    }
}
