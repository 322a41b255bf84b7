//! Webhook payload sent by the LINE platform.
//!
//! Only the fields the assistant acts on are modelled; anything else in the
//! payload is ignored so new platform fields never break parsing.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// Bot user ID the events were sent to
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    /// Stable across redeliveries of the same event
    #[serde(default)]
    pub webhook_event_id: Option<String>,
    #[serde(default)]
    pub reply_token: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub source: Option<EventSource>,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub delivery_context: Option<DeliveryContext>,
}

impl Event {
    /// Sender's user ID, when the event came from a user
    pub fn user_id(&self) -> Option<&str> {
        self.source.as_ref()?.user_id.as_deref()
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_context
            .as_ref()
            .is_some_and(|c| c.is_redelivery)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryContext {
    #[serde(default)]
    pub is_redelivery: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Text {
        id: String,
        text: String,
    },
    Image {
        id: String,
    },
    Audio {
        id: String,
        #[serde(default)]
        duration: Option<u64>,
    },
    /// Stickers, video, location and other kinds the assistant ignores
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_message_event() {
        let body = r#"{
            "destination": "Ubot",
            "events": [{
                "type": "message",
                "mode": "active",
                "timestamp": 1705300000000,
                "webhookEventId": "01HXYZ",
                "deliveryContext": {"isRedelivery": false},
                "replyToken": "token",
                "source": {"type": "user", "userId": "U123"},
                "message": {"type": "text", "id": "468789577898262530", "text": "タクシー3200円", "quoteToken": "q"}
            }]
        }"#;
        let payload: WebhookPayload = serde_json::from_str(body).unwrap();
        let event = &payload.events[0];
        assert_eq!(event.kind, "message");
        assert_eq!(event.user_id(), Some("U123"));
        assert_eq!(event.webhook_event_id.as_deref(), Some("01HXYZ"));
        assert!(!event.is_redelivery());
        assert_eq!(
            event.message,
            Some(Message::Text {
                id: "468789577898262530".to_string(),
                text: "タクシー3200円".to_string()
            })
        );
    }

    #[test]
    fn test_parse_media_and_unknown_messages() {
        let body = r#"{"events": [
            {"type": "message", "source": {"type": "user", "userId": "U1"},
             "message": {"type": "image", "id": "1", "contentProvider": {"type": "line"}}},
            {"type": "message", "source": {"type": "user", "userId": "U1"},
             "message": {"type": "audio", "id": "2", "duration": 60000}},
            {"type": "message", "source": {"type": "user", "userId": "U1"},
             "message": {"type": "sticker", "id": "3", "packageId": "1", "stickerId": "1"}},
            {"type": "follow", "source": {"type": "user", "userId": "U2"}}
        ]}"#;
        let payload: WebhookPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.events.len(), 4);
        assert_eq!(payload.events[0].message, Some(Message::Image { id: "1".to_string() }));
        assert_eq!(
            payload.events[1].message,
            Some(Message::Audio {
                id: "2".to_string(),
                duration: Some(60000)
            })
        );
        assert_eq!(payload.events[2].message, Some(Message::Other));
        assert_eq!(payload.events[3].kind, "follow");
        assert!(payload.events[3].message.is_none());
    }

    #[test]
    fn test_verification_payload_has_no_events() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"destination": "Ubot", "events": []}"#).unwrap();
        assert!(payload.events.is_empty());
    }
}
