//! # Replies
//!
//! Defaults applied to messages sent in response to the message being
//! processed.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{ConsumerError, ConsumerResult};
use crate::messaging::{Message, Properties};

/// Optional overrides for [`MessageContext::reply`](crate::context::MessageContext::reply)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyOptions {
    /// Exchange to reply on; defaults to the inbound exchange
    pub exchange: Option<String>,
    /// Routing key to reply to; defaults to the inbound `reply_to`
    pub reply_to: Option<String>,
    /// Connection to publish on; defaults to the delivering connection
    pub connection: Option<String>,
}

impl ReplyOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

/// Where a reply goes: `(exchange, routing_key)`
pub fn reply_target(message: &Message, options: &ReplyOptions) -> ConsumerResult<(String, String)> {
    let routing_key = options
        .reply_to
        .clone()
        .or_else(|| message.properties.reply_to.clone())
        .filter(|key| !key.is_empty())
        .ok_or_else(|| ConsumerError::invalid_input("Missing reply_to routing key"))?;
    let exchange = options
        .exchange
        .clone()
        .unwrap_or_else(|| message.exchange.clone());
    Ok((exchange, routing_key))
}

/// Fill in `app_id`, `correlation_id`, `message_id` and `timestamp` when
/// the caller left them unset
pub fn reply_properties(mut properties: Properties, app_id: &str, inbound: &Message) -> Properties {
    if properties.app_id.as_deref().map_or(true, str::is_empty) {
        properties.app_id = Some(app_id.to_string());
    }
    if properties.correlation_id.is_none() {
        properties.correlation_id = inbound.properties.message_id.clone();
    }
    if properties.message_id.is_none() {
        properties.message_id = Some(Uuid::new_v4().to_string());
    }
    if properties.timestamp.is_none() {
        properties.timestamp = Some(Utc::now());
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn inbound(reply_to: Option<&str>) -> Message {
        let mut properties = Properties::new().with_message_id("request-1");
        properties.reply_to = reply_to.map(str::to_string);
        Message::new("default", 1, "rpc", "compute", b"{}".to_vec()).with_properties(properties)
    }

    #[test]
    fn test_target_prefers_explicit_reply_to() {
        let message = inbound(Some("inbound.reply"));
        let (exchange, key) =
            reply_target(&message, &ReplyOptions::new().reply_to("explicit")).unwrap();
        assert_eq!(exchange, "rpc");
        assert_eq!(key, "explicit");

        let (_, key) = reply_target(&message, &ReplyOptions::new()).unwrap();
        assert_eq!(key, "inbound.reply");
    }

    #[test]
    fn test_target_requires_reply_to() {
        let err = reply_target(&inbound(None), &ReplyOptions::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_reply_property_defaults() {
        let properties = reply_properties(Properties::new(), "calculator", &inbound(None));
        assert_eq!(properties.app_id.as_deref(), Some("calculator"));
        assert_eq!(properties.correlation_id.as_deref(), Some("request-1"));
        assert!(properties.message_id.is_some());
        assert!(properties.timestamp.is_some());
    }

    #[test]
    fn test_reply_properties_keep_caller_values() {
        let properties = Properties::new()
            .with_correlation_id("mine")
            .with_message_id("reply-1");
        let properties = reply_properties(properties, "calculator", &inbound(None));
        assert_eq!(properties.correlation_id.as_deref(), Some("mine"));
        assert_eq!(properties.message_id.as_deref(), Some("reply-1"));
    }
}
