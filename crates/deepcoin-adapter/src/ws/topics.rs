/*
[INPUT]:  Typed subscription intents and raw inbound WebSocket text
[OUTPUT]: Outbound wire messages and decoded PushMessage values
[POS]:    WebSocket layer - stateless topic codec
[UPDATE]: When adding topics or changing the wire format
*/

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DeepcoinError, Result};
use crate::types::{KlinePeriod, PushAction, TopicId, TopicKey};

/// Discriminator for outbound requests that are not plain subscribes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WireAction {
    Unsubscribe,
    UnsubscribeAll,
}

/// One outbound request frame.
///
/// A subscribe carries no `action`; unsubscribe-all carries only `action`
/// and `localNo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<WireAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<TopicId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<KlinePeriod>,
    pub local_no: u64,
}

impl WireMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A validated subscription intent, not yet tagged with a correlation number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub topic: TopicId,
    pub symbol: String,
    pub period: Option<KlinePeriod>,
}

impl SubscriptionRequest {
    pub fn new(topic: TopicId, symbol: &str, period: Option<&str>) -> Result<Self> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(DeepcoinError::InvalidArgument(
                "symbol must not be empty".to_string(),
            ));
        }

        let period = match (topic.requires_period(), period) {
            (true, Some(raw)) => Some(raw.parse::<KlinePeriod>()?),
            (true, None) => {
                return Err(DeepcoinError::InvalidArgument(format!(
                    "topic {topic} requires a kline period"
                )));
            }
            (false, Some(raw)) => {
                return Err(DeepcoinError::InvalidArgument(format!(
                    "topic {topic} does not take a period (got {raw:?})"
                )));
            }
            (false, None) => None,
        };

        Ok(Self {
            topic,
            symbol: symbol.to_string(),
            period,
        })
    }

    pub fn subscribe(&self, local_no: u64) -> WireMessage {
        self.to_wire(None, local_no)
    }

    pub fn unsubscribe(&self, local_no: u64) -> WireMessage {
        self.to_wire(Some(WireAction::Unsubscribe), local_no)
    }

    fn to_wire(&self, action: Option<WireAction>, local_no: u64) -> WireMessage {
        WireMessage {
            action,
            topic_id: Some(self.topic),
            symbol: Some(self.symbol.clone()),
            period: self.period,
            local_no,
        }
    }
}

pub fn encode_subscribe(
    topic: TopicId,
    symbol: &str,
    period: Option<&str>,
    local_no: u64,
) -> Result<WireMessage> {
    Ok(SubscriptionRequest::new(topic, symbol, period)?.subscribe(local_no))
}

pub fn encode_unsubscribe(
    topic: TopicId,
    symbol: &str,
    local_no: u64,
    period: Option<&str>,
) -> Result<WireMessage> {
    Ok(SubscriptionRequest::new(topic, symbol, period)?.unsubscribe(local_no))
}

pub fn encode_unsubscribe_all(local_no: u64) -> WireMessage {
    WireMessage {
        action: Some(WireAction::UnsubscribeAll),
        topic_id: None,
        symbol: None,
        period: None,
        local_no,
    }
}

/// A decoded inbound event, as handed to consumer callbacks.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub topic: TopicKey,
    /// The frame's `result` or `data` body, or the whole object when it has neither
    pub payload: Value,
}

/// Decode one inbound text frame.
///
/// Unknown but well-formed discriminators come back as `TopicId::Other` or
/// `PushAction::Other` so the dispatcher can decide nobody wants them.
pub fn decode(raw: &str) -> Result<PushMessage> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| DeepcoinError::Decode(err.to_string()))?;
    let Value::Object(mut object) = value else {
        return Err(DeepcoinError::Decode(
            "frame is not a JSON object".to_string(),
        ));
    };

    let topic = discriminator(&object)?;
    let payload = match object.remove("result") {
        Some(body) => body,
        None => match object.remove("data") {
            Some(body) => body,
            None => Value::Object(object),
        },
    };

    Ok(PushMessage { topic, payload })
}

fn discriminator(object: &Map<String, Value>) -> Result<TopicKey> {
    if let Some(raw) = object.get("topicId") {
        let code = match raw {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse::<u64>().ok(),
            _ => None,
        }
        .and_then(|code| u32::try_from(code).ok())
        .ok_or_else(|| DeepcoinError::Decode(format!("topicId is not a topic code: {raw}")))?;
        return Ok(TopicKey::Topic(TopicId::from_code(code)));
    }

    if let Some(raw) = object.get("action") {
        let name = raw
            .as_str()
            .ok_or_else(|| DeepcoinError::Decode(format!("action is not a string: {raw}")))?;
        if let Some(topic) = TopicId::from_push_action(name) {
            return Ok(TopicKey::Topic(topic));
        }
        return Ok(TopicKey::Action(PushAction::from_name(name)));
    }

    Err(DeepcoinError::Decode(
        "missing topicId or action discriminator".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_value(message: &WireMessage) -> Value {
        serde_json::from_str(&message.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_encode_subscribe_orderbook() {
        let message = encode_subscribe(TopicId::Orderbook25, "BTCUSDT", None, 1001).unwrap();
        assert_eq!(
            as_value(&message),
            json!({"topicId": 25, "symbol": "BTCUSDT", "localNo": 1001})
        );
    }

    #[test]
    fn test_encode_subscribe_kline_carries_period() {
        let message = encode_subscribe(TopicId::Kline, "ETHUSDT", Some("4H"), 1002).unwrap();
        assert_eq!(
            as_value(&message),
            json!({"topicId": 11, "symbol": "ETHUSDT", "period": "4H", "localNo": 1002})
        );
    }

    #[test]
    fn test_encode_subscribe_rejects_bad_arguments() {
        let cases = [
            encode_subscribe(TopicId::Kline, "BTCUSDT", Some("2m"), 1),
            encode_subscribe(TopicId::Kline, "BTCUSDT", None, 1),
            encode_subscribe(TopicId::Orderbook25, "   ", None, 1),
            encode_subscribe(TopicId::LastTransactions, "BTCUSDT", Some("1m"), 1),
        ];
        for result in cases {
            assert!(matches!(result, Err(DeepcoinError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_encode_unsubscribe_has_discriminator() {
        let message = encode_unsubscribe(TopicId::Kline, "BTCUSDT", 1005, Some("1m")).unwrap();
        assert_eq!(
            as_value(&message),
            json!({
                "action": "unsubscribe",
                "topicId": 11,
                "symbol": "BTCUSDT",
                "period": "1m",
                "localNo": 1005
            })
        );
    }

    #[test]
    fn test_encode_unsubscribe_all_omits_topic_and_symbol() {
        let message = encode_unsubscribe_all(1010);
        assert_eq!(
            as_value(&message),
            json!({"action": "unsubscribeAll", "localNo": 1010})
        );
    }

    #[test]
    fn test_decode_numeric_topic() {
        let message = decode(r#"{"topicId":25,"result":{"bids":[["100.5","2"]]}}"#).unwrap();
        assert_eq!(message.topic, TopicKey::Topic(TopicId::Orderbook25));
        assert_eq!(message.payload, json!({"bids": [["100.5", "2"]]}));
    }

    #[test]
    fn test_decode_string_topic_code() {
        let message = decode(r#"{"topicId":"7","data":[1,2]}"#).unwrap();
        assert_eq!(message.topic, TopicKey::Topic(TopicId::LatestMarketData));
        assert_eq!(message.payload, json!([1, 2]));
    }

    #[test]
    fn test_decode_private_action() {
        let message = decode(r#"{"action":"PushPosition","result":[{"I":"BTCUSDT"}]}"#).unwrap();
        assert_eq!(message.topic, TopicKey::Action(PushAction::Position));
        assert_eq!(message.payload, json!([{"I": "BTCUSDT"}]));
    }

    #[test]
    fn test_decode_public_action_name_maps_to_topic() {
        let message = decode(r#"{"action":"PushKLine","result":[]}"#).unwrap();
        assert_eq!(message.topic, TopicKey::Topic(TopicId::Kline));
    }

    #[test]
    fn test_decode_unknown_discriminators_are_not_errors() {
        let topic = decode(r#"{"topicId":404,"result":null}"#).unwrap();
        assert_eq!(topic.topic, TopicKey::Topic(TopicId::Other(404)));

        let action = decode(r#"{"action":"PushNews"}"#).unwrap();
        assert_eq!(
            action.topic,
            TopicKey::Action(PushAction::Other("PushNews".to_string()))
        );
        assert_eq!(action.payload, json!({"action": "PushNews"}));
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        for raw in [
            "not json",
            "[1,2,3]",
            r#"{"result":[]}"#,
            r#"{"topicId":true}"#,
            r#"{"topicId":-3}"#,
            r#"{"action":12}"#,
        ] {
            assert!(
                matches!(decode(raw), Err(DeepcoinError::Decode(_))),
                "expected decode error for {raw}"
            );
        }
    }
}
