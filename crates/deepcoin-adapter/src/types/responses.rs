/*
[INPUT]:  Deepcoin REST response envelopes
[OUTPUT]: Typed listen-key payloads
[POS]:    Data layer - REST response types needed by the private stream
[UPDATE]: When the listen-key endpoints change shape
*/

use serde::{Deserialize, Serialize};

/// Listen key issued by `/deepcoin/listenkey/acquire` and `/extend`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenKey {
    #[serde(rename = "listenkey")]
    pub listen_key: String,
    /// Expiry as unix seconds
    #[serde(default)]
    pub expire_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_key_deserializes_exchange_field_names() {
        let raw = r#"{"listenkey":"a1b2c3","expire_time":1700003600}"#;
        let key: ListenKey = serde_json::from_str(raw).unwrap();
        assert_eq!(key.listen_key, "a1b2c3");
        assert_eq!(key.expire_time, 1_700_003_600);
    }
}
