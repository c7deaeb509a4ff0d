/*
[INPUT]:  Deepcoin push topic codes, action names and kline periods
[OUTPUT]: Typed topic identifiers and the dispatch key union
[POS]:    Data layer - routing keys shared by codec, dispatcher and manager
[UPDATE]: When Deepcoin adds topics, push actions or kline periods
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::DeepcoinError;

/// Public topic code carried in `topicId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicId {
    LastTransactions,
    LatestMarketData,
    Kline,
    Orderbook25,
    /// Well-formed code this crate has no name for
    Other(u32),
}

impl TopicId {
    pub fn code(self) -> u32 {
        match self {
            TopicId::LastTransactions => 2,
            TopicId::LatestMarketData => 7,
            TopicId::Kline => 11,
            TopicId::Orderbook25 => 25,
            TopicId::Other(code) => code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            2 => TopicId::LastTransactions,
            7 => TopicId::LatestMarketData,
            11 => TopicId::Kline,
            25 => TopicId::Orderbook25,
            other => TopicId::Other(other),
        }
    }

    /// Only kline subscriptions carry a period.
    pub fn requires_period(self) -> bool {
        matches!(self, TopicId::Kline)
    }

    /// Named push actions the public streams use for these topics.
    pub(crate) fn from_push_action(name: &str) -> Option<Self> {
        match name {
            "PushMarketTrade" => Some(TopicId::LastTransactions),
            "PushMarketDataOverView" => Some(TopicId::LatestMarketData),
            "PushKLine" => Some(TopicId::Kline),
            "PushMarketOrder" => Some(TopicId::Orderbook25),
            _ => None,
        }
    }
}

impl From<u32> for TopicId {
    fn from(code: u32) -> Self {
        TopicId::from_code(code)
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for TopicId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.code())
    }
}

/// Named push action, used by the private stream and for subscription acks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PushAction {
    Order,
    Account,
    Position,
    Trade,
    AccountDetail,
    TriggerOrder,
    /// `RecvTopicAction`, the server's reply to a subscribe/unsubscribe
    TopicAck,
    Other(String),
}

impl PushAction {
    pub fn as_str(&self) -> &str {
        match self {
            PushAction::Order => "PushOrder",
            PushAction::Account => "PushAccount",
            PushAction::Position => "PushPosition",
            PushAction::Trade => "PushTrade",
            PushAction::AccountDetail => "PushAccountDetail",
            PushAction::TriggerOrder => "PushTriggerOrder",
            PushAction::TopicAck => "RecvTopicAction",
            PushAction::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "PushOrder" => PushAction::Order,
            "PushAccount" => PushAction::Account,
            "PushPosition" => PushAction::Position,
            "PushTrade" => PushAction::Trade,
            "PushAccountDetail" => PushAction::AccountDetail,
            "PushTriggerOrder" => PushAction::TriggerOrder,
            "RecvTopicAction" => PushAction::TopicAck,
            other => PushAction::Other(other.to_string()),
        }
    }
}

impl fmt::Display for PushAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch key: public topic codes and named actions are disjoint spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TopicKey {
    Topic(TopicId),
    Action(PushAction),
}

impl TopicKey {
    /// The key inbound frames decode to, so `Other(25)` and
    /// `Other("PushOrder")` land on the named variants.
    pub fn canonical(self) -> Self {
        match self {
            TopicKey::Topic(topic) => TopicKey::Topic(TopicId::from_code(topic.code())),
            TopicKey::Action(PushAction::Other(name)) => match TopicId::from_push_action(&name) {
                Some(topic) => TopicKey::Topic(topic),
                None => TopicKey::Action(PushAction::from_name(&name)),
            },
            key @ TopicKey::Action(_) => key,
        }
    }
}

impl From<TopicId> for TopicKey {
    fn from(topic: TopicId) -> Self {
        TopicKey::Topic(topic).canonical()
    }
}

impl From<PushAction> for TopicKey {
    fn from(action: PushAction) -> Self {
        TopicKey::Action(action).canonical()
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicKey::Topic(topic) => write!(f, "topic:{topic}"),
            TopicKey::Action(action) => write!(f, "action:{action}"),
        }
    }
}

/// Kline bar period accepted by the kline topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlinePeriod {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "4H")]
    FourHours,
    #[serde(rename = "12H")]
    TwelveHours,
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "1Y")]
    OneYear,
}

impl KlinePeriod {
    pub const ALL: [KlinePeriod; 11] = [
        KlinePeriod::OneMinute,
        KlinePeriod::FiveMinutes,
        KlinePeriod::FifteenMinutes,
        KlinePeriod::ThirtyMinutes,
        KlinePeriod::OneHour,
        KlinePeriod::FourHours,
        KlinePeriod::TwelveHours,
        KlinePeriod::OneDay,
        KlinePeriod::OneWeek,
        KlinePeriod::OneMonth,
        KlinePeriod::OneYear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            KlinePeriod::OneMinute => "1m",
            KlinePeriod::FiveMinutes => "5m",
            KlinePeriod::FifteenMinutes => "15m",
            KlinePeriod::ThirtyMinutes => "30m",
            KlinePeriod::OneHour => "1H",
            KlinePeriod::FourHours => "4H",
            KlinePeriod::TwelveHours => "12H",
            KlinePeriod::OneDay => "1D",
            KlinePeriod::OneWeek => "1W",
            KlinePeriod::OneMonth => "1M",
            KlinePeriod::OneYear => "1Y",
        }
    }
}

impl FromStr for KlinePeriod {
    type Err = DeepcoinError;

    // Case matters: "1m" is a minute, "1M" a month.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        KlinePeriod::ALL
            .into_iter()
            .find(|period| period.as_str() == value)
            .ok_or_else(|| {
                let allowed: Vec<&str> = KlinePeriod::ALL.iter().map(|p| p.as_str()).collect();
                DeepcoinError::InvalidArgument(format!(
                    "unsupported kline period {value:?}, expected one of {}",
                    allowed.join(",")
                ))
            })
    }
}

impl fmt::Display for KlinePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1m", KlinePeriod::OneMinute)]
    #[case("15m", KlinePeriod::FifteenMinutes)]
    #[case("12H", KlinePeriod::TwelveHours)]
    #[case("1M", KlinePeriod::OneMonth)]
    #[case("1Y", KlinePeriod::OneYear)]
    fn test_kline_period_parses(#[case] raw: &str, #[case] expected: KlinePeriod) {
        assert_eq!(raw.parse::<KlinePeriod>().unwrap(), expected);
    }

    #[rstest]
    #[case("2m")]
    #[case("1h")]
    #[case("")]
    #[case(" 1m")]
    fn test_kline_period_rejects(#[case] raw: &str) {
        let err = raw.parse::<KlinePeriod>().unwrap_err();
        assert!(matches!(err, DeepcoinError::InvalidArgument(_)));
    }

    #[test]
    fn test_topic_id_unknown_code_is_preserved() {
        assert_eq!(TopicId::from_code(25), TopicId::Orderbook25);
        assert_eq!(TopicId::from_code(99), TopicId::Other(99));
        assert_eq!(TopicId::Other(99).code(), 99);
    }

    #[test]
    fn test_topic_id_serializes_as_number() {
        let value = serde_json::to_value(TopicId::Kline).unwrap();
        assert_eq!(value, serde_json::json!(11));
    }

    #[test]
    fn test_public_push_actions_fold_into_topics() {
        assert_eq!(
            TopicId::from_push_action("PushMarketOrder"),
            Some(TopicId::Orderbook25)
        );
        assert_eq!(TopicId::from_push_action("PushOrder"), None);
    }

    #[test]
    fn test_push_action_names() {
        assert_eq!(PushAction::from_name("PushAccountDetail"), PushAction::AccountDetail);
        assert_eq!(PushAction::TriggerOrder.as_str(), "PushTriggerOrder");
        assert_eq!(
            PushAction::from_name("PushSomethingNew"),
            PushAction::Other("PushSomethingNew".to_string())
        );
    }

    #[test]
    fn test_topic_key_spaces_are_disjoint() {
        let public: TopicKey = TopicId::LastTransactions.into();
        let private: TopicKey = PushAction::Trade.into();
        assert_ne!(public, private);
        assert_eq!(public.to_string(), "topic:2");
        assert_eq!(private.to_string(), "action:PushTrade");
    }

    #[rstest]
    #[case(TopicKey::Topic(TopicId::Other(25)), TopicKey::Topic(TopicId::Orderbook25))]
    #[case(TopicKey::Topic(TopicId::Other(99)), TopicKey::Topic(TopicId::Other(99)))]
    #[case(
        TopicKey::Action(PushAction::Other("PushOrder".into())),
        TopicKey::Action(PushAction::Order)
    )]
    #[case(
        TopicKey::Action(PushAction::Other("PushKLine".into())),
        TopicKey::Topic(TopicId::Kline)
    )]
    fn test_topic_key_canonical_matches_decoded_keys(#[case] raw: TopicKey, #[case] expected: TopicKey) {
        assert_eq!(raw.canonical(), expected);
    }

    #[test]
    fn test_topic_key_from_unnamed_code_is_canonical() {
        let key: TopicKey = TopicId::Other(7).into();
        assert_eq!(key, TopicKey::Topic(TopicId::LatestMarketData));
    }
}
