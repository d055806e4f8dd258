//! RIS Live wire messages.
//!
//! See <https://ris-live.ripe.net/manual/> for the protocol. Only the subset used by the
//! experiments is modelled: the `ris_subscribe` request and `ris_message` UPDATE payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{FeedError, FeedResult};

/// Filter sent in a `ris_subscribe` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RisSubscription {
    /// Route collector, e.g. `rrc00` (Amsterdam).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// BGP message type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Only deliver messages containing this section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require: Option<String>,
    /// Also match more specific prefixes.
    pub more_specific: bool,
}

impl Default for RisSubscription {
    fn default() -> Self {
        Self {
            host: Some("rrc00".to_string()),
            message_type: Some("UPDATE".to_string()),
            require: Some("announcements".to_string()),
            more_specific: true,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum ClientMessage<'a> {
    RisSubscribe(&'a RisSubscription),
}

impl RisSubscription {
    /// Encodes the `ris_subscribe` request frame.
    pub fn to_request(&self) -> FeedResult<String> {
        Ok(serde_json::to_string(&ClientMessage::RisSubscribe(self))?)
    }
}

/// One element of an AS path: a single ASN or an unordered `AS_SET`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A single autonomous system.
    Asn(u32),
    /// An aggregated `AS_SET`.
    Set(Vec<u32>),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asn(asn) => write!(f, "{asn}"),
            Self::Set(set) => {
                for (i, asn) in set.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{asn}")?;
                }
                Ok(())
            }
        }
    }
}

/// Prefixes announced via one next hop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Next hop address.
    pub next_hop: String,
    /// Announced prefixes.
    #[serde(default)]
    pub prefixes: Vec<String>,
}

/// A BGP UPDATE as seen by a RIS collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpUpdate {
    /// Collector timestamp in fractional UNIX seconds.
    pub timestamp: f64,
    /// Address of the peer that sent the update.
    pub peer: String,
    /// ASN of that peer.
    #[serde(default)]
    pub peer_asn: Option<String>,
    /// Collector that observed the update.
    #[serde(default)]
    pub host: Option<String>,
    /// AS path, nearest AS first.
    #[serde(default)]
    pub path: Vec<PathSegment>,
    /// Announced routes.
    #[serde(default)]
    pub announcements: Vec<Announcement>,
    /// Withdrawn prefixes.
    #[serde(default)]
    pub withdrawals: Vec<String>,
}

impl BgpUpdate {
    /// Total number of announced prefixes.
    pub fn announced_prefixes(&self) -> usize {
        self.announcements.iter().map(|a| a.prefixes.len()).sum()
    }
}

/// A decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum RisMessage {
    /// A `ris_message` carrying a BGP update.
    Update(Box<BgpUpdate>),
    /// A `ris_error` with its message.
    Error(String),
    /// Any other message type, e.g. `ris_rrc_list` or `pong`.
    Other(String),
}

impl RisMessage {
    /// Decodes one text frame.
    pub fn parse(text: &str) -> FeedResult<Self> {
        let v: serde_json::Value = serde_json::from_str(text)?;
        let kind = v.get("type").and_then(|t| t.as_str()).unwrap_or_default();

        match kind {
            "ris_message" => {
                let data = v
                    .get("data")
                    .cloned()
                    .ok_or_else(|| FeedError::Server("ris_message without data".to_string()))?;
                Ok(Self::Update(Box::new(serde_json::from_value(data)?)))
            }
            "ris_error" => {
                let message = v
                    .get("data")
                    .and_then(|d| d.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error");
                Ok(Self::Error(message.to_string()))
            }
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const UPDATE: &str = r#"{
        "type": "ris_message",
        "data": {
            "timestamp": 1700000000.12,
            "peer": "192.0.2.1",
            "peer_asn": "3333",
            "id": "x",
            "host": "rrc00",
            "type": "UPDATE",
            "path": [3333, 1103, [64512, 64513]],
            "announcements": [
                { "next_hop": "192.0.2.1", "prefixes": ["203.0.113.0/24", "198.51.100.0/24"] }
            ]
        }
    }"#;

    #[test]
    fn default_subscription_request() {
        let request = RisSubscription::default().to_request().unwrap();
        let v: serde_json::Value = serde_json::from_str(&request).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "type": "ris_subscribe",
                "data": {
                    "host": "rrc00",
                    "type": "UPDATE",
                    "require": "announcements",
                    "moreSpecific": true
                }
            })
        );
    }

    #[test]
    fn decodes_update_with_as_set() {
        let RisMessage::Update(update) = RisMessage::parse(UPDATE).unwrap() else {
            panic!("expected update");
        };
        assert_eq!(update.peer, "192.0.2.1");
        assert_eq!(update.host.as_deref(), Some("rrc00"));
        assert_eq!(
            update.path,
            vec![PathSegment::Asn(3333), PathSegment::Asn(1103), PathSegment::Set(vec![64512, 64513])]
        );
        assert_eq!(update.path[2].to_string(), "64512,64513");
        assert_eq!(update.announced_prefixes(), 2);
        assert!(update.withdrawals.is_empty());
    }

    #[rstest]
    #[case::pong(r#"{"type":"pong","data":null}"#, "pong")]
    #[case::rrc_list(r#"{"type":"ris_rrc_list","data":["rrc00"]}"#, "ris_rrc_list")]
    #[case::untyped(r#"{"data":{}}"#, "")]
    fn ignores_other_messages(#[case] text: &str, #[case] kind: &str) {
        assert_eq!(RisMessage::parse(text).unwrap(), RisMessage::Other(kind.to_string()));
    }

    #[test]
    fn surfaces_server_errors() {
        let msg = RisMessage::parse(r#"{"type":"ris_error","data":{"message":"bad host"}}"#);
        assert_eq!(msg.unwrap(), RisMessage::Error("bad host".to_string()));
    }

    #[rstest]
    #[case::not_json("not json")]
    #[case::missing_peer(r#"{"type":"ris_message","data":{"timestamp":1.0}}"#)]
    #[case::missing_data(r#"{"type":"ris_message"}"#)]
    fn rejects_malformed_updates(#[case] text: &str) {
        assert!(RisMessage::parse(text).is_err());
    }
}
