use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 入站消息的判别标签。未知标签保留原文，交给路由层记录后丢弃。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Alert,
    AlertUpdate,
    AlertClear,
    MetricsUpdate,
    Ping,
    Unknown(String),
}

impl MessageKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ALERT" => Self::Alert,
            "ALERT_UPDATE" => Self::AlertUpdate,
            "ALERT_CLEAR" => Self::AlertClear,
            "METRICS_UPDATE" => Self::MetricsUpdate,
            "PING" => Self::Ping,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Alert => "ALERT",
            Self::AlertUpdate => "ALERT_UPDATE",
            Self::AlertClear => "ALERT_CLEAR",
            Self::MetricsUpdate => "METRICS_UPDATE",
            Self::Ping => "PING",
            Self::Unknown(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: MessageKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// 按目标结构解析 payload，失败时带上消息类型。
    pub fn decode_payload<T>(&self) -> Result<T, ProtocolError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_value(self.payload.clone()).map_err(|source| ProtocolError::Payload {
            kind: self.kind.to_string(),
            source,
        })
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    Subscribe { channels: Vec<String> },
    Pong,
}

impl OutboundMessage {
    pub fn subscribe<I, S>(channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Subscribe {
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),
}

pub fn parse_frame(text: &str) -> Result<Envelope, ProtocolError> {
    serde_json::from_str::<Envelope>(text).map_err(ProtocolError::Malformed)
}
