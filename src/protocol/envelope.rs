//! Wire envelopes exchanged between the page, the relay and the dispatcher.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::RpcError;

/// Context the relay attaches to human-judgment requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub title: String,
    pub origin: String,
    pub intent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
}

impl RequestEnvelope {
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
            context: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl ResponseEnvelope {
    pub fn ok(id: impl Into<String>, method: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, method: impl Into<String>, error: RpcError) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            result: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Capability-change notifications pushed toward pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProviderEvent {
    #[serde(rename_all = "camelCase")]
    Connect {
        #[serde(with = "chain_hex")]
        chain_id: u64,
    },
    Disconnect { error: RpcError },
    #[serde(rename_all = "camelCase")]
    ChainChanged {
        #[serde(with = "chain_hex")]
        chain_id: u64,
    },
    AccountsChanged { accounts: Vec<Address> },
}

impl ProviderEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ProviderEvent::Connect { .. } => EventKind::Connect,
            ProviderEvent::Disconnect { .. } => EventKind::Disconnect,
            ProviderEvent::ChainChanged { .. } => EventKind::ChainChanged,
            ProviderEvent::AccountsChanged { .. } => EventKind::AccountsChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connect,
    Disconnect,
    ChainChanged,
    AccountsChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event: ProviderEvent,
}

/// Frame carried across a relay port, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Envelope {
    Request(RequestEnvelope),
    Response(ResponseEnvelope),
    Event(EventEnvelope),
}

/// Chain ids travel as `0x`-prefixed hex; decimal numbers are accepted on input.
pub mod chain_hex {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(chain_id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:x}", chain_id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse(&value).ok_or_else(|| de::Error::custom(format!("invalid chain id: {}", value)))
    }

    pub fn parse(value: &Value) -> Option<u64> {
        match value {
            Value::String(s) => match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            },
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_carries_type_tag() {
        let envelope = Envelope::Request(RequestEnvelope::new("1", "eth_chainId", json!([])));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "REQUEST");
        assert_eq!(value["id"], "1");
        assert!(value.get("context").is_none());
    }

    #[test]
    fn response_error_shape() {
        let raw = json!({
            "type": "RESPONSE",
            "id": "9",
            "method": "eth_requestAccounts",
            "error": { "code": 4100, "message": "No active account", "data": { "hint": "unlock" } }
        });
        let envelope: Envelope = serde_json::from_value(raw).unwrap();
        let Envelope::Response(response) = envelope else {
            panic!("expected response");
        };
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, 4100);
        assert_eq!(err.hint(), Some("unlock"));
    }

    #[test]
    fn chain_changed_uses_hex() {
        let event = ProviderEvent::ChainChanged { chain_id: 137 };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({ "kind": "chainChanged", "chainId": "0x89" }));
        let back: ProviderEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
