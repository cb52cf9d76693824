//! Routing Envelope Types
//!
//! Value objects for the terminal's request/response envelope. Every frame
//! on the wire, in both directions, is a JSON object of the form:
//!
//! ```json
//! {"Id": "<correlation id>", "Command": "request", "Channel": "#Data.Query", "Payload": "<JSON text>"}
//! ```
//!
//! The `Payload` field is itself JSON-encoded text. Responses coming back
//! from the terminal carry one extra layer of quoting around that text,
//! which [`unquote_payload`] strips before the inner document is parsed.
//!
//! Frames that carry a `heartbeat` property are keep-alives and never take
//! part in correlation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// Constants
// =============================================================================

/// `Command` value on outbound requests.
pub const REQUEST_COMMAND: &str = "request";

/// `Command` value on inbound responses.
pub const RESPONSE_COMMAND: &str = "response";

/// Property that marks a keep-alive frame.
pub const HEARTBEAT_KEY: &str = "heartbeat";

// =============================================================================
// Errors
// =============================================================================

/// Errors raised while building or reading envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The frame is not valid JSON.
    #[error("envelope is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but not an object.
    #[error("envelope is not a JSON object")]
    NotAnObject,

    /// A required envelope field is absent or not a string.
    #[error("envelope field '{0}' is missing or not a string")]
    Field(&'static str),

    /// A correlation id was empty.
    #[error("correlation id cannot be empty")]
    EmptyId,
}

// =============================================================================
// Correlation Id
// =============================================================================

/// Opaque token linking one outbound request to its inbound response.
///
/// Generated ids are random v4 UUIDs, so ids produced concurrently on
/// any number of tasks are pairwise distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing id.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::EmptyId`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, EnvelopeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(EnvelopeError::EmptyId);
        }
        Ok(Self(id))
    }

    /// Borrow the id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Channel
// =============================================================================

/// Request/response contract on the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Reference and portfolio data (accounts, positions, orders, ...).
    DataQuery,
    /// Candle history.
    ArchiveQuery,
    /// Order entry.
    OrderEnter,
    /// Order cancellation.
    OrderCancel,
    /// Buying/selling limit for a prospective order.
    OrderLimit,
}

impl Channel {
    /// All known channels.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::DataQuery,
            Self::ArchiveQuery,
            Self::OrderEnter,
            Self::OrderCancel,
            Self::OrderLimit,
        ]
    }

    /// Wire name of the channel.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DataQuery => "#Data.Query",
            Self::ArchiveQuery => "#Archive.Query",
            Self::OrderEnter => "#Order.Enter.Query",
            Self::OrderCancel => "#Order.Cancel.Query",
            Self::OrderLimit => "#Order.Limit.Query",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Routing Request
// =============================================================================

/// Outbound envelope. Built once per call and serialized once per send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoutingRequest {
    id: CorrelationId,
    command: String,
    channel: String,
    payload: String,
}

impl RoutingRequest {
    /// Build a request for `channel` with a freshly generated id.
    ///
    /// The typed `payload` is serialized to JSON text and embedded as the
    /// envelope's `Payload` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn new<P: Serialize>(channel: Channel, payload: &P) -> Result<Self, EnvelopeError> {
        Self::with_id(CorrelationId::generate(), channel, payload)
    }

    /// Build a request with a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn with_id<P: Serialize>(
        id: CorrelationId,
        channel: Channel,
        payload: &P,
    ) -> Result<Self, EnvelopeError> {
        Ok(Self {
            id,
            command: REQUEST_COMMAND.to_string(),
            channel: channel.as_str().to_string(),
            payload: serde_json::to_string(payload)?,
        })
    }

    /// Correlation id.
    #[must_use]
    pub const fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Command (always `request`).
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Embedded payload text.
    #[must_use]
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Serialize the envelope to a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// Routing Response
// =============================================================================

/// Inbound envelope fields read off one candidate frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingResponse {
    /// Correlation id echoed by the terminal.
    pub id: String,
    /// Command (`response` for answers).
    pub command: String,
    /// Channel the answer belongs to.
    pub channel: String,
    /// Raw payload text, still quoted.
    pub payload: String,
}

impl RoutingResponse {
    /// Read the envelope fields from a parsed frame.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first field that is absent or not a string.
    pub fn from_value(value: &Value) -> Result<Self, EnvelopeError> {
        let object = value.as_object().ok_or(EnvelopeError::NotAnObject)?;
        let field = |name: &'static str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(EnvelopeError::Field(name))
        };

        Ok(Self {
            id: field("Id")?,
            command: field("Command")?,
            channel: field("Channel")?,
            payload: field("Payload")?,
        })
    }

    /// Whether this frame answers request `id` on `channel`.
    ///
    /// All three of id, command and channel must match exactly.
    #[must_use]
    pub fn answers(&self, id: &CorrelationId, channel: &str) -> bool {
        self.id == id.as_str() && self.command == RESPONSE_COMMAND && self.channel == channel
    }

    /// Payload with one layer of quoting removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the quoted payload is not a valid JSON string.
    pub fn unquoted_payload(&self) -> Result<String, EnvelopeError> {
        unquote_payload(&self.payload)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Whether a parsed frame is a heartbeat.
#[must_use]
pub fn is_heartbeat(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key(HEARTBEAT_KEY))
}

/// Strip one layer of JSON string quoting from a payload.
///
/// Payloads that are not quoted are returned unchanged.
///
/// # Errors
///
/// Returns an error if the text starts with a quote but is not a valid
/// JSON string literal.
pub fn unquote_payload(raw: &str) -> Result<String, EnvelopeError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') {
        Ok(serde_json::from_str::<String>(trimmed)?)
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn response(id: &str, command: &str, channel: &str) -> RoutingResponse {
        RoutingResponse {
            id: id.to_string(),
            command: command.to_string(),
            channel: channel.to_string(),
            payload: "{}".to_string(),
        }
    }

    #[test]
    fn channel_wire_names() {
        assert_eq!(Channel::DataQuery.as_str(), "#Data.Query");
        assert_eq!(Channel::ArchiveQuery.as_str(), "#Archive.Query");
        assert_eq!(Channel::OrderEnter.as_str(), "#Order.Enter.Query");
        assert_eq!(Channel::OrderCancel.as_str(), "#Order.Cancel.Query");
        assert_eq!(Channel::OrderLimit.as_str(), "#Order.Limit.Query");
    }

    #[test]
    fn empty_correlation_id_rejected() {
        assert!(matches!(CorrelationId::new(""), Err(EnvelopeError::EmptyId)));
        assert_eq!(CorrelationId::new("abc").unwrap().as_str(), "abc");
    }

    #[test]
    fn generated_ids_are_distinct_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..500)
                        .map(|_| CorrelationId::generate())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(!id.as_str().is_empty());
                assert!(seen.insert(id), "duplicate correlation id");
            }
        }
        assert_eq!(seen.len(), 4000);
    }

    #[test]
    fn request_serializes_pascal_case_envelope() {
        let id = CorrelationId::new("abc").unwrap();
        let request =
            RoutingRequest::with_id(id, Channel::DataQuery, &json!({"Type": "Accounts"})).unwrap();

        let wire: Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
        assert_eq!(wire["Id"], "abc");
        assert_eq!(wire["Command"], "request");
        assert_eq!(wire["Channel"], "#Data.Query");
        assert_eq!(wire["Payload"], r#"{"Type":"Accounts"}"#);
    }

    #[test]
    fn heartbeat_detection() {
        assert!(is_heartbeat(&json!({"heartbeat": true})));
        assert!(is_heartbeat(&json!({"heartbeat": null, "Id": "abc"})));
        assert!(!is_heartbeat(&json!({"Id": "abc"})));
        assert!(!is_heartbeat(&json!(["heartbeat"])));
    }

    #[test]
    fn response_requires_every_field() {
        let full = json!({"Id": "a", "Command": "response", "Channel": "#Data.Query", "Payload": "{}"});
        assert!(RoutingResponse::from_value(&full).is_ok());

        for field in ["Id", "Command", "Channel", "Payload"] {
            let mut frame = full.clone();
            frame.as_object_mut().unwrap().remove(field);
            let err = RoutingResponse::from_value(&frame).unwrap_err();
            assert!(matches!(err, EnvelopeError::Field(name) if name == field));
        }

        let wrong_type = json!({"Id": 7, "Command": "response", "Channel": "#Data.Query", "Payload": "{}"});
        assert!(matches!(
            RoutingResponse::from_value(&wrong_type),
            Err(EnvelopeError::Field("Id"))
        ));
        assert!(matches!(
            RoutingResponse::from_value(&json!([1, 2])),
            Err(EnvelopeError::NotAnObject)
        ));
    }

    #[test]
    fn unquote_strips_exactly_one_layer() {
        assert_eq!(
            unquote_payload(r#""{\"Data\":[]}""#).unwrap(),
            r#"{"Data":[]}"#
        );
        assert_eq!(unquote_payload(r#"{"Data":[]}"#).unwrap(), r#"{"Data":[]}"#);
        assert_eq!(
            unquote_payload(r#""\"{}\"""#).unwrap(),
            r#""{}""#,
            "only one layer is removed"
        );
        assert!(unquote_payload(r#""unterminated"#).is_err());
    }

    proptest! {
        #[test]
        fn accepted_only_on_exact_id_command_channel(
            id in "[a-z0-9]{1,12}",
            other in "[a-z0-9]{1,12}",
            channel_index in 0usize..5,
        ) {
            let channel = Channel::all()[channel_index].as_str();
            let correlation = CorrelationId::new(id.clone()).unwrap();

            prop_assert!(response(&id, "response", channel).answers(&correlation, channel));
            prop_assert!(!response(&id, "request", channel).answers(&correlation, channel));
            prop_assert!(!response(&id, "response", "#Other.Query").answers(&correlation, channel));
            if other != id {
                prop_assert!(!response(&other, "response", channel).answers(&correlation, channel));
            }
        }

        #[test]
        fn request_round_trips_through_wire(
            account in any::<i64>(),
            comment in ".*",
            channel_index in 0usize..5,
        ) {
            let channel = Channel::all()[channel_index];
            let payload = json!({"IdAccount": account, "Comment": comment});
            let request = RoutingRequest::new(channel, &payload).unwrap();

            let wire: Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
            let parsed = RoutingResponse::from_value(&wire).unwrap();
            prop_assert_eq!(parsed.id.as_str(), request.id().as_str());
            prop_assert_eq!(parsed.command.as_str(), REQUEST_COMMAND);
            prop_assert_eq!(parsed.channel.as_str(), channel.as_str());

            let inner: Value = serde_json::from_str(&parsed.unquoted_payload().unwrap()).unwrap();
            prop_assert_eq!(inner, payload);
        }
    }
}
