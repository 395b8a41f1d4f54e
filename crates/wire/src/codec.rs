//! Validation boundary between raw transport messages and typed envelopes.
//!
//! Everything arriving from the other side of the bridge is an untrusted
//! `serde_json::Value`. Decoding checks the envelope shape (object, known
//! `kind`, non-empty `id`, known `type` tag, payload fields present) before
//! any of it reaches the correlation layer. A failed decode identifies the
//! offending message; it never panics and never resolves a pending request.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::envelope::{CommandEnvelope, CorrelationId, EnvelopeKind, EventEnvelope};

/// Why a raw message was rejected before reaching business logic.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
	/// The message is not a JSON object at all.
	#[error("message is not a JSON object")]
	NotAnObject,
	/// A required envelope field is absent.
	#[error("missing envelope field `{0}`")]
	MissingField(&'static str),
	/// The `kind` field holds something other than `command` or `event`.
	#[error("unknown envelope kind `{0}`")]
	UnknownKind(String),
	/// The `kind` field is valid but wrong for this direction.
	#[error("expected `{expected}` envelope, got `{got}`")]
	KindMismatch {
		/// Kind this side of the bridge accepts.
		expected: EnvelopeKind,
		/// Kind the message declared.
		got: EnvelopeKind,
	},
	/// The correlation id carries no content.
	#[error("empty correlation id")]
	EmptyId,
	/// Unknown `type` tag or payload fields that do not match it.
	#[error("invalid envelope: {0}")]
	Invalid(#[from] serde_json::Error),
}

/// Decode a host → UI message into a typed [`EventEnvelope`].
///
/// # Errors
///
/// Returns [`DecodeError`] when the message is structurally invalid; see the
/// variants for the specific shapes rejected.
pub fn decode_event(raw: &JsonValue) -> Result<EventEnvelope, DecodeError> {
	decode(raw, EnvelopeKind::Event)
}

/// Decode a UI → host message into a typed [`CommandEnvelope`].
///
/// Host-side counterpart of [`decode_event`]; the in-process host link and
/// host test doubles use it to validate what the UI sent.
///
/// # Errors
///
/// Returns [`DecodeError`] when the message is structurally invalid.
pub fn decode_command(raw: &JsonValue) -> Result<CommandEnvelope, DecodeError> {
	decode(raw, EnvelopeKind::Command)
}

/// Encode a typed command envelope for the wire.
#[must_use]
pub fn encode_command(envelope: &CommandEnvelope) -> JsonValue {
	serde_json::to_value(envelope).expect("command envelope serializes")
}

/// Encode a typed event envelope for the wire.
#[must_use]
pub fn encode_event(envelope: &EventEnvelope) -> JsonValue {
	serde_json::to_value(envelope).expect("event envelope serializes")
}

fn decode<T: DeserializeOwned>(raw: &JsonValue, expected: EnvelopeKind) -> Result<T, DecodeError> {
	let object = raw.as_object().ok_or(DecodeError::NotAnObject)?;

	// Check kind and id by hand first so their failures are reported
	// precisely rather than as a generic serde error on the whole envelope.
	let kind_field = object.get("kind").ok_or(DecodeError::MissingField("kind"))?;
	let kind: EnvelopeKind = serde_json::from_value(kind_field.clone())
		.map_err(|_| DecodeError::UnknownKind(kind_field.to_string()))?;
	if kind != expected {
		return Err(DecodeError::KindMismatch {
			expected,
			got: kind,
		});
	}

	let id_field = object.get("id").ok_or(DecodeError::MissingField("id"))?;
	let id: CorrelationId =
		serde_json::from_value(id_field.clone()).map_err(DecodeError::Invalid)?;
	if id.is_empty() {
		return Err(DecodeError::EmptyId);
	}

	if !object.contains_key("type") {
		return Err(DecodeError::MissingField("type"));
	}

	Ok(serde_json::from_value(raw.clone())?)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::envelope::{Event, PageResult, VersionToken};

	fn page_event(id: &str) -> JsonValue {
		encode_event(&EventEnvelope::response(
			id.into(),
			Event::Page(PageResult {
				rows: vec![],
				total: Some(0),
				version: VersionToken("v1".into()),
			}),
		))
	}

	#[test]
	fn accepts_well_formed_event() {
		let envelope = decode_event(&page_event("ui-3")).expect("decode");
		assert_eq!(envelope.id, "ui-3".into());
		assert!(matches!(envelope.event, Event::Page(_)));
	}

	#[test]
	fn rejects_non_object() {
		assert!(matches!(
			decode_event(&json!("not an envelope")),
			Err(DecodeError::NotAnObject)
		));
	}

	#[test]
	fn rejects_missing_kind() {
		let mut raw = page_event("ui-3");
		raw.as_object_mut().unwrap().remove("kind");
		assert!(matches!(
			decode_event(&raw),
			Err(DecodeError::MissingField("kind"))
		));
	}

	#[test]
	fn rejects_unknown_kind() {
		let mut raw = page_event("ui-3");
		raw["kind"] = json!("broadcast");
		assert!(matches!(
			decode_event(&raw),
			Err(DecodeError::UnknownKind(_))
		));
	}

	#[test]
	fn rejects_command_kind_on_event_side() {
		let mut raw = page_event("ui-3");
		raw["kind"] = json!("command");
		assert!(matches!(
			decode_event(&raw),
			Err(DecodeError::KindMismatch {
				expected: EnvelopeKind::Event,
				got: EnvelopeKind::Command,
			})
		));
	}

	#[test]
	fn rejects_empty_id() {
		let raw = page_event("");
		assert!(matches!(decode_event(&raw), Err(DecodeError::EmptyId)));
	}

	#[test]
	fn rejects_unknown_type_tag() {
		let mut raw = page_event("ui-3");
		raw["type"] = json!("table.vacuum");
		assert!(matches!(decode_event(&raw), Err(DecodeError::Invalid(_))));
	}

	#[test]
	fn rejects_payload_missing_required_fields() {
		let mut raw = page_event("ui-3");
		raw["payload"].as_object_mut().unwrap().remove("version");
		assert!(matches!(decode_event(&raw), Err(DecodeError::Invalid(_))));
	}
}
