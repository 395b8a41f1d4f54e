//! Envelope and payload types exchanged over the bridge.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Correlation token tying a response envelope to the command that caused it.
///
/// Generated by the sender of the originating envelope. Unique among all
/// envelopes currently awaiting a response; the bridge frees an id only once
/// its request is resolved or expired.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub String);

impl CorrelationId {
	/// Whether the id carries any content at all.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Display for CorrelationId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for CorrelationId {
	fn from(s: &str) -> Self {
		Self(s.to_owned())
	}
}

/// Counter-based generator for UI-side correlation ids.
///
/// Ids carry a `ui-` prefix so a well-behaved host emitting unsolicited
/// events under its own ids can never collide with a pending request.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationIdGen(u64);

impl CorrelationIdGen {
	/// Creates a new counter starting at 0.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Generates the next unique id and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> CorrelationId {
		let id = self.0;
		self.0 += 1;
		CorrelationId(format!("ui-{id}"))
	}
}

/// Classification of an envelope: a privileged operation request, or
/// information flowing back from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
	/// UI → host operation request.
	Command,
	/// Host → UI response or unsolicited event.
	Event,
}

impl fmt::Display for EnvelopeKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Command => f.write_str("command"),
			Self::Event => f.write_str("event"),
		}
	}
}

/// Identifies a row: a primary-key value, or a position token for tables
/// without a usable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RowKey {
	/// Primary-key value rendered as a string.
	Key(String),
	/// Zero-based row position within the current server ordering.
	Position(u64),
}

impl fmt::Display for RowKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Key(k) => f.write_str(k),
			Self::Position(p) => write!(f, "#{p}"),
		}
	}
}

impl From<&str> for RowKey {
	fn from(s: &str) -> Self {
		Self::Key(s.to_owned())
	}
}

impl From<u64> for RowKey {
	fn from(p: u64) -> Self {
		Self::Position(p)
	}
}

/// Opaque server-state version token.
///
/// The host bumps it on every committed change so the UI can detect
/// concurrent external writers between pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(pub String);

impl fmt::Display for VersionToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A single row as reported by the host: column name → cell value.
pub type Row = BTreeMap<String, JsonValue>;

/// UI → host commands, tagged by the wire `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Command {
	/// Load one page of rows.
	#[serde(rename = "table.loadPage")]
	LoadPage(PageRequest),
	/// Commit a single-cell edit.
	#[serde(rename = "cell.update")]
	UpdateCell {
		/// Target table.
		table: String,
		/// Row holding the edited cell.
		row: RowKey,
		/// Column of the edited cell.
		column: String,
		/// Candidate value as typed by the user.
		value: JsonValue,
	},
	/// Insert a new row.
	#[serde(rename = "row.insert")]
	InsertRow {
		/// Target table.
		table: String,
		/// Column name → value for the new row.
		values: Row,
	},
	/// Delete a row.
	#[serde(rename = "row.delete")]
	DeleteRow {
		/// Target table.
		table: String,
		/// Row to delete.
		row: RowKey,
	},
}

/// Page request parameters for [`Command::LoadPage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
	/// Target table.
	pub table: String,
	/// Offset of the first row to return.
	pub offset: u64,
	/// Maximum number of rows to return.
	pub limit: u64,
}

/// Host → UI events, tagged by the wire `type` discriminator.
///
/// Response events echo the correlation id of the command they answer;
/// unsolicited events ([`Event::TableChanged`]) carry fresh host ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
	/// One page of rows, answering `table.loadPage`.
	#[serde(rename = "table.page")]
	Page(PageResult),
	/// Confirmation of a committed cell edit, answering `cell.update`.
	#[serde(rename = "cell.updated")]
	CellUpdated(CellUpdated),
	/// Confirmation of an inserted row, answering `row.insert`.
	#[serde(rename = "row.inserted")]
	RowInserted(RowInserted),
	/// Confirmation of a deleted row, answering `row.delete`.
	#[serde(rename = "row.deleted")]
	RowDeleted(RowDeleted),
	/// The table changed underneath the UI (external writer).
	#[serde(rename = "table.changed")]
	TableChanged(TableChanged),
	/// The host failed to perform the correlated command.
	#[serde(rename = "error")]
	Error(HostError),
}

/// One page of rows plus bookkeeping, answering a [`PageRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
	/// Rows in server order, at most `limit` of them.
	pub rows: Vec<Row>,
	/// Total row count, when the host knows it. `None` for very large
	/// tables where counting is deferred.
	#[serde(default)]
	pub total: Option<u64>,
	/// Server state the page was read at.
	pub version: VersionToken,
}

/// Authoritative result of a committed cell edit.
///
/// `value` is what the host actually stored, which may differ from the
/// candidate (server-side coercion); the UI must display this, not the
/// user's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellUpdated {
	/// Value as stored by the host.
	pub value: JsonValue,
	/// Server state after the commit.
	pub version: VersionToken,
}

/// Authoritative result of an inserted row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInserted {
	/// Key assigned to the new row.
	pub key: RowKey,
	/// The row as stored, including host-filled defaults.
	pub row: Row,
	/// Server state after the insert.
	pub version: VersionToken,
}

/// Confirmation of a deleted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDeleted {
	/// Key of the removed row.
	pub row: RowKey,
	/// Server state after the delete.
	pub version: VersionToken,
}

/// Unsolicited notification that a table changed externally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableChanged {
	/// Table that changed.
	pub table: String,
	/// New server state.
	pub version: VersionToken,
}

/// Host-reported failure payload for a correlated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostError {
	/// Failure category.
	pub code: HostErrorCode,
	/// Human-readable description.
	pub message: String,
	/// Name of the violated constraint, for
	/// [`HostErrorCode::ConstraintViolation`].
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub constraint: Option<String>,
}

/// Failure categories a host may report.
///
/// Kept closed: unknown codes are a decode error, not a duck-typed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostErrorCode {
	/// Data-integrity failure (uniqueness, foreign key, ...). The UI should
	/// tell the user to fix their input.
	ConstraintViolation,
	/// The host lost its backend connection. The UI should offer retry.
	ConnectivityLost,
	/// Uncategorized host-side failure.
	Internal,
}

impl fmt::Display for HostErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::ConstraintViolation => f.write_str("constraint_violation"),
			Self::ConnectivityLost => f.write_str("connectivity_lost"),
			Self::Internal => f.write_str("internal"),
		}
	}
}

/// The unit exchanged over the bridge in the UI → host direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
	/// Sender-generated correlation token.
	pub id: CorrelationId,
	/// Always [`EnvelopeKind::Command`] for this direction.
	pub kind: EnvelopeKind,
	/// Typed operation and payload.
	#[serde(flatten)]
	pub command: Command,
	/// Unix milliseconds at send time.
	pub timestamp: u64,
}

impl CommandEnvelope {
	/// Wrap a command for dispatch under the given correlation id.
	#[must_use]
	pub fn new(id: CorrelationId, command: Command) -> Self {
		Self {
			id,
			kind: EnvelopeKind::Command,
			command,
			timestamp: now_millis(),
		}
	}
}

/// The unit exchanged over the bridge in the host → UI direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
	/// Correlation token: echoes the originating command for responses,
	/// fresh host-generated for unsolicited events.
	pub id: CorrelationId,
	/// Always [`EnvelopeKind::Event`] for this direction.
	pub kind: EnvelopeKind,
	/// Typed event and payload.
	#[serde(flatten)]
	pub event: Event,
	/// Unix milliseconds at send time.
	pub timestamp: u64,
}

impl EventEnvelope {
	/// Wrap an event answering the command with the given id.
	#[must_use]
	pub fn response(id: CorrelationId, event: Event) -> Self {
		Self {
			id,
			kind: EnvelopeKind::Event,
			event,
			timestamp: now_millis(),
		}
	}
}

/// Current time as unix milliseconds, saturating at zero before the epoch.
#[must_use]
pub fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn command_envelope_wire_shape() {
		let env = CommandEnvelope::new(
			"ui-0".into(),
			Command::LoadPage(PageRequest {
				table: "Patient".into(),
				offset: 0,
				limit: 50,
			}),
		);
		let value = serde_json::to_value(&env).expect("serialize");
		assert_eq!(value["id"], json!("ui-0"));
		assert_eq!(value["kind"], json!("command"));
		assert_eq!(value["type"], json!("table.loadPage"));
		assert_eq!(value["payload"]["table"], json!("Patient"));
		assert_eq!(value["payload"]["limit"], json!(50));
		assert!(value["timestamp"].is_u64());
	}

	#[test]
	fn event_envelope_roundtrip() {
		let env = EventEnvelope::response(
			"ui-7".into(),
			Event::Error(HostError {
				code: HostErrorCode::ConstraintViolation,
				message: "duplicate key".into(),
				constraint: Some("uq_patient_ssn".into()),
			}),
		);
		let value = serde_json::to_value(&env).expect("serialize");
		assert_eq!(value["type"], json!("error"));
		assert_eq!(value["payload"]["code"], json!("constraint_violation"));
		let back: EventEnvelope = serde_json::from_value(value).expect("deserialize");
		assert_eq!(back, env);
	}

	#[test]
	fn row_key_is_untagged() {
		assert_eq!(
			serde_json::to_value(RowKey::Key("p-17".into())).expect("serialize"),
			json!("p-17")
		);
		assert_eq!(
			serde_json::to_value(RowKey::Position(3)).expect("serialize"),
			json!(3)
		);
		let key: RowKey = serde_json::from_value(json!(12)).expect("deserialize");
		assert_eq!(key, RowKey::Position(12));
	}

	#[test]
	fn unknown_total_serializes_as_null() {
		let page = PageResult {
			rows: Vec::new(),
			total: None,
			version: VersionToken("v1".into()),
		};
		let value = serde_json::to_value(&page).expect("serialize");
		assert!(value["total"].is_null());
	}

	#[test]
	fn id_gen_never_repeats() {
		let mut id_gen = CorrelationIdGen::new();
		let first = id_gen.next();
		let second = id_gen.next();
		assert_ne!(first, second);
		assert_eq!(first, CorrelationId("ui-0".into()));
		assert_eq!(second, CorrelationId("ui-1".into()));
	}
}
