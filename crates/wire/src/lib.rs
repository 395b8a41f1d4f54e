//! Typed envelopes and codec for the tabula UI/host bridge.
//!
//! The UI surface and the privileged host exchange JSON envelopes of the
//! shape `{ id, kind, type, payload, timestamp }`. This crate owns the typed
//! representation of those envelopes and the validation boundary that turns
//! raw transport messages into them:
//! * [`CommandEnvelope`]: UI → host commands (`table.loadPage`, `cell.update`, ...)
//! * [`EventEnvelope`]: host → UI responses and unsolicited events
//! * [`codec`]: shape validation; malformed input becomes [`DecodeError`],
//!   never a panic and never a resolution of an unrelated request
//!
//! Nothing here assumes an async runtime; the bridge crate drives the codec.

#![warn(missing_docs)]

pub mod codec;
pub mod envelope;

pub use codec::DecodeError;
pub use envelope::{
	CellUpdated, Command, CommandEnvelope, CorrelationId, CorrelationIdGen, EnvelopeKind, Event,
	EventEnvelope, HostError, HostErrorCode, PageRequest, PageResult, Row, RowDeleted, RowInserted,
	RowKey, TableChanged, VersionToken, now_millis,
};

/// A convenient type alias for `Result` with `E` = [`DecodeError`].
pub type Result<T, E = DecodeError> = std::result::Result<T, E>;
