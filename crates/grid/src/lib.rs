//! Operation orchestrator for the tabula table editor.
//!
//! A [`GridSession`] is one grid instance bound to one table. It sequences
//! reads (`load_page`) and writes (`update_cell`, `insert_row`,
//! `delete_row`) against the bridge, owns the [`CellEditIntent`] state
//! machines, and enforces the at-most-one-in-flight rule per cell edit and
//! per row delete. Sessions are built from an explicit [`TableContext`]
//! rather than ambient global state, so multiple independent grids (tabs)
//! coexist without cross-talk.
//!
//! Failure contract: a failed mutation leaves the affected cell in an
//! explicit `error` state with the user's candidate value retained for
//! retry. Nothing is ever reverted without user action, and nothing is left
//! ambiguous between "maybe saved" and "not saved".

#![warn(missing_docs)]

use tabula_wire::RowKey;

pub mod config;
pub mod edit;
pub mod session;

pub use config::{ColumnSpec, SessionConfig, TableContext};
pub use edit::{CellEditIntent, EditState};
pub use session::GridSession;

/// A convenient type alias for `Result` with `E` = [`enum@GridError`].
pub type Result<T, E = GridError> = std::result::Result<T, E>;

/// Categorized failures surfaced to the UI collaborator.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GridError {
	/// The concurrency guard rejected the call: an operation is already in
	/// flight for this target. Wait for resolution, do not retry
	/// immediately.
	#[error("operation already in flight for {target}")]
	OperationInProgress {
		/// Human-readable description of the guarded cell or row.
		target: String,
	},
	/// The candidate value equals the previous value; nothing to save.
	#[error("candidate value equals the previous value")]
	NoChangeDetected,
	/// A local precondition failed before any envelope was sent.
	#[error("validation failed: {0}")]
	Validation(String),
	/// Host-reported data-integrity failure. Fix the input, then retry.
	#[error("constraint `{}` violated: {message}", .constraint.as_deref().unwrap_or("unnamed"))]
	ConstraintViolation {
		/// Name of the violated constraint, when the host reports one.
		constraint: Option<String>,
		/// Host-provided description.
		message: String,
	},
	/// The host lost its backend connection. Retry is appropriate.
	#[error("connectivity lost: {0}")]
	ConnectivityLost(String),
	/// Uncategorized host-side failure.
	#[error("host failure: {0}")]
	Host(String),
	/// Bridge-level failure: timeout, stopped loop, or a correlation
	/// defect. Timeouts are retryable.
	#[error(transparent)]
	Bridge(tabula_bridge::Error),
	/// The host answered with an event of the wrong type.
	#[error("unexpected `{got}` response to {operation}")]
	UnexpectedResponse {
		/// Operation that was issued.
		operation: &'static str,
		/// Wire type tag of the event that came back.
		got: &'static str,
	},
}

impl From<tabula_bridge::Error> for GridError {
	fn from(err: tabula_bridge::Error) -> Self {
		match err {
			tabula_bridge::Error::Host(host) => match host.code {
				tabula_wire::HostErrorCode::ConstraintViolation => Self::ConstraintViolation {
					constraint: host.constraint,
					message: host.message,
				},
				tabula_wire::HostErrorCode::ConnectivityLost => Self::ConnectivityLost(host.message),
				tabula_wire::HostErrorCode::Internal => Self::Host(host.message),
			},
			other => Self::Bridge(other),
		}
	}
}

impl GridError {
	/// Guard rejection for a cell target.
	pub(crate) fn cell_in_progress(row: &RowKey, column: &str) -> Self {
		Self::OperationInProgress {
			target: format!("cell {row}.{column}"),
		}
	}

	/// Guard rejection for a row target.
	pub(crate) fn row_in_progress(row: &RowKey) -> Self {
		Self::OperationInProgress {
			target: format!("row {row}"),
		}
	}
}
