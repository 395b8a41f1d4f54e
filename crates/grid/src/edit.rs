//! Cell edit intents and the table of in-flight mutations.
//!
//! Lifecycle per cell: `idle → editing → saving → {saved → idle | error →
//! editing (retry) | editing (cancel restores idle)}`. "Idle" is the
//! absence of an intent; `saved` is observable only on the snapshot handed
//! back when a save completes. Cancellation is legal from `editing` only:
//! an in-flight save cannot be cancelled, and an errored edit must be
//! resumed (or retried) explicitly so the candidate value is never thrown
//! away without user action.

use std::collections::{HashMap, HashSet};

use serde_json::Value as JsonValue;

use tabula_wire::RowKey;

use crate::{GridError, Result};

use EditState::{Editing, Error, Saved, Saving};

/// Where a cell edit stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditState {
	/// The user is typing; nothing sent yet.
	Editing,
	/// A save is in flight. No second mutation may target this cell.
	Saving,
	/// The save committed. Only seen on the final intent snapshot.
	Saved,
	/// The save failed; the candidate value is retained for retry.
	Error,
}

/// A single uncommitted edit, owned by the session until resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEditIntent {
	/// Row holding the edited cell.
	pub row: RowKey,
	/// Column of the edited cell.
	pub column: String,
	/// Value before the edit began; restored only by an explicit cancel.
	pub previous: JsonValue,
	/// Value the user typed.
	pub candidate: JsonValue,
	/// Current lifecycle state.
	pub state: EditState,
}

/// Cell address within the session's table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CellRef {
	row: RowKey,
	column: String,
}

/// Edit intents and delete guards for one session.
///
/// Enforces the at-most-one-in-flight invariants: a (row, column) pair never
/// has two outstanding `saving` states, and a row never has two outstanding
/// deletes.
#[derive(Debug, Default)]
pub(crate) struct EditTable {
	edits: HashMap<CellRef, CellEditIntent>,
	deleting: HashSet<RowKey>,
}

impl EditTable {
	/// `idle → editing`. Re-entering an `editing` cell is a no-op; an
	/// errored cell resumes editing with its candidate retained.
	pub fn begin(&mut self, row: RowKey, column: &str, previous: JsonValue) -> Result<()> {
		let cell = CellRef {
			row,
			column: column.to_owned(),
		};
		if self.deleting.contains(&cell.row) {
			return Err(GridError::row_in_progress(&cell.row));
		}
		match self.edits.get_mut(&cell) {
			Some(intent) => match intent.state {
				Editing => Ok(()),
				Saving => Err(GridError::cell_in_progress(&cell.row, column)),
				Error => {
					intent.state = Editing;
					Ok(())
				}
				Saved => unreachable!("saved intents are removed from the table"),
			},
			None => {
				let intent = CellEditIntent {
					row: cell.row.clone(),
					column: cell.column.clone(),
					candidate: previous.clone(),
					previous,
					state: Editing,
				};
				self.edits.insert(cell, intent);
				Ok(())
			}
		}
	}

	/// `error → editing`, keeping the candidate for retry.
	pub fn resume(&mut self, row: &RowKey, column: &str) -> Result<()> {
		let intent = self.intent_mut(row, column)?;
		match intent.state {
			Error => {
				intent.state = Editing;
				Ok(())
			}
			Editing => Ok(()),
			Saving => Err(GridError::cell_in_progress(row, column)),
			Saved => unreachable!("saved intents are removed from the table"),
		}
	}

	/// `editing → idle`, discarding the candidate. The pre-edit value is the
	/// display value again.
	pub fn cancel(&mut self, row: &RowKey, column: &str) -> Result<()> {
		let cell = CellRef {
			row: row.clone(),
			column: column.to_owned(),
		};
		match self.edits.get(&cell).map(|intent| intent.state) {
			Some(Editing) => {
				self.edits.remove(&cell);
				Ok(())
			}
			Some(Saving) => Err(GridError::cell_in_progress(row, column)),
			Some(Error) => Err(GridError::Validation(format!(
				"cell {row}.{column} has a failed save; resume or retry it instead of cancelling"
			))),
			Some(Saved) => unreachable!("saved intents are removed from the table"),
			None => Err(GridError::Validation(format!(
				"no edit in progress for cell {row}.{column}"
			))),
		}
	}

	/// `editing → saving` with the final candidate value.
	///
	/// Fails fast with [`GridError::NoChangeDetected`] when the candidate
	/// equals the pre-edit value, leaving the intent in `editing`.
	pub fn mark_saving(&mut self, row: &RowKey, column: &str, candidate: JsonValue) -> Result<()> {
		if self.deleting.contains(row) {
			return Err(GridError::row_in_progress(row));
		}
		let intent = self.intent_mut(row, column)?;
		match intent.state {
			Saving => Err(GridError::cell_in_progress(row, column)),
			Error => Err(GridError::Validation(format!(
				"cell {row}.{column} has a failed save; resume it before retrying"
			))),
			Editing => {
				if candidate == intent.previous {
					return Err(GridError::NoChangeDetected);
				}
				intent.candidate = candidate;
				intent.state = Saving;
				Ok(())
			}
			Saved => unreachable!("saved intents are removed from the table"),
		}
	}

	/// `saving → saved → idle`. Returns the final intent snapshot.
	pub fn complete_saved(&mut self, row: &RowKey, column: &str) -> Option<CellEditIntent> {
		let cell = CellRef {
			row: row.clone(),
			column: column.to_owned(),
		};
		let mut intent = self.edits.remove(&cell)?;
		intent.state = Saved;
		Some(intent)
	}

	/// `saving → error`, retaining the candidate for retry.
	pub fn complete_error(&mut self, row: &RowKey, column: &str) {
		if let Some(intent) = self.edits.get_mut(&CellRef {
			row: row.clone(),
			column: column.to_owned(),
		}) {
			intent.state = Error;
		}
	}

	/// Current intent for a cell, if any.
	pub fn intent(&self, row: &RowKey, column: &str) -> Option<&CellEditIntent> {
		self.edits.get(&CellRef {
			row: row.clone(),
			column: column.to_owned(),
		})
	}

	/// Takes the per-row delete guard.
	pub fn begin_delete(&mut self, row: RowKey) -> Result<()> {
		// A row with a save in flight cannot race a delete either.
		let saving = self
			.edits
			.values()
			.any(|intent| intent.row == row && intent.state == Saving);
		if saving || !self.deleting.insert(row.clone()) {
			return Err(GridError::row_in_progress(&row));
		}
		Ok(())
	}

	/// Releases the delete guard after a confirmed delete; any leftover
	/// edits for the vanished row go with it.
	pub fn finish_delete_success(&mut self, row: &RowKey) {
		self.deleting.remove(row);
		self.edits.retain(|cell, _| cell.row != *row);
	}

	/// Releases the delete guard after a failed delete; the row (and its
	/// edits) remain.
	pub fn finish_delete_failure(&mut self, row: &RowKey) {
		self.deleting.remove(row);
	}

	fn intent_mut(&mut self, row: &RowKey, column: &str) -> Result<&mut CellEditIntent> {
		self.edits
			.get_mut(&CellRef {
				row: row.clone(),
				column: column.to_owned(),
			})
			.ok_or_else(|| {
				GridError::Validation(format!("no edit in progress for cell {row}.{column}"))
			})
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn row() -> RowKey {
		RowKey::Key("p-17".into())
	}

	fn begun() -> EditTable {
		let mut table = EditTable::default();
		table.begin(row(), "name", json!("Ada")).expect("begin");
		table
	}

	#[test]
	fn begin_edit_then_save_then_idle() {
		let mut table = begun();
		assert_eq!(table.intent(&row(), "name").expect("intent").state, Editing);

		table
			.mark_saving(&row(), "name", json!("Grace"))
			.expect("mark saving");
		assert_eq!(table.intent(&row(), "name").expect("intent").state, Saving);

		let intent = table.complete_saved(&row(), "name").expect("snapshot");
		assert_eq!(intent.state, Saved);
		assert_eq!(intent.candidate, json!("Grace"));
		assert!(table.intent(&row(), "name").is_none());
	}

	#[test]
	fn no_change_is_rejected_without_a_state_change() {
		let mut table = begun();
		assert!(matches!(
			table.mark_saving(&row(), "name", json!("Ada")),
			Err(GridError::NoChangeDetected)
		));
		assert_eq!(table.intent(&row(), "name").expect("intent").state, Editing);
	}

	#[test]
	fn saving_cell_rejects_a_second_save() {
		let mut table = begun();
		table
			.mark_saving(&row(), "name", json!("Grace"))
			.expect("first save");
		assert!(matches!(
			table.mark_saving(&row(), "name", json!("Edsger")),
			Err(GridError::OperationInProgress { .. })
		));
		// The in-flight candidate is untouched.
		assert_eq!(
			table.intent(&row(), "name").expect("intent").candidate,
			json!("Grace")
		);
	}

	#[test]
	fn cancel_is_only_legal_while_editing() {
		let mut table = begun();
		table
			.mark_saving(&row(), "name", json!("Grace"))
			.expect("mark saving");
		assert!(matches!(
			table.cancel(&row(), "name"),
			Err(GridError::OperationInProgress { .. })
		));

		table.complete_error(&row(), "name");
		assert!(matches!(
			table.cancel(&row(), "name"),
			Err(GridError::Validation(_))
		));

		table.resume(&row(), "name").expect("resume");
		table.cancel(&row(), "name").expect("cancel");
		assert!(table.intent(&row(), "name").is_none());
	}

	#[test]
	fn error_retains_candidate_and_resumes_into_editing() {
		let mut table = begun();
		table
			.mark_saving(&row(), "name", json!("Grace"))
			.expect("mark saving");
		table.complete_error(&row(), "name");

		let intent = table.intent(&row(), "name").expect("intent");
		assert_eq!(intent.state, Error);
		assert_eq!(intent.candidate, json!("Grace"));
		assert_eq!(intent.previous, json!("Ada"));

		table.resume(&row(), "name").expect("resume");
		let intent = table.intent(&row(), "name").expect("intent");
		assert_eq!(intent.state, Editing);
		assert_eq!(intent.candidate, json!("Grace"));
	}

	#[test]
	fn delete_guard_is_per_row() {
		let mut table = EditTable::default();
		table.begin_delete(row()).expect("first delete");
		assert!(matches!(
			table.begin_delete(row()),
			Err(GridError::OperationInProgress { .. })
		));
		// A different row is unaffected.
		table
			.begin_delete(RowKey::Key("p-18".into()))
			.expect("other row");

		table.finish_delete_failure(&row());
		table.begin_delete(row()).expect("guard freed");
	}

	#[test]
	fn delete_rejects_rows_with_a_save_in_flight() {
		let mut table = begun();
		table
			.mark_saving(&row(), "name", json!("Grace"))
			.expect("mark saving");
		assert!(matches!(
			table.begin_delete(row()),
			Err(GridError::OperationInProgress { .. })
		));
	}

	#[test]
	fn successful_delete_sweeps_leftover_edits() {
		let mut table = begun();
		table.begin_delete(row()).expect("delete");
		table.finish_delete_success(&row());
		assert!(table.intent(&row(), "name").is_none());
	}

	#[test]
	fn editing_a_deleting_row_is_rejected() {
		let mut table = EditTable::default();
		table.begin_delete(row()).expect("delete");
		assert!(matches!(
			table.begin(row(), "name", json!("Ada")),
			Err(GridError::OperationInProgress { .. })
		));
	}
}
