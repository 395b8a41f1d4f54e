//! The grid session: one grid instance bound to one table.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tracing::debug;

use tabula_bridge::BridgeHandle;
use tabula_wire::{
	CellUpdated, Command, Event, PageRequest, PageResult, Row, RowDeleted, RowInserted, RowKey,
};

use crate::config::{SessionConfig, TableContext};
use crate::edit::{CellEditIntent, EditTable};
use crate::{GridError, Result};

/// One table-editor grid instance.
///
/// All operations are non-blocking: they return immediately with a future
/// that resolves through the bridge's correlation manager. Clones share the
/// edit-intent table, so the in-flight guards hold across clones.
///
/// The edit flow is: [`begin_edit`](Self::begin_edit) when the user enters a
/// cell, then either [`cancel_edit`](Self::cancel_edit) (Escape) or
/// [`update_cell`](Self::update_cell) (commit). After a failed save the cell
/// sits in `error` with the candidate retained;
/// [`resume_edit`](Self::resume_edit) reopens it for another attempt.
#[derive(Clone)]
pub struct GridSession {
	context: Arc<TableContext>,
	config: SessionConfig,
	bridge: BridgeHandle,
	edits: Arc<Mutex<EditTable>>,
}

impl GridSession {
	/// Creates a session for the table described by `context`.
	#[must_use]
	pub fn new(bridge: BridgeHandle, context: TableContext, config: SessionConfig) -> Self {
		Self {
			context: Arc::new(context),
			config,
			bridge,
			edits: Arc::new(Mutex::new(EditTable::default())),
		}
	}

	/// The context this session was built from.
	#[must_use]
	pub fn context(&self) -> &TableContext {
		&self.context
	}

	/// The session configuration.
	#[must_use]
	pub fn config(&self) -> SessionConfig {
		self.config
	}

	/// Loads one page of rows at `offset` using the configured page size.
	///
	/// # Errors
	///
	/// [`GridError::Bridge`] on timeout or a stopped bridge, or the
	/// host-reported failure category.
	pub async fn load_page(&self, offset: u64) -> Result<PageResult> {
		self.load_page_with(offset, self.config.page_size).await
	}

	/// Loads one page of rows with an explicit `limit`.
	///
	/// # Errors
	///
	/// See [`load_page`](Self::load_page).
	pub async fn load_page_with(&self, offset: u64, limit: u64) -> Result<PageResult> {
		let command = Command::LoadPage(PageRequest {
			table: self.context.table.clone(),
			offset,
			limit,
		});
		let event = self
			.bridge
			.request(command, self.config.load_deadline)
			.await?;
		match event {
			Event::Page(page) => Ok(page),
			other => Err(unexpected("table.loadPage", &other)),
		}
	}

	/// Starts editing a cell: `idle → editing`.
	///
	/// `previous` is the currently displayed value; it is what an explicit
	/// cancel restores and what [`update_cell`](Self::update_cell) compares
	/// against for no-change detection.
	///
	/// # Errors
	///
	/// [`GridError::Validation`] for a column not in the catalog;
	/// [`GridError::OperationInProgress`] when the cell is `saving` or the
	/// row has a delete in flight.
	pub fn begin_edit(&self, row: RowKey, column: &str, previous: JsonValue) -> Result<()> {
		self.check_column(column)?;
		self.edits.lock().begin(row, column, previous)
	}

	/// Cancels an edit: `editing → idle`. Illegal while `saving` (an
	/// in-flight save cannot be cancelled) and for errored cells (resume or
	/// retry those so the candidate is not silently discarded).
	///
	/// # Errors
	///
	/// [`GridError::OperationInProgress`] while saving,
	/// [`GridError::Validation`] otherwise.
	pub fn cancel_edit(&self, row: &RowKey, column: &str) -> Result<()> {
		self.edits.lock().cancel(row, column)
	}

	/// Reopens a failed edit for retry: `error → editing`.
	///
	/// # Errors
	///
	/// [`GridError::Validation`] when no edit exists,
	/// [`GridError::OperationInProgress`] while saving.
	pub fn resume_edit(&self, row: &RowKey, column: &str) -> Result<()> {
		self.edits.lock().resume(row, column)
	}

	/// Snapshot of the current intent for a cell, if any.
	#[must_use]
	pub fn edit_intent(&self, row: &RowKey, column: &str) -> Option<CellEditIntent> {
		self.edits.lock().intent(row, column).cloned()
	}

	/// Commits a cell edit: `editing → saving`, then a `cell.update` round
	/// trip. On success the cell returns to idle and the host's
	/// authoritative value is returned — it may differ from `candidate`
	/// (server-side coercion) and is what the UI must display. On failure
	/// the cell moves to `error` with `candidate` retained; nothing is
	/// reverted. Dropping the returned future before it resolves counts as
	/// a failed save, never as a stuck one: the cell moves to `error` the
	/// same way.
	///
	/// # Errors
	///
	/// [`GridError::NoChangeDetected`] when `candidate` equals the pre-edit
	/// value (no round trip is made); [`GridError::OperationInProgress`]
	/// when this cell is already saving; otherwise the categorized failure
	/// for the round trip.
	pub async fn update_cell(
		&self,
		row: RowKey,
		column: &str,
		candidate: JsonValue,
	) -> Result<CellUpdated> {
		self.edits.lock().mark_saving(&row, column, candidate.clone())?;
		let rollback = Rollback::save(&self.edits, row.clone(), column);

		let command = Command::UpdateCell {
			table: self.context.table.clone(),
			row: row.clone(),
			column: column.to_owned(),
			value: candidate,
		};
		let outcome = self.bridge.request(command, self.config.save_deadline).await;
		rollback.disarm();

		let mut edits = self.edits.lock();
		match outcome {
			Ok(Event::CellUpdated(updated)) => {
				edits.complete_saved(&row, column);
				Ok(updated)
			}
			Ok(other) => {
				edits.complete_error(&row, column);
				Err(unexpected("cell.update", &other))
			}
			Err(err) => {
				edits.complete_error(&row, column);
				debug!(row = %row, column, "cell save failed, candidate retained");
				Err(err.into())
			}
		}
	}

	/// Inserts a row. Required columns are validated locally first; a
	/// missing or empty one fails without any envelope reaching the
	/// transport.
	///
	/// # Errors
	///
	/// [`GridError::Validation`] for missing required columns or unknown
	/// columns; otherwise the categorized failure for the round trip.
	pub async fn insert_row(&self, values: Row) -> Result<RowInserted> {
		for column in values.keys() {
			self.check_column(column)?;
		}
		for required in self.context.required_columns() {
			match values.get(required) {
				None | Some(JsonValue::Null) => {
					return Err(GridError::Validation(format!(
						"required column `{required}` is missing"
					)));
				}
				Some(JsonValue::String(s)) if s.is_empty() => {
					return Err(GridError::Validation(format!(
						"required column `{required}` is empty"
					)));
				}
				Some(_) => {}
			}
		}

		let command = Command::InsertRow {
			table: self.context.table.clone(),
			values,
		};
		let event = self
			.bridge
			.request(command, self.config.save_deadline)
			.await?;
		match event {
			Event::RowInserted(inserted) => Ok(inserted),
			other => Err(unexpected("row.insert", &other)),
		}
	}

	/// Deletes a row, guarded per row: a second delete for the same row (or
	/// a delete racing an in-flight cell save on it) fails with
	/// [`GridError::OperationInProgress`]. On failure the row remains
	/// present and its edits are kept. Dropping the returned future before
	/// it resolves releases the guard.
	///
	/// # Errors
	///
	/// [`GridError::OperationInProgress`] under the guard;
	/// [`GridError::ConstraintViolation`] names the violated constraint
	/// when the host rejects the delete; otherwise the categorized failure
	/// for the round trip.
	pub async fn delete_row(&self, row: RowKey) -> Result<RowDeleted> {
		self.edits.lock().begin_delete(row.clone())?;
		let rollback = Rollback::delete(&self.edits, row.clone());

		let command = Command::DeleteRow {
			table: self.context.table.clone(),
			row: row.clone(),
		};
		let outcome = self.bridge.request(command, self.config.save_deadline).await;
		rollback.disarm();

		let mut edits = self.edits.lock();
		match outcome {
			Ok(Event::RowDeleted(deleted)) => {
				edits.finish_delete_success(&row);
				Ok(deleted)
			}
			Ok(other) => {
				edits.finish_delete_failure(&row);
				Err(unexpected("row.delete", &other))
			}
			Err(err) => {
				edits.finish_delete_failure(&row);
				debug!(row = %row, "row delete failed, row retained");
				Err(err.into())
			}
		}
	}

	fn check_column(&self, column: &str) -> Result<()> {
		if self.context.has_column(column) {
			Ok(())
		} else {
			Err(GridError::Validation(format!(
				"unknown column `{column}` for table `{}`",
				self.context.table
			)))
		}
	}
}

/// Rolls an in-flight mutation's guard state back when its future is
/// dropped before the outcome is recorded (a caller-side timeout, or an
/// aborted task). A dropped save moves the cell to `error` with the
/// candidate retained; a dropped delete releases the row guard. The cell or
/// row stays actionable instead of reporting in-progress forever.
struct Rollback<'a> {
	edits: &'a Mutex<EditTable>,
	target: Option<RollbackTarget>,
}

enum RollbackTarget {
	Save { row: RowKey, column: String },
	Delete { row: RowKey },
}

impl<'a> Rollback<'a> {
	fn save(edits: &'a Mutex<EditTable>, row: RowKey, column: &str) -> Self {
		Self {
			edits,
			target: Some(RollbackTarget::Save {
				row,
				column: column.to_owned(),
			}),
		}
	}

	fn delete(edits: &'a Mutex<EditTable>, row: RowKey) -> Self {
		Self {
			edits,
			target: Some(RollbackTarget::Delete { row }),
		}
	}

	/// The caller records the outcome itself; nothing to roll back.
	fn disarm(mut self) {
		self.target = None;
	}
}

impl Drop for Rollback<'_> {
	fn drop(&mut self) {
		match self.target.take() {
			Some(RollbackTarget::Save { row, column }) => {
				self.edits.lock().complete_error(&row, &column);
				debug!(row = %row, column, "save future dropped, cell moved to error");
			}
			Some(RollbackTarget::Delete { row }) => {
				self.edits.lock().finish_delete_failure(&row);
				debug!(row = %row, "delete future dropped, row guard released");
			}
			None => {}
		}
	}
}

impl std::fmt::Debug for GridSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GridSession")
			.field("table", &self.context.table)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

fn unexpected(operation: &'static str, event: &Event) -> GridError {
	let got = match event {
		Event::Page(_) => "table.page",
		Event::CellUpdated(_) => "cell.updated",
		Event::RowInserted(_) => "row.inserted",
		Event::RowDeleted(_) => "row.deleted",
		Event::TableChanged(_) => "table.changed",
		Event::Error(_) => "error",
	};
	GridError::UnexpectedResponse { operation, got }
}
