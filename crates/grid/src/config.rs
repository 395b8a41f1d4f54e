//! Session configuration and the per-grid table context.

use std::time::Duration;

/// One column of the edited table, as the UI knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
	/// Column name as used in wire payloads.
	pub name: String,
	/// Whether inserts must supply a non-empty value.
	pub required: bool,
}

impl ColumnSpec {
	/// An optional column.
	#[must_use]
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			required: false,
		}
	}

	/// A column inserts must fill.
	#[must_use]
	pub fn required(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			required: true,
		}
	}
}

/// Explicit context a session is constructed with: which table it edits and
/// the column catalog for local validation.
///
/// Passed at construction, not read from ambient state, so independent grid
/// instances never interfere.
#[derive(Debug, Clone)]
pub struct TableContext {
	/// Table this grid edits.
	pub table: String,
	/// Column catalog. May be empty when the schema is not known up front;
	/// local column validation is skipped then.
	pub columns: Vec<ColumnSpec>,
}

impl TableContext {
	/// Creates a context for `table` with the given column catalog.
	#[must_use]
	pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
		Self {
			table: table.into(),
			columns,
		}
	}

	/// Whether `column` exists in the catalog (vacuously true when the
	/// catalog is empty).
	#[must_use]
	pub fn has_column(&self, column: &str) -> bool {
		self.columns.is_empty() || self.columns.iter().any(|c| c.name == column)
	}

	/// Columns inserts must fill.
	pub fn required_columns(&self) -> impl Iterator<Item = &str> {
		self.columns
			.iter()
			.filter(|c| c.required)
			.map(|c| c.name.as_str())
	}
}

/// Tunables for a grid session.
///
/// The deadlines default to the product latency budgets: 1000 ms per save
/// and 2000 ms per load. Neither is hard-coded anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
	/// Rows per page for [`load_page`](crate::GridSession::load_page).
	pub page_size: u64,
	/// Response deadline for mutations.
	pub save_deadline: Duration,
	/// Response deadline for page loads.
	pub load_deadline: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			page_size: 50,
			save_deadline: Duration::from_millis(1000),
			load_deadline: Duration::from_millis(2000),
		}
	}
}

impl SessionConfig {
	/// Set the page size.
	#[must_use]
	pub fn page_size(mut self, rows: u64) -> Self {
		self.page_size = rows;
		self
	}

	/// Set the mutation deadline.
	#[must_use]
	pub fn save_deadline(mut self, deadline: Duration) -> Self {
		self.save_deadline = deadline;
		self
	}

	/// Set the page-load deadline.
	#[must_use]
	pub fn load_deadline(mut self, deadline: Duration) -> Self {
		self.load_deadline = deadline;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_the_latency_budgets() {
		let config = SessionConfig::default();
		assert_eq!(config.page_size, 50);
		assert_eq!(config.save_deadline, Duration::from_millis(1000));
		assert_eq!(config.load_deadline, Duration::from_millis(2000));
	}

	#[test]
	fn builder_overrides() {
		let config = SessionConfig::default()
			.page_size(100)
			.save_deadline(Duration::from_millis(500));
		assert_eq!(config.page_size, 100);
		assert_eq!(config.save_deadline, Duration::from_millis(500));
		assert_eq!(config.load_deadline, Duration::from_millis(2000));
	}

	#[test]
	fn empty_catalog_accepts_any_column() {
		let context = TableContext::new("Patient", Vec::new());
		assert!(context.has_column("anything"));
	}

	#[test]
	fn required_columns_come_from_the_catalog() {
		let context = TableContext::new(
			"Patient",
			vec![
				ColumnSpec::required("name"),
				ColumnSpec::new("note"),
				ColumnSpec::required("ssn"),
			],
		);
		assert!(context.has_column("note"));
		assert!(!context.has_column("age"));
		let required: Vec<&str> = context.required_columns().collect();
		assert_eq!(required, vec!["name", "ssn"]);
	}
}
