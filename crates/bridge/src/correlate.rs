//! In-flight request table: the correlation manager.
//!
//! Purely identifier-based and idempotent. Registration rejects ids that are
//! still pending; resolution of an unknown id (already resolved, expired, or
//! never sent) is a no-op the caller can log; expiry fails every request
//! past its deadline with [`Error::Timeout`]. Each pending request reaches
//! exactly one terminal resolution.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::warn;

use tabula_wire::{CorrelationId, Event};

use crate::Error;

/// Terminal resolution of a pending request: a host event, or a categorized
/// failure. Both travel the same path.
pub type Outcome = Result<Event, Error>;

struct PendingRequest {
	deadline: Instant,
	/// Original budget, kept for the timeout error.
	ttl: Duration,
	tx: oneshot::Sender<Outcome>,
}

/// Matches outgoing requests to incoming responses by id and enforces
/// deadlines.
#[derive(Default)]
pub struct Correlator {
	pending: HashMap<CorrelationId, PendingRequest>,
}

impl Correlator {
	/// Creates an empty in-flight table.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a pending request with a deadline `ttl` from now.
	///
	/// # Errors
	///
	/// Fails with [`Error::DuplicateCorrelationId`] if `id` is already
	/// pending; the offending resolver is completed with the same error, so
	/// the duplicate is fatal to that request only.
	pub fn register(
		&mut self,
		id: CorrelationId,
		ttl: Duration,
		tx: oneshot::Sender<Outcome>,
	) -> Result<(), Error> {
		match self.pending.entry(id) {
			Entry::Occupied(entry) => {
				let id = entry.key().clone();
				let _ = tx.send(Err(Error::DuplicateCorrelationId(id.clone())));
				Err(Error::DuplicateCorrelationId(id))
			}
			Entry::Vacant(entry) => {
				entry.insert(PendingRequest {
					deadline: Instant::now() + ttl,
					ttl,
					tx,
				});
				Ok(())
			}
		}
	}

	/// Resolves the pending request for `id` with `outcome`.
	///
	/// Returns `false` when `id` is unknown (already resolved, expired, or
	/// never sent); duplicate or late delivery never fires a resolver twice.
	pub fn resolve(&mut self, id: &CorrelationId, outcome: Outcome) -> bool {
		match self.pending.remove(id) {
			Some(request) => {
				// The caller may have dropped its receiver; that is fine.
				let _ = request.tx.send(outcome);
				true
			}
			None => false,
		}
	}

	/// Whether `id` has a pending request.
	#[must_use]
	pub fn is_pending(&self, id: &CorrelationId) -> bool {
		self.pending.contains_key(id)
	}

	/// Fails every request whose deadline has passed with [`Error::Timeout`],
	/// freeing its correlation slot. Returns how many expired.
	pub fn expire(&mut self, now: Instant) -> usize {
		let expired: Vec<CorrelationId> = self
			.pending
			.iter()
			.filter(|(_, request)| request.deadline <= now)
			.map(|(id, _)| id.clone())
			.collect();
		for id in &expired {
			if let Some(request) = self.pending.remove(id) {
				warn!(id = %id, budget_ms = request.ttl.as_millis() as u64, "request expired");
				let _ = request.tx.send(Err(Error::Timeout(request.ttl)));
			}
		}
		expired.len()
	}

	/// Fails every pending request with [`Error::Stopped`]. Invoked when the
	/// bridge loop shuts down so nothing is left ambiguous.
	pub fn fail_all(&mut self) {
		for (_, request) in self.pending.drain() {
			let _ = request.tx.send(Err(Error::Stopped));
		}
	}

	/// Number of requests currently in flight.
	#[must_use]
	pub fn len(&self) -> usize {
		self.pending.len()
	}

	/// Whether nothing is in flight.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use tabula_wire::{TableChanged, VersionToken};

	use super::*;

	fn changed() -> Event {
		Event::TableChanged(TableChanged {
			table: "Patient".into(),
			version: VersionToken("v2".into()),
		})
	}

	#[tokio::test]
	async fn duplicate_registration_rejected() {
		let mut correlator = Correlator::new();
		let (tx1, _rx1) = oneshot::channel();
		let (tx2, mut rx2) = oneshot::channel();
		correlator
			.register("ui-0".into(), Duration::from_secs(1), tx1)
			.expect("first registration");
		let err = correlator
			.register("ui-0".into(), Duration::from_secs(1), tx2)
			.expect_err("second registration");
		assert!(matches!(err, Error::DuplicateCorrelationId(_)));
		// The offending request is resolved with the same error; the
		// original stays pending.
		assert!(matches!(
			rx2.try_recv(),
			Ok(Err(Error::DuplicateCorrelationId(_)))
		));
		assert_eq!(correlator.len(), 1);
	}

	#[tokio::test]
	async fn resolution_is_at_most_once() {
		let mut correlator = Correlator::new();
		let (tx, mut rx) = oneshot::channel();
		correlator
			.register("ui-0".into(), Duration::from_secs(1), tx)
			.expect("register");
		assert!(correlator.resolve(&"ui-0".into(), Ok(changed())));
		assert!(!correlator.resolve(&"ui-0".into(), Ok(changed())));
		assert!(rx.try_recv().is_ok());
		assert!(correlator.is_empty());
	}

	#[tokio::test]
	async fn unknown_id_is_a_no_op() {
		let mut correlator = Correlator::new();
		assert!(!correlator.resolve(&"never-sent".into(), Ok(changed())));
	}

	#[tokio::test(start_paused = true)]
	async fn expiry_fails_past_deadline_only() {
		let mut correlator = Correlator::new();
		let (short_tx, mut short_rx) = oneshot::channel();
		let (long_tx, mut long_rx) = oneshot::channel();
		correlator
			.register("ui-0".into(), Duration::from_millis(100), short_tx)
			.expect("register short");
		correlator
			.register("ui-1".into(), Duration::from_millis(500), long_tx)
			.expect("register long");

		tokio::time::advance(Duration::from_millis(200)).await;
		assert_eq!(correlator.expire(Instant::now()), 1);
		assert!(matches!(short_rx.try_recv(), Ok(Err(Error::Timeout(_)))));
		assert!(long_rx.try_recv().is_err());

		// A late response for the expired id no longer matches anything.
		assert!(!correlator.resolve(&"ui-0".into(), Ok(changed())));
		assert!(correlator.is_pending(&"ui-1".into()));
	}

	#[tokio::test]
	async fn fail_all_resolves_everything_with_stopped() {
		let mut correlator = Correlator::new();
		let (tx, mut rx) = oneshot::channel();
		correlator
			.register("ui-0".into(), Duration::from_secs(1), tx)
			.expect("register");
		correlator.fail_all();
		assert!(matches!(rx.try_recv(), Ok(Err(Error::Stopped))));
		assert!(correlator.is_empty());
	}
}
