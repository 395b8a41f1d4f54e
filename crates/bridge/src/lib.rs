//! Transport abstraction, correlation manager, and async pump for the
//! tabula UI/host bridge.
//!
//! The underlying channel is a one-way, fire-and-forget postMessage-style
//! link with no delivery or ordering guarantees, so everything here matches
//! responses to requests purely by correlation id:
//! * [`Transport`]: the two-way addressable link over the raw channel
//! * [`Correlator`]: the in-flight request table with deadline expiry
//! * [`BridgeLoop`] / [`BridgeHandle`]: the tokio pump and the clone-able
//!   request API that resolves through it
//! * [`local`]: an in-process transport pair for embedders and tests
//!
//! Duplicate, late, and out-of-order deliveries are all safe: a response for
//! an id that is no longer pending is logged and dropped.

#![warn(missing_docs)]

use std::time::Duration;

use tabula_wire::{CorrelationId, HostError};

pub mod correlate;
pub mod local;
pub mod mainloop;
pub mod transport;

pub use correlate::{Correlator, Outcome};
pub use mainloop::{BridgeConfig, BridgeHandle, BridgeLoop};
pub use transport::Transport;

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible errors resolved through the correlation path.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The bridge loop is gone; nothing will resolve anymore.
	#[error("bridge stopped")]
	Stopped,
	/// An id was registered while still pending. Fatal to the offending
	/// request only.
	#[error("duplicate correlation id `{0}`")]
	DuplicateCorrelationId(CorrelationId),
	/// No response within the request deadline. Retryable; a late host
	/// completion is ignored on arrival.
	#[error("no response within {}ms", .0.as_millis())]
	Timeout(Duration),
	/// The host answered the correlated command with an error payload.
	#[error("host {}: {}", .0.code, .0.message)]
	Host(HostError),
}
