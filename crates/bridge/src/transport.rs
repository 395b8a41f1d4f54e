//! Bridge transport abstraction.

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;

use crate::Result;

/// A two-way addressable link over a one-way postMessage-style channel.
///
/// The transport offers no delivery guarantees or acknowledgment semantics:
/// arrival order may differ from send order across distinct requests, so all
/// matching happens by correlation id upstream, never by arrival sequence.
/// Messages travel as raw JSON; the codec validates them on the way in.
pub trait Transport: Send + 'static {
	/// Fire-and-forget dispatch of a raw message toward the host.
	///
	/// # Errors
	///
	/// Fails with [`Error::Stopped`](crate::Error::Stopped) when the
	/// underlying channel is gone.
	fn send(&mut self, message: JsonValue) -> Result<()>;

	/// Takes the single inbound receiver.
	///
	/// There is exactly one underlying channel per UI surface instance and
	/// exactly one inbound dispatcher: the bridge loop takes the receiver
	/// once during initialization.
	///
	/// # Panics
	///
	/// Panics when called twice; replacing an installed dispatcher would
	/// silently discard the previous registration.
	fn take_inbound(&mut self) -> mpsc::UnboundedReceiver<JsonValue>;
}
