//! Bridge main loop and the clone-able handle that feeds it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use tabula_wire::{Command, CommandEnvelope, CorrelationIdGen, Event, EventEnvelope, codec};

use crate::correlate::{Correlator, Outcome};
use crate::transport::Transport;
use crate::{Error, Result};

/// Tunables for the bridge loop.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
	/// How often the in-flight table is scanned for expired deadlines.
	pub expiry_tick: Duration,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			expiry_tick: Duration::from_millis(25),
		}
	}
}

impl BridgeConfig {
	/// Set the expiry scan interval.
	#[must_use]
	pub fn expiry_tick(mut self, tick: Duration) -> Self {
		self.expiry_tick = tick;
		self
	}
}

/// Internal events from handles to the main loop.
enum LoopEvent {
	Request {
		command: Command,
		ttl: Duration,
		tx: oneshot::Sender<Outcome>,
	},
}

/// Main loop driver for one side of the bridge.
///
/// Owns the transport, the correlation table, and the id generator; runs a
/// single logical event loop so no cross-task locking guards the in-flight
/// state. Dropping the last [`BridgeHandle`] (and the host side of the
/// transport) ends the loop; every still-pending request then resolves with
/// [`Error::Stopped`].
pub struct BridgeLoop<T: Transport> {
	/// The underlying channel to the host.
	transport: T,
	/// Raw inbound messages, taken from the transport once.
	inbound: mpsc::UnboundedReceiver<JsonValue>,
	/// Receiver for internal events from handles.
	rx: mpsc::UnboundedReceiver<LoopEvent>,
	/// In-flight request table.
	correlator: Correlator,
	/// Counter for outgoing correlation ids.
	id_gen: CorrelationIdGen,
	/// Unsolicited host events, forwarded to the UI collaborator.
	events_tx: mpsc::UnboundedSender<EventEnvelope>,
	config: BridgeConfig,
}

impl<T: Transport> BridgeLoop<T> {
	/// Creates a bridge loop over `transport` with default config.
	#[must_use]
	pub fn new(transport: T) -> (Self, BridgeHandle) {
		Self::with_config(transport, BridgeConfig::default())
	}

	/// Creates a bridge loop over `transport`.
	#[must_use]
	pub fn with_config(mut transport: T, config: BridgeConfig) -> (Self, BridgeHandle) {
		let inbound = transport.take_inbound();
		let (tx, rx) = mpsc::unbounded_channel();
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let this = Self {
			transport,
			inbound,
			rx,
			correlator: Correlator::new(),
			id_gen: CorrelationIdGen::new(),
			events_tx,
			config,
		};
		let handle = BridgeHandle {
			tx,
			events: Arc::new(Mutex::new(Some(events_rx))),
		};
		(this, handle)
	}

	/// Drives the bridge until the UI side or the transport goes away.
	pub async fn run(mut self) {
		let mut tick = tokio::time::interval(self.config.expiry_tick);
		tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				biased;

				event = self.rx.recv() => match event {
					Some(event) => self.dispatch_event(event),
					None => break,
				},

				raw = self.inbound.recv() => match raw {
					Some(raw) => self.dispatch_inbound(&raw),
					None => break,
				},

				_ = tick.tick() => {
					self.correlator.expire(Instant::now());
				}
			}
		}

		self.correlator.fail_all();
	}

	/// Routes an internal event from a handle.
	fn dispatch_event(&mut self, event: LoopEvent) {
		match event {
			LoopEvent::Request { command, ttl, tx } => {
				// Free any expired slots before taking a new one.
				self.correlator.expire(Instant::now());

				let id = self.id_gen.next();
				if let Err(error) = self.correlator.register(id.clone(), ttl, tx) {
					// Counter ids never repeat while pending; reaching this
					// is a defect, but it fails the offending request only.
					warn!(%error, "failed to register outgoing request");
					return;
				}

				let envelope = CommandEnvelope::new(id.clone(), command);
				if self.transport.send(codec::encode_command(&envelope)).is_err() {
					self.correlator.resolve(&id, Err(Error::Stopped));
				}
			}
		}
	}

	/// Routes a raw inbound message: validate, then correlate or forward.
	fn dispatch_inbound(&mut self, raw: &JsonValue) {
		let envelope = match codec::decode_event(raw) {
			Ok(envelope) => envelope,
			Err(error) => {
				// Malformed input never crashes the loop and never touches
				// a pending request.
				warn!(%error, "dropping malformed envelope");
				return;
			}
		};

		if self.correlator.is_pending(&envelope.id) {
			let outcome = match envelope.event {
				Event::Error(host) => Err(Error::Host(host)),
				event => Ok(event),
			};
			self.correlator.resolve(&envelope.id, outcome);
		} else if matches!(envelope.event, Event::TableChanged(_)) {
			// Unsolicited host event; flows to the UI, not the correlator.
			let _ = self.events_tx.send(envelope);
		} else {
			// Duplicate or late delivery for a resolved/expired id.
			debug!(id = %envelope.id, "response for unknown correlation id, ignoring");
		}
	}
}

/// Clone-able request API feeding a [`BridgeLoop`].
#[derive(Debug, Clone)]
pub struct BridgeHandle {
	tx: mpsc::UnboundedSender<LoopEvent>,
	/// Unsolicited host event stream (single-take).
	events: Arc<Mutex<Option<mpsc::UnboundedReceiver<EventEnvelope>>>>,
}

impl BridgeHandle {
	/// Issues a command and awaits its correlated outcome.
	///
	/// Returns immediately with a future; resolution arrives through the
	/// correlation manager as a host event, a host-reported failure, or
	/// [`Error::Timeout`] once `ttl` elapses without a response.
	///
	/// # Errors
	///
	/// [`Error::Stopped`] when the bridge loop is gone, otherwise the
	/// categorized failure resolved for this request.
	pub async fn request(&self, command: Command, ttl: Duration) -> Result<Event> {
		let (tx, rx) = oneshot::channel();
		self.tx
			.send(LoopEvent::Request { command, ttl, tx })
			.map_err(|_| Error::Stopped)?;
		rx.await.map_err(|_| Error::Stopped)?
	}

	/// Takes the unsolicited host event stream.
	///
	/// # Panics
	///
	/// Panics when called twice; there is a single inbound dispatcher per
	/// UI surface instance.
	#[must_use]
	pub fn take_events(&self) -> mpsc::UnboundedReceiver<EventEnvelope> {
		self.events
			.lock()
			.expect("events mutex poisoned")
			.take()
			.expect("take_events called twice on BridgeHandle")
	}
}
