//! In-process transport pair.
//!
//! [`pair`] wires two unbounded channels into a [`Transport`] for the UI
//! side and a [`HostLink`] for the privileged side. Embedders running both
//! sides in one process use it directly; tests use it to script hosts.

use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tracing::warn;

use tabula_wire::{CommandEnvelope, CorrelationId, Event, EventEnvelope, codec};

use crate::transport::Transport;
use crate::{Error, Result};

/// Creates a connected transport pair: the UI-side [`Transport`] and the
/// host-side [`HostLink`].
#[must_use]
pub fn pair() -> (LocalTransport, HostLink) {
	let (to_host, from_ui) = mpsc::unbounded_channel();
	let (to_ui, from_host) = mpsc::unbounded_channel();
	(
		LocalTransport {
			to_host,
			from_host: Some(from_host),
		},
		HostLink {
			to_ui,
			from_ui,
			next_event: 0,
		},
	)
}

/// UI side of an in-process bridge.
pub struct LocalTransport {
	to_host: mpsc::UnboundedSender<JsonValue>,
	from_host: Option<mpsc::UnboundedReceiver<JsonValue>>,
}

impl Transport for LocalTransport {
	fn send(&mut self, message: JsonValue) -> Result<()> {
		self.to_host.send(message).map_err(|_| Error::Stopped)
	}

	fn take_inbound(&mut self) -> mpsc::UnboundedReceiver<JsonValue> {
		self.from_host
			.take()
			.expect("take_inbound called twice on LocalTransport")
	}
}

/// Host side of an in-process bridge.
///
/// Receives validated command envelopes from the UI and sends response or
/// unsolicited event envelopes back.
pub struct HostLink {
	to_ui: mpsc::UnboundedSender<JsonValue>,
	from_ui: mpsc::UnboundedReceiver<JsonValue>,
	/// Counter for unsolicited event ids.
	next_event: u64,
}

impl HostLink {
	/// Next command from the UI, already validated by the codec.
	///
	/// Malformed UI messages are logged and dropped, mirroring the UI-side
	/// policy. Returns `None` once the UI side is gone.
	pub async fn recv(&mut self) -> Option<CommandEnvelope> {
		loop {
			let raw = self.from_ui.recv().await?;
			match codec::decode_command(&raw) {
				Ok(envelope) => return Some(envelope),
				Err(error) => warn!(%error, "host link dropping malformed command"),
			}
		}
	}

	/// Answers the command with the given correlation id.
	///
	/// # Errors
	///
	/// Fails with [`Error::Stopped`] when the UI side is gone.
	pub fn respond(&self, id: CorrelationId, event: Event) -> Result<()> {
		self.send_raw(codec::encode_event(&EventEnvelope::response(id, event)))
	}

	/// Emits an unsolicited event under a fresh host-generated id.
	///
	/// # Errors
	///
	/// Fails with [`Error::Stopped`] when the UI side is gone.
	pub fn emit(&mut self, event: Event) -> Result<()> {
		let id = CorrelationId(format!("host-{}", self.next_event));
		self.next_event += 1;
		self.respond(id, event)
	}

	/// Sends a raw value as-is, bypassing the codec.
	///
	/// Exists so tests (and recovery tooling) can exercise the UI side with
	/// duplicate, late, or malformed traffic.
	///
	/// # Errors
	///
	/// Fails with [`Error::Stopped`] when the UI side is gone.
	pub fn send_raw(&self, raw: JsonValue) -> Result<()> {
		self.to_ui.send(raw).map_err(|_| Error::Stopped)
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use tabula_wire::{Command, PageRequest};

	use super::*;

	#[tokio::test]
	async fn host_link_validates_inbound_commands() {
		let (mut transport, mut host) = pair();
		transport
			.send(json!({"definitely": "not an envelope"}))
			.expect("send garbage");
		transport
			.send(codec::encode_command(&CommandEnvelope::new(
				"ui-0".into(),
				Command::LoadPage(PageRequest {
					table: "Patient".into(),
					offset: 0,
					limit: 50,
				}),
			)))
			.expect("send command");

		// The malformed message is skipped, not surfaced.
		let envelope = host.recv().await.expect("command arrives");
		assert_eq!(envelope.id, "ui-0".into());
	}

	#[tokio::test]
	async fn recv_ends_when_ui_side_drops() {
		let (transport, mut host) = pair();
		drop(transport);
		assert!(host.recv().await.is_none());
	}

	#[tokio::test]
	async fn respond_fails_after_ui_side_drops() {
		let (mut transport, host) = pair();
		let _ = transport.take_inbound();
		drop(transport);
		// Receiver taken and dropped with it.
		assert!(matches!(
			host.respond(
				"ui-0".into(),
				Event::TableChanged(tabula_wire::TableChanged {
					table: "Patient".into(),
					version: tabula_wire::VersionToken("v1".into()),
				})
			),
			Err(Error::Stopped)
		));
	}
}
