//! Websocket provider: owns the connection to the gateway's `/ws/:notebookId`
//! endpoint, reconnecting with backoff and replaying frames both ways.
//!
//! Grounded on the connection-wrapper shape of `WebSocketTransport` in the
//! `nvim-web` host crate (split send/receive, an `AtomicBool` connected
//! flag) adapted from a server-side accepted socket to a client dialing out
//! with `tokio-tungstenite`, and gated so it never dials until bootstrap
//! tells it to (spec §4.4 step 2: "`connect=false` so websocket traffic
//! cannot arrive before bootstrap completes").

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use notebook_crdt::protocol::decode_frame;
use notebook_crdt::Frame;
use notebook_types::prelude::*;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub struct WsProvider {
	connect_gate: watch::Sender<bool>,
	connected: Arc<AtomicBool>,
	outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl WsProvider {
	/// Build a provider with `connect=false`; call [`WsProvider::connect`]
	/// once bootstrap has finished applying the initial snapshot.
	pub fn new(url: impl Into<Box<str>>, inbound: mpsc::UnboundedSender<Frame>) -> Self {
		let (connect_gate_tx, connect_gate_rx) = watch::channel(false);
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let connected = Arc::new(AtomicBool::new(false));

		tokio::spawn(run(url.into(), connect_gate_rx, outbound_rx, inbound, connected.clone()));

		WsProvider { connect_gate: connect_gate_tx, connected, outbound: outbound_tx }
	}

	pub fn connect(&self) {
		let _ = self.connect_gate.send(true);
	}

	pub fn disconnect(&self) {
		let _ = self.connect_gate.send(false);
	}

	pub fn is_connected(&self) -> bool {
		self.connected.load(Ordering::Relaxed)
	}

	pub fn send(&self, bytes: Vec<u8>) {
		let _ = self.outbound.send(bytes);
	}
}

async fn run(
	url: Box<str>,
	mut connect_gate: watch::Receiver<bool>,
	mut outbound_rx: mpsc::UnboundedReceiver<Vec<u8>>,
	inbound_tx: mpsc::UnboundedSender<Frame>,
	connected: Arc<AtomicBool>,
) {
	let mut backoff = INITIAL_BACKOFF;

	loop {
		if !*connect_gate.borrow() {
			if connect_gate.changed().await.is_err() {
				return;
			}
			continue;
		}

		match tokio_tungstenite::connect_async(url.as_ref()).await {
			Ok((stream, _response)) => {
				info!(%url, "websocket connected");
				connected.store(true, Ordering::Relaxed);
				backoff = INITIAL_BACKOFF;
				let (mut write, mut read) = stream.split();

				loop {
					tokio::select! {
						changed = connect_gate.changed() => {
							if changed.is_err() || !*connect_gate.borrow() {
								let _ = write.close().await;
								connected.store(false, Ordering::Relaxed);
								break;
							}
						}
						outbound = outbound_rx.recv() => {
							match outbound {
								Some(bytes) => {
									if write.send(Message::Binary(bytes.into())).await.is_err() {
										break;
									}
								}
								None => return,
							}
						}
						inbound = read.next() => {
							match inbound {
								Some(Ok(Message::Binary(bytes))) => match decode_frame(&bytes) {
									Ok(frame) => {
										if inbound_tx.send(frame).is_err() {
											return;
										}
									}
									Err(err) => warn!(%err, "dropping malformed frame from gateway"),
								},
								Some(Ok(Message::Close(_))) | None => break,
								Some(Ok(_)) => {}
								Some(Err(err)) => {
									warn!(%err, "websocket read error");
									break;
								}
							}
						}
					}
				}

				connected.store(false, Ordering::Relaxed);
			}
			Err(err) => {
				warn!(%err, %url, "websocket connect failed, retrying");
			}
		}

		if !*connect_gate.borrow() {
			continue;
		}
		tokio::time::sleep(backoff).await;
		backoff = (backoff * 2).min(MAX_BACKOFF);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn provider_starts_disconnected() {
		let (tx, _rx) = mpsc::unbounded_channel();
		let provider = WsProvider::new("ws://127.0.0.1:1/ws/nb-1", tx);
		assert!(!provider.is_connected());
	}
}

// vim: ts=4
