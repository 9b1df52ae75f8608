//! Wire framing for the sync and awareness channels (spec §4.1).
//!
//! Every websocket binary message is one frame: a var-length message type
//! followed by a payload whose shape depends on that type. Sync frames carry
//! a further sub-tag so a state-vector request, an update reply, and an
//! unsolicited incremental update share one channel without ambiguity —
//! this mirrors the `y-protocols/sync` convention so the byte layout stays
//! readable by a plain Yjs client on the other end.

use notebook_types::prelude::*;
use yrs::StateVector;
use yrs::updates::decoder::Decode;

use crate::varint::{decode_bytes, decode_var_u64, encode_bytes, encode_var_u64};

const MESSAGE_SYNC: u64 = 0;
const MESSAGE_AWARENESS: u64 = 1;
const MESSAGE_AUTH: u64 = 2;

const SYNC_STEP1: u64 = 0;
const SYNC_STEP2: u64 = 1;
const SYNC_UPDATE: u64 = 2;

/// A decoded frame from either peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
	/// Peer's state vector, sent so the receiver can answer with a diff.
	SyncStep1(Vec<u8>),
	/// A full-or-partial update answering a `SyncStep1`.
	SyncStep2(Vec<u8>),
	/// An unsolicited incremental update (a local edit propagated).
	Update(Vec<u8>),
	/// Opaque awareness payload (spec §4.3), JSON-encoded by convention but
	/// carried as raw bytes here so malformed JSON never tears the socket.
	Awareness(Vec<u8>),
	/// Reserved message family (spec §4.1: "AUTH is reserved and ignored").
	/// Authentication is handled out-of-band by the gateway's token check, so
	/// this frame always decodes cleanly and is a no-op everywhere it's matched.
	Auth(Vec<u8>),
}

pub fn encode_sync_step1(sv: &StateVector) -> Vec<u8> {
	encode_sync_frame(SYNC_STEP1, &sv.encode_v1())
}

pub fn encode_sync_step2(update: &[u8]) -> Vec<u8> {
	encode_sync_frame(SYNC_STEP2, update)
}

pub fn encode_update(update: &[u8]) -> Vec<u8> {
	encode_sync_frame(SYNC_UPDATE, update)
}

fn encode_sync_frame(sub_type: u64, payload: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(payload.len() + 8);
	encode_var_u64(MESSAGE_SYNC, &mut out);
	encode_var_u64(sub_type, &mut out);
	encode_bytes(payload, &mut out);
	out
}

pub fn encode_awareness(payload: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(payload.len() + 4);
	encode_var_u64(MESSAGE_AWARENESS, &mut out);
	encode_bytes(payload, &mut out);
	out
}

/// Parse a binary websocket message into a [`Frame`]. Per spec §4.1's edge
/// case handling, callers should drop the single frame and keep the
/// connection open on [`Error::MalformedFrame`], never closing the socket.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
	let (msg_type, consumed) = decode_var_u64(bytes).ok_or(Error::MalformedFrame)?;
	let rest = &bytes[consumed..];

	match msg_type {
		MESSAGE_SYNC => {
			let (sub_type, consumed) = decode_var_u64(rest).ok_or(Error::MalformedFrame)?;
			let (payload, _) = decode_bytes(&rest[consumed..]).ok_or(Error::MalformedFrame)?;
			match sub_type {
				SYNC_STEP1 => Ok(Frame::SyncStep1(payload.to_vec())),
				SYNC_STEP2 => Ok(Frame::SyncStep2(payload.to_vec())),
				SYNC_UPDATE => Ok(Frame::Update(payload.to_vec())),
				_ => Err(Error::MalformedFrame),
			}
		}
		MESSAGE_AWARENESS => {
			let (payload, _) = decode_bytes(rest).ok_or(Error::MalformedFrame)?;
			Ok(Frame::Awareness(payload.to_vec()))
		}
		MESSAGE_AUTH => {
			let (payload, _) = decode_bytes(rest).ok_or(Error::MalformedFrame)?;
			Ok(Frame::Auth(payload.to_vec()))
		}
		_ => Err(Error::MalformedFrame),
	}
}

/// Decode a `SyncStep1` payload back into a `StateVector`.
pub fn decode_state_vector(payload: &[u8]) -> Result<StateVector> {
	StateVector::decode_v1(payload).map_err(|_| Error::MalformedFrame)
}


// vim: ts=4
