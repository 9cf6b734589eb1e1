//! Length-prefixed frame codec and request/response envelopes for scopewire.
//!
//! Every message on the wire is framed as:
//! - A 4-byte big-endian payload length
//! - The payload itself (UTF-8 JSON)
//!
//! The payload is one of two envelope shapes, disambiguated structurally:
//! a request carries a mandatory `identifier` field, a reply carries only
//! `payload`. No partial reads, no buffer management in user code.

pub mod codec;
pub mod envelope;
pub mod error;

pub use codec::{encode_frame, FrameConfig, FrameReader, FrameWriter, LEN_PREFIX_SIZE, MAX_FRAME_LEN};
pub use envelope::{Envelope, RequestEnvelope, ResponseEnvelope};
pub use error::{FrameError, Result};
