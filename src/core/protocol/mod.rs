// src/core/protocol/mod.rs

//! Wire-format building blocks shared by the protocol adapters: the framing
//! codecs, the JSON message envelopes, and the per-connection serialized
//! write path.

mod codec;
mod envelope;
mod outbox;

pub use codec::{LineCodec, MessageFrameCodec};
pub use envelope::{RequestEnvelope, ResponseEnvelope, ServerDescriptor};
pub use outbox::{IdleTracker, Outbound, Outbox, RenderFn, drain};
