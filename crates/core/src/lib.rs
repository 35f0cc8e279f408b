// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cdx-core: protocol-neutral types for the Codex agent transport.
//!
//! Everything here is pure: the event envelope, the method → event-type
//! dictionary, payload normalizers, and the legacy-mirror detector. No I/O,
//! no async. The transport crate (`cdx-client`) drives these from its read
//! loop.

pub mod event;
pub mod id;

pub use event::methods::{event_type_for_method, MethodMatch};
pub use event::normalize::{
    extract_turn_id, is_retryable_stream_error, legacy_mirror, normalize_error_payload,
    LegacyMirror,
};
pub use event::{background_payload, types, AgentEvent, BackgroundStatus, DenyFn, RespondErrorFn};
pub use id::{short, AgentId};
