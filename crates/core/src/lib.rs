//! `carehub-core`: payload conventions shared across the client.
//!
//! This crate contains **pure** helpers (no IO): the backend's `success`
//! envelope, session-token aliasing and the canonical error payload.

pub mod envelope;
pub mod error;

pub use envelope::{TOKEN_FIELDS, data, extract_token, is_failure};
pub use error::{ErrorPayload, UNKNOWN_ERROR_MESSAGE};
