//! Value-level encryption: the envelope format, the AES-256-GCM engine and the
//! read-only legacy CBC adapter.
//!
//! This module is free of HTTP and configuration dependencies.
//!
//! # Envelope versions
//!
//! | version | algorithm    | iv       | tag      | direction  |
//! |---------|--------------|----------|----------|------------|
//! | 1       | AES-256-CBC  | 16 bytes | none     | read only  |
//! | 2       | AES-256-GCM  | 12 bytes | 16 bytes | read/write |

pub mod engine;
pub mod envelope;
pub(crate) mod legacy;

pub use engine::{CipherEngine, ALGORITHM};
pub use envelope::{Envelope, EnvelopeError, EnvelopeVersion};
