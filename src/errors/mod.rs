//! # Error Handling
//!
//! Crate-level error handling. Each domain module owns its own error enum
//! (`SecretsError`, `AuthError`, `TokenError`); this module ties them together.

pub mod types;

pub use types::{MeshguardError, Result};

/// Short alias used by callers that only need the crate error type.
pub type Error = MeshguardError;
