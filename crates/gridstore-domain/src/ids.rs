//! Sortable identifier generation.
//!
//! Records, link edges and schema entities all use 26-character Crockford
//! base32 identifiers that sort lexicographically in generation order
//! within a process and are URL-safe.

use std::sync::{LazyLock, Mutex};

use ulid::{Generator, Ulid};

/// Process-wide generator; guarantees strictly increasing ids even when two
/// calls land in the same millisecond.
static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generate a new identifier.
#[must_use]
pub fn generate() -> String {
    let mut generator = match GENERATOR.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    generator
        .generate()
        // The monotonic counter can overflow within one millisecond; a fresh
        // random ulid still satisfies uniqueness and coarse ordering.
        .unwrap_or_else(|_| Ulid::new())
        .to_string()
}

/// Whether `s` has the shape of an engine-generated identifier.
#[must_use]
pub fn is_generated(s: &str) -> bool {
    s.len() == 26 && Ulid::from_string(s).is_ok()
}

/// Mask an id for logging — shows first 8 chars + "...".
#[must_use]
pub fn mask(id: &str) -> String {
    if id.len() <= 8 {
        id.to_owned()
    } else {
        format!("{}...", &id[..8])
    }
}
