//! Content hashing for amendments

use sha2::{Digest, Sha256};

/// Incremental SHA-256 over a sequence of string fields.
///
/// Every field is length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// never collide; absent optional fields hash differently from empty ones.
#[derive(Default)]
pub struct ContentHasher {
    hasher: Sha256,
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, value: &str) -> &mut Self {
        self.hasher.update((value.len() as u64).to_le_bytes());
        self.hasher.update(value.as_bytes());
        self
    }

    pub fn optional(&mut self, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => {
                self.hasher.update([1u8]);
                self.field(v)
            },
            None => {
                self.hasher.update([0u8]);
                self
            },
        }
    }

    /// Hex-encoded digest
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
