use derive_more::Display;

/// Digest of a note's source bytes together with the conversion options in
/// effect. Identical bytes and options always give the same fingerprint.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("{_0}")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// `options_key` must change whenever any option that affects converter
    /// output changes.
    pub fn compute(source: impl AsRef<[u8]>, options_key: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(options_key.as_bytes());
        hasher.update(&[0]);
        hasher.update(source.as_ref());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Rebuild a fingerprint read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Option<Self> {
        let hex = hex.into();
        (hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())).then_some(Self(hex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = Fingerprint::compute("# Note", "markdown>org");
        let b = Fingerprint::compute("# Note", "markdown>org");
        assert_eq!(a, b);
        assert_eq!(Fingerprint::from_hex(a.to_string()), Some(a));
    }

    #[test]
    fn test_sensitive_to_source_and_options() {
        let base = Fingerprint::compute("# Note", "markdown>org");
        assert_ne!(base, Fingerprint::compute("# Notf", "markdown>org"));
        assert_ne!(base, Fingerprint::compute("# Note", "markdown>org --wrap=none"));
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(Fingerprint::from_hex("abc").is_none());
        assert!(Fingerprint::from_hex("z".repeat(64)).is_none());
    }
}
