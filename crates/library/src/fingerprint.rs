use orgify_cache::error::Result;
use orgify_cache::{NoteRecord, StoreHandle};
use orgify_convert::ConversionOptions;
use orgify_extract::{Fingerprint, Note};

/// Change detection for notes.
///
/// A note's fingerprint covers its source bytes and every conversion option
/// that can change the converter's output. After a note is written, its
/// fingerprint is recorded under the note's identifier together with a digest
/// of how its links resolved, so an unchanged note can be skipped next run.
#[derive(Clone)]
pub struct FingerprintStore {
    store: StoreHandle,
    options_key: String,
}

impl FingerprintStore {
    pub fn new(store: StoreHandle, options: &ConversionOptions) -> Self {
        Self {
            store,
            options_key: options.cache_key(),
        }
    }

    pub fn fingerprint(&self, note: &Note) -> Fingerprint {
        Fingerprint::compute(&note.source, &self.options_key)
    }

    /// Whether the note differs from what was last written for `identifier`.
    /// Notes that were never written have always changed.
    pub async fn has_changed(&self, identifier: &str, fingerprint: &Fingerprint, context: &str) -> Result<bool> {
        Ok(match self.store.last_record(identifier).await? {
            Some(record) => !record.matches(fingerprint, context),
            None => true,
        })
    }

    pub async fn record(&self, identifier: &str, fingerprint: &Fingerprint, context: &str) -> Result<()> {
        self.store.record(identifier, &NoteRecord::new(fingerprint.clone(), context)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgify_cache::MemoryStore;
    use std::sync::Arc;

    fn note(source: &str) -> Note {
        Note::parse("Alpha.md", source.as_bytes()).unwrap()
    }

    #[tokio::test]
    async fn test_change_detection() {
        let fingerprints = FingerprintStore::new(Arc::new(MemoryStore::new()), &ConversionOptions::default());
        let alpha = note("# Alpha");
        let fingerprint = fingerprints.fingerprint(&alpha);
        assert!(fingerprints.has_changed("id-1", &fingerprint, "ctx").await.unwrap());

        fingerprints.record("id-1", &fingerprint, "ctx").await.unwrap();
        assert!(!fingerprints.has_changed("id-1", &fingerprint, "ctx").await.unwrap());
        assert!(fingerprints.has_changed("id-1", &fingerprint, "other links").await.unwrap());

        let edited = fingerprints.fingerprint(&note("# Alphb"));
        assert!(fingerprints.has_changed("id-1", &edited, "ctx").await.unwrap());
    }

    #[test]
    fn test_options_are_part_of_the_fingerprint() {
        let store: StoreHandle = Arc::new(MemoryStore::new());
        let default = FingerprintStore::new(Arc::clone(&store), &ConversionOptions::default());
        let gfm = FingerprintStore::new(store, &ConversionOptions {
            from: "gfm".to_string(),
            ..ConversionOptions::default()
        });
        let alpha = note("# Alpha");
        assert_ne!(default.fingerprint(&alpha), gfm.fingerprint(&alpha));
        // `maintenance::prune` fingerprints unparsed bytes; both must agree.
        let key = ConversionOptions::default().cache_key();
        assert_eq!(default.fingerprint(&alpha), Fingerprint::compute(b"# Alpha", &key));
    }
}
