use crate::error::{Error, ErrorKind};
use exn::{OptionExt, ResultExt};
use orgify_extract::Fingerprint;
use time::UtcDateTime;

/// What a note looked like the last time its output was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub fingerprint: Fingerprint,
    /// Digest of everything outside the note that shaped its output (how its
    /// links and assets resolved).
    pub context: String,
    pub recorded_at: UtcDateTime,
}
impl NoteRecord {
    pub fn new(fingerprint: Fingerprint, context: impl Into<String>) -> Self {
        Self {
            fingerprint,
            context: context.into(),
            recorded_at: UtcDateTime::now(),
        }
    }

    /// Whether a freshly computed fingerprint and context match this record.
    pub fn matches(&self, fingerprint: &Fingerprint, context: &str) -> bool {
        &self.fingerprint == fingerprint && self.context == context
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RecordRow {
    pub identifier: String,
    pub fingerprint: String,
    pub context: String,
    pub recorded_at: i64,
}
impl RecordRow {
    pub fn from_model(identifier: &str, record: &NoteRecord) -> Self {
        Self {
            identifier: identifier.to_string(),
            fingerprint: record.fingerprint.to_string(),
            context: record.context.clone(),
            recorded_at: record.recorded_at.unix_timestamp(),
        }
    }
}
impl TryFrom<RecordRow> for NoteRecord {
    type Error = Error;
    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(Self {
            fingerprint: Fingerprint::from_hex(row.fingerprint).ok_or_raise(|| ErrorKind::InvalidData("fingerprint"))?,
            context: row.context,
            recorded_at: UtcDateTime::from_unix_timestamp(row.recorded_at)
                .or_raise(|| ErrorKind::InvalidData("record date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_row_round_trip() {
        let record = NoteRecord::new(Fingerprint::compute("# Note", "md>org"), "ctx");
        let row = RecordRow::from_model("0190-id", &record);
        assert_eq!(row.identifier, "0190-id");
        let back = NoteRecord::try_from(row).unwrap();
        assert_eq!(back.fingerprint, record.fingerprint);
        assert_eq!(back.context, "ctx");
        assert_eq!(back.recorded_at.unix_timestamp(), record.recorded_at.unix_timestamp());
    }

    #[test]
    fn test_invalid_fingerprint_row() {
        let row = RecordRow {
            identifier: "id".into(),
            fingerprint: "nope".into(),
            context: String::new(),
            recorded_at: 0,
        };
        let err = NoteRecord::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("fingerprint")));
    }

    #[test]
    fn test_matches() {
        let fingerprint = Fingerprint::compute("# Note", "md>org");
        let record = NoteRecord::new(fingerprint.clone(), "ctx");
        assert!(record.matches(&fingerprint, "ctx"));
        assert!(!record.matches(&fingerprint, "other"));
        assert!(!record.matches(&Fingerprint::compute("# Other", "md>org"), "ctx"));
    }
}
