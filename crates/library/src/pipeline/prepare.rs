//! First pass: read and parse every note, then give each one an identifier
//! and an output path before anything is converted.

use crate::Context;
use crate::pipeline::error::{ErrorKind, Result};
use crate::registry::IdentifierRegistry;
use crate::report::{NoteResult, Warning, WarningKind};
use crate::vault::Vault;
use exn::ResultExt;
use futures::StreamExt;
use orgify_extract::Note;
use orgify_storage::FileInfo;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// A note that made it through the first pass.
#[derive(Debug)]
pub(crate) struct Prepared {
    pub(crate) note: Note,
    pub(crate) identifier: String,
    /// Path in the output tree, extension included.
    pub(crate) output_path: PathBuf,
    /// Raised while parsing and assigning; carried into the note's result.
    pub(crate) warnings: Vec<Warning>,
}

pub(crate) struct Assigned {
    pub(crate) prepared: Vec<Prepared>,
    /// Notes that already failed; they take no further part in the run.
    pub(crate) failed: Vec<NoteResult>,
    /// Identifiers created or changed by this run.
    pub(crate) saved: usize,
}

/// Reads and parses `files` concurrently. Results come back sorted by path
/// whatever order they finished in.
#[instrument(skip_all, fields(count = files.len()))]
pub(crate) async fn read_notes(ctx: &Context, vault: &Vault, files: Vec<FileInfo>) -> Vec<(PathBuf, Result<Note>)> {
    let mut parsed: Vec<_> = futures::stream::iter(files)
        .map(|info| async move {
            let note = read_note(vault, &info.path).await;
            (info.path, note)
        })
        .buffer_unordered(ctx.settings.concurrency())
        .collect()
        .await;
    parsed.sort_by(|a, b| a.0.cmp(&b.0));
    parsed
}

async fn read_note(vault: &Vault, path: &Path) -> Result<Note> {
    let bytes = match vault.read_note(path).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let reason = (*err).to_string();
            return Err(err).or_raise(|| ErrorKind::Unreadable(reason));
        },
    };
    match Note::parse(path, &bytes) {
        Ok(note) => Ok(note),
        Err(err) => {
            let reason = (*err).to_string();
            Err(err).or_raise(|| ErrorKind::Malformed(reason))
        },
    }
}

/// Assigns identifiers in path order, so the same vault always gets the same
/// answer, then persists the registry. This is the barrier between passes:
/// nothing is converted until every identifier is known.
#[instrument(skip_all)]
pub(crate) async fn assign_identifiers(ctx: &Context, parsed: Vec<(PathBuf, Result<Note>)>, extension: &str) -> Result<Assigned> {
    let mut registry = IdentifierRegistry::load(&*ctx.store).await.or_raise(|| ErrorKind::Registry)?;
    let mut outputs: HashMap<String, PathBuf> = HashMap::new();
    let mut prepared = Vec::with_capacity(parsed.len());
    let mut failed = Vec::new();

    for (path, note) in parsed {
        let note = match note {
            Ok(note) => note,
            Err(err) => {
                failed.push(NoteResult::failed(path, (*err).to_string(), vec![]));
                continue;
            },
        };
        let assignment = registry.assign(&note);
        let mut warnings: Vec<Warning> =
            note.duplicate_keys.iter().map(|key| Warning::new(&note.path, key, WarningKind::DuplicateKey)).collect();
        if let Some(owner) = assignment.conflict {
            let requested = note.metadata.id().unwrap_or_default();
            warnings.push(Warning::new(&note.path, requested, WarningKind::DuplicateIdentifier { owner }));
        }

        let output_path = match ctx.template.generate_with_ext(&note, &assignment.identifier, extension) {
            Ok(path) => PathBuf::from(path),
            Err(err) => {
                let reason = ErrorKind::OutputPath((*err).to_string()).to_string();
                failed.push(NoteResult::failed(&note.path, reason, warnings));
                continue;
            },
        };
        // Case-insensitive filesystems would merge these, so treat them as one.
        match outputs.entry(output_path.to_string_lossy().to_lowercase()) {
            Entry::Occupied(owner) => {
                let reason = ErrorKind::OutputCollision {
                    path: output_path,
                    owner: owner.get().clone(),
                };
                failed.push(NoteResult::failed(&note.path, reason.to_string(), warnings));
                continue;
            },
            Entry::Vacant(slot) => {
                slot.insert(note.path.clone());
            },
        }

        prepared.push(Prepared {
            note,
            identifier: assignment.identifier,
            output_path,
            warnings,
        });
    }

    let saved = registry.persist(&*ctx.store).await.or_raise(|| ErrorKind::Registry)?;
    tracing::debug!(notes = prepared.len(), saved, "Assigned identifiers");
    Ok(Assigned { prepared, failed, saved })
}
