//! Second pass: turn one prepared note into an Org-roam file.

use crate::Context;
use crate::assets::{AssetCopier, AssetIndex, AssetResolver, CopyAction};
use crate::fingerprint::FingerprintStore;
use crate::links::{LinkResolver, NoteIndex};
use crate::pipeline::error::{ErrorKind, Result};
use crate::pipeline::prepare::Prepared;
use crate::properties::transform;
use crate::report::{NoteResult, Outcome, Warning};
use crate::vault::Vault;
use exn::ResultExt;
use orgify_convert::{Converter, Retrying};
use orgify_extract::{Fingerprint, Note};
use std::path::Path;
use tracing::instrument;

/// What every note in the second pass shares.
pub(crate) struct Batch<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) vault: &'a Vault,
    pub(crate) converter: Retrying,
    pub(crate) fingerprints: FingerprintStore,
    pub(crate) notes: NoteIndex,
    pub(crate) assets: AssetIndex,
    pub(crate) copier: AssetCopier,
}

/// Converts and writes one note.
///
/// Failures that only concern this note come back as a failed
/// [`NoteResult`]; only [fatal](ErrorKind::is_fatal) errors are returned as
/// `Err`.
#[instrument(skip_all, fields(note = %prepared.note.path.display(), id = %prepared.identifier))]
pub(crate) async fn process_note(batch: &Batch<'_>, prepared: Prepared) -> Result<NoteResult> {
    let mut warnings = prepared.warnings.clone();
    match process_note_inner(batch, &prepared, &mut warnings).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Processed note");
            Ok(NoteResult {
                path: prepared.note.path,
                outcome,
                warnings,
            })
        },
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => Ok(NoteResult::failed(prepared.note.path, (*err).to_string(), warnings)),
    }
}

async fn process_note_inner(batch: &Batch<'_>, prepared: &Prepared, warnings: &mut Vec<Warning>) -> Result<Outcome> {
    let ctx = batch.ctx;
    let note = &prepared.note;
    let links = LinkResolver::new(&batch.notes);
    let assets = AssetResolver::new(&batch.assets, &ctx.settings.assets_dir);

    let fingerprint = batch.fingerprints.fingerprint(note);
    let (mut context, mut preview_warnings) = links.preview(note);
    let (asset_context, kept_assets, asset_warnings) = assets.preview(note);
    context.extend(asset_context);
    preview_warnings.extend(asset_warnings);
    let context = blake3::hash(context.join("\n").as_bytes()).to_hex().to_string();

    if !ctx.settings.force && is_up_to_date(batch, prepared, &fingerprint, &context).await {
        tracing::trace!("Output up to date");
        // Assets can change without the note changing.
        for action in &kept_assets {
            copy_asset(batch, action).await?;
        }
        warnings.extend(preview_warnings);
        return Ok(Outcome::SkippedUnchanged);
    }

    let (raw, cached) = match cached_output(ctx, &fingerprint).await {
        Some(raw) => (raw, true),
        None => (convert(batch, note, &fingerprint).await?, false),
    };

    let (block, body) = transform(note, &prepared.identifier, &raw, ctx.settings.section_tags);
    let (body, link_warnings) = links.resolve_links(note, &body);
    let (body, copies, asset_warnings) = assets.resolve_assets(note, &prepared.output_path, &body);
    warnings.extend(link_warnings);
    warnings.extend(asset_warnings);

    for action in &copies {
        copy_asset(batch, action).await?;
    }
    write(ctx, &prepared.output_path, format!("{block}\n{body}").as_bytes()).await?;

    if let Err(err) = batch.fingerprints.record(&prepared.identifier, &fingerprint, &context).await {
        tracing::warn!(error = ?err, "Failed to record fingerprint; note will be rewritten next run");
    }
    Ok(if cached { Outcome::CacheHitWritten } else { Outcome::Written })
}

/// The note can be skipped when its output still exists and neither its
/// source nor the way its references resolve has changed.
async fn is_up_to_date(batch: &Batch<'_>, prepared: &Prepared, fingerprint: &Fingerprint, context: &str) -> bool {
    match batch.ctx.output.exists(&prepared.output_path).await {
        Ok(true) => {},
        Ok(false) => return false,
        Err(err) => {
            tracing::debug!(error = ?err, "Could not check for existing output");
            return false;
        },
    }
    match batch.fingerprints.has_changed(&prepared.identifier, fingerprint, context).await {
        Ok(changed) => !changed,
        Err(err) => {
            tracing::warn!(error = ?err, "Fingerprint lookup failed; converting anyway");
            false
        },
    }
}

/// A failing cache is a missing cache.
async fn cached_output(ctx: &Context, fingerprint: &Fingerprint) -> Option<String> {
    match ctx.store.lookup(fingerprint).await {
        Ok(hit) => hit,
        Err(err) => {
            tracing::warn!(error = ?err, "Cache lookup failed");
            None
        },
    }
}

async fn convert(batch: &Batch<'_>, note: &Note, fingerprint: &Fingerprint) -> Result<String> {
    let ctx = batch.ctx;
    let raw = match batch.converter.convert(&note.body, &ctx.options).await {
        Ok(raw) => raw,
        Err(err) if err.is_fatal() => return Err(err).or_raise(|| ErrorKind::ConverterUnavailable),
        Err(err) => {
            let reason = (*err).to_string();
            return Err(err).or_raise(|| ErrorKind::Convert(reason));
        },
    };
    if let Err(err) = ctx.store.store(fingerprint, &raw).await {
        tracing::warn!(error = ?err, "Failed to cache converter output");
    }
    Ok(raw)
}

async fn copy_asset(batch: &Batch<'_>, action: &CopyAction) -> Result<()> {
    match batch.copier.copy(batch.vault, &*batch.ctx.output, action).await {
        Ok(status) => {
            tracing::trace!(?status, destination = %action.destination.display(), "Asset handled");
            Ok(())
        },
        Err(err) if err.is_unwritable() => Err(err).or_raise(|| ErrorKind::Unwritable(action.destination.clone())),
        Err(err) => {
            let reason = format!("{}: {}", action.source.display(), *err);
            Err(err).or_raise(|| ErrorKind::Asset(reason))
        },
    }
}

async fn write(ctx: &Context, path: &Path, document: &[u8]) -> Result<()> {
    match ctx.output.write(path, document).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_unwritable() => Err(err).or_raise(|| ErrorKind::Unwritable(path.to_path_buf())),
        Err(err) => {
            let reason = (*err).to_string();
            Err(err).or_raise(|| ErrorKind::Write(reason))
        },
    }
}
