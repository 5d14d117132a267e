use crate::assets::{AssetCopier, AssetIndex};
use crate::error::{ErrorKind as LibraryErrorKind, Result as LibraryResult};
use crate::fingerprint::FingerprintStore;
use crate::links::NoteIndex;
use crate::pipeline::error::{ErrorKind as PipelineErrorKind, Result as PipelineResult};
use crate::pipeline::note::{Batch, process_note};
use crate::pipeline::prepare::{assign_identifiers, read_notes};
use crate::report::{NoteResult, Report};
use crate::vault::Vault;
use crate::Context;
use async_stream::stream;
use exn::ResultExt;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use orgify_convert::{ConversionOptions, Converter, Retrying};
use std::collections::VecDeque;
use std::sync::Arc;

/// Progress events emitted by [`convert_vault`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete) exactly once.
/// 3. [`IdentifiersAssigned`](Self::IdentifiersAssigned) exactly once, after
///    the registry has been persisted.
/// 4. [`Processed`](Self::Processed) once per note, including notes that
///    failed in the first pass.
/// 5. [`Complete`](Self::Complete) exactly once, with the batch report.
///
/// A fatal error terminates the stream early, in which case
/// [`Complete`](Self::Complete) is never emitted. A cancelled run still ends
/// with [`Complete`](Self::Complete), with [`Report::cancelled`] set.
#[derive(Debug)]
pub enum PipelineEvent {
    Started,
    /// The vault has been listed.
    DiscoveryComplete { notes: usize, assets: usize },
    /// Every readable note has an identifier and an output path.
    IdentifiersAssigned { notes: usize, saved: usize },
    Processed(NoteResult),
    Complete(Report),
}

/// Streams [`PipelineEvent`]s while converting the vault described by `ctx`.
///
/// Notes are processed concurrently, up to
/// [`Settings::concurrency`](crate::Settings::concurrency) at a time. Per-note
/// failures are reported in [`PipelineEvent::Processed`]; only errors that make
/// the rest of the batch pointless (a missing converter, an unwritable output
/// tree, an unreachable vault or registry) are yielded as `Err`.
pub fn convert_vault(ctx: &Context) -> impl Stream<Item = LibraryResult<PipelineEvent>> + '_ {
    stream! {
        for await event in convert_vault_inner(ctx) {
            yield event.or_raise(|| LibraryErrorKind::Pipeline);
        }
    }
}

fn convert_vault_inner(ctx: &Context) -> impl Stream<Item = PipelineResult<PipelineEvent>> + '_ {
    stream!({
        yield Ok(PipelineEvent::Started);

        let converter = Retrying::new(Arc::clone(&ctx.converter));
        if let Err(e) = converter.verify(&ctx.options).await.or_raise(|| PipelineErrorKind::ConverterUnavailable) {
            yield Err(e);
            return;
        }

        let vault = Vault::new(Arc::clone(&ctx.vault), ctx.settings.walk.clone());
        let listed = async { Ok::<_, crate::error::Error>((vault.list_notes().await?, vault.list_assets().await?)) };
        let (notes, assets) = match listed.await.or_raise(|| PipelineErrorKind::Discovery) {
            Ok(listed) => listed,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        yield Ok(PipelineEvent::DiscoveryComplete { notes: notes.len(), assets: assets.len() });

        let mut report = Report::default();
        let parsed = read_notes(ctx, &vault, notes).await;
        if ctx.cancel.is_cancelled() {
            tracing::warn!("Cancelled before identifiers were assigned");
            report.cancelled = true;
            yield Ok(PipelineEvent::Complete(report));
            return;
        }

        let extension = ConversionOptions::base_format(&ctx.options.to).to_string();
        let assigned = match assign_identifiers(ctx, parsed, &extension).await {
            Ok(assigned) => assigned,
            Err(e) => {
                yield Err(e);
                return;
            },
        };
        yield Ok(PipelineEvent::IdentifiersAssigned { notes: assigned.prepared.len(), saved: assigned.saved });
        for result in assigned.failed {
            report.add(result.clone());
            yield Ok(PipelineEvent::Processed(result));
        }

        let batch = Batch {
            ctx,
            vault: &vault,
            converter,
            fingerprints: FingerprintStore::new(Arc::clone(&ctx.store), &ctx.options),
            notes: NoteIndex::build(
                assigned.prepared.iter().map(|p| (&p.note, p.identifier.clone())),
                &ctx.settings.walk.note_extensions,
            ),
            assets: AssetIndex::build(assets.into_iter().map(|info| info.path)).supporting(&ctx.settings.walk.asset_extensions),
            copier: AssetCopier::new(),
        };

        let mut futures: VecDeque<_> = assigned.prepared.into_iter().map(|prepared| process_note(&batch, prepared)).collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(futures.drain(..ctx.settings.concurrency().min(futures.len())));
        loop {
            let next = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => {
                    tracing::warn!(in_flight = processing.len(), remaining = futures.len(), "Cancelled; abandoning remaining notes");
                    report.cancelled = true;
                    break;
                },
                next = processing.next() => next,
            };
            let Some(result) = next else { break };
            match result {
                Ok(result) => {
                    report.add(result.clone());
                    yield Ok(PipelineEvent::Processed(result));
                },
                Err(e) => {
                    yield Err(e);
                    return;
                },
            }
            // Pop-n-push, FIFO.
            if let Some(future) = futures.pop_front() {
                processing.push(future);
            }
        }
        drop(processing);

        tracing::info!(
            written = report.written,
            cached = report.cache_hits,
            skipped = report.skipped,
            failed = report.failed(),
            warnings = report.warnings.len(),
            "Conversion finished"
        );
        yield Ok(PipelineEvent::Complete(report));
    })
}

/// Runs [`convert_vault`] to completion and returns its report.
pub async fn run(ctx: &Context) -> LibraryResult<Report> {
    let events = convert_vault(ctx);
    futures::pin_mut!(events);
    while let Some(event) = events.next().await {
        if let PipelineEvent::Complete(report) = event? {
            return Ok(report);
        }
    }
    exn::bail!(LibraryErrorKind::Pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Outcome, WarningKind};
    use crate::template::{DEFAULT_TEMPLATE, PathGenerator};
    use crate::Settings;
    use orgify_cache::{CacheStore, Database, MemoryStore, Repository};
    use orgify_convert::MockConverter;
    use orgify_storage::StorageBackend;
    use orgify_storage::backend::{MockBackend, ReadOnlyBackend};
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    const ALPHA: &str = "---\ntitle: Alpha Plan\ntags: [work]\n---\n# Alpha\n\nSee [[Beta]] and ![[cat.png]].\n";
    const BETA: &str = "# Beta\n\nBack to [[Alpha|the plan]].\n";

    struct Harness {
        vault: Arc<MockBackend>,
        output: Arc<MockBackend>,
        store: Arc<MemoryStore>,
        converter: Arc<MockConverter>,
    }

    impl Harness {
        fn new(files: &[(&str, &str)]) -> Self {
            Self {
                vault: Arc::new(MockBackend::with_files(files.iter().map(|(path, data)| (*path, *data)))),
                output: Arc::new(MockBackend::default().with_name("output")),
                store: Arc::new(MemoryStore::new()),
                converter: Arc::new(MockConverter::new()),
            }
        }

        fn vault() -> Self {
            Self::new(&[("Alpha.md", ALPHA), ("Notes/Beta.md", BETA), ("img/cat.png", "PNG")])
        }

        fn context(&self) -> Context {
            Context {
                vault: self.vault.clone(),
                output: self.output.clone(),
                store: self.store.clone(),
                converter: self.converter.clone(),
                options: ConversionOptions::default(),
                template: DEFAULT_TEMPLATE.parse().unwrap(),
                settings: Settings::default(),
                cancel: CancellationToken::new(),
            }
        }

        async fn run(&self) -> Report {
            run(&self.context()).await.unwrap()
        }

        async fn identifier(&self, key: &str) -> String {
            self.store.load_identifiers().await.unwrap()[key].clone()
        }
    }

    #[tokio::test]
    async fn test_converts_vault() {
        let harness = Harness::vault();
        let report = harness.run().await;
        assert_eq!(report.written, 2);
        assert!(report.is_success());

        let alpha_id = harness.identifier("Alpha.md").await;
        let beta_id = harness.identifier("Notes/Beta.md").await;
        let alpha = harness.output.contents("Alpha.org").await.unwrap();
        assert!(alpha.starts_with(&format!(":PROPERTIES:\n:ID: {alpha_id}\n:END:\n#+title: Alpha Plan\n#+filetags: :work:\n\n")));
        assert!(alpha.contains(&format!("See [[id:{beta_id}][Beta]] and [[file:assets/img/cat.png]].")));
        assert_eq!(harness.output.contents("assets/img/cat.png").await.as_deref(), Some("PNG"));

        let beta = harness.output.contents("Notes/Beta.org").await.unwrap();
        assert!(beta.contains(&format!("Back to [[id:{alpha_id}][the plan]].")));
    }

    #[tokio::test]
    async fn test_event_order() {
        let harness = Harness::vault();
        let ctx = harness.context();
        let events: Vec<_> = convert_vault(&ctx).map(Result::unwrap).collect().await;
        assert!(matches!(events[0], PipelineEvent::Started));
        assert!(matches!(events[1], PipelineEvent::DiscoveryComplete { notes: 2, assets: 1 }));
        assert!(matches!(events[2], PipelineEvent::IdentifiersAssigned { notes: 2, saved: 2 }));
        assert!(events[3..5].iter().all(|event| matches!(event, PipelineEvent::Processed(_))));
        assert!(matches!(events[5], PipelineEvent::Complete(_)));
        assert_eq!(events.len(), 6);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let harness = Harness::vault();
        harness.run().await;
        let first = harness.output.contents("Alpha.org").await;
        let (calls, writes) = (harness.converter.calls(), harness.output.write_count());

        let report = harness.run().await;
        assert_eq!(report.skipped, 2);
        assert_eq!(report.total(), 2);
        assert_eq!(harness.converter.calls(), calls);
        assert_eq!(harness.output.write_count(), writes);
        assert_eq!(harness.output.contents("Alpha.org").await, first);
    }

    #[tokio::test]
    async fn test_sqlite_store_skips_second_run() {
        let database = Database::connect_in_memory().await.unwrap();
        let harness = Harness::vault();
        let mut ctx = harness.context();
        ctx.store = Arc::new(Repository::new(database.pool().clone(), false));
        assert_eq!(run(&ctx).await.unwrap().written, 2);
        let calls = harness.converter.calls();

        let report = run(&ctx).await.unwrap();
        assert_eq!(report.skipped, 2);
        assert_eq!(harness.converter.calls(), calls);
        assert_eq!(ctx.store.load_identifiers().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_edit_reconverts_only_that_note() {
        let harness = Harness::vault();
        harness.run().await;
        let calls = harness.converter.calls();

        let edited = "# Beta\n\nEdited. Back to [[Alpha|the plan]].\n";
        harness.vault.write(Path::new("Notes/Beta.md"), edited.as_bytes()).await.unwrap();
        let report = harness.run().await;
        assert_eq!((report.written, report.skipped), (1, 1));
        assert_eq!(harness.converter.calls(), calls + 1);
        assert!(harness.output.contents("Notes/Beta.org").await.unwrap().contains("Edited."));
    }

    #[tokio::test]
    async fn test_cache_serves_rewrites() {
        let harness = Harness::vault();
        harness.run().await;
        let calls = harness.converter.calls();

        harness.output.delete(Path::new("Alpha.org")).await.unwrap();
        let report = harness.run().await;
        assert_eq!((report.cache_hits, report.skipped), (1, 1));
        assert!(harness.output.contents("Alpha.org").await.is_some());

        let mut ctx = harness.context();
        ctx.settings.force = true;
        let report = run(&ctx).await.unwrap();
        assert_eq!(report.cache_hits, 2);
        assert_eq!(harness.converter.calls(), calls);
    }

    #[tokio::test]
    async fn test_identifiers_survive_new_notes() {
        let harness = Harness::vault();
        harness.run().await;
        let alpha_id = harness.identifier("Alpha.md").await;
        let beta_id = harness.identifier("Notes/Beta.md").await;

        harness.vault.write(Path::new("Gamma.md"), b"# Gamma\n\nSee [[Alpha]].").await.unwrap();
        let report = harness.run().await;
        assert_eq!((report.written, report.skipped), (1, 2));
        assert_eq!(harness.identifier("Alpha.md").await, alpha_id);
        assert_eq!(harness.identifier("Notes/Beta.md").await, beta_id);
        let gamma_id = harness.identifier("Gamma.md").await;
        assert!(gamma_id != alpha_id && gamma_id != beta_id);
    }

    #[tokio::test]
    async fn test_ambiguous_link_picks_first_path() {
        let harness = Harness::new(&[("b/Dup.md", "B"), ("a/Dup.md", "A"), ("Ref.md", "See [[Dup]].")]);
        let report = harness.run().await;
        assert_eq!(report.written, 3);

        let chosen = harness.identifier("a/Dup.md").await;
        let reference = harness.output.contents("Ref.org").await.unwrap();
        assert!(reference.contains(&format!("See [[id:{chosen}][Dup]].")));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::AmbiguousLink {
            chosen: "a/Dup.md".into(),
            candidates: 2,
        });
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let mut files: Vec<(String, String)> = (1..=9).map(|n| (format!("Note{n}.md"), format!("# Note {n}"))).collect();
        files.push(("Bad.md".to_string(), "---\ntags: [a\n---\nBody".to_string()));
        let files: Vec<(&str, &str)> = files.iter().map(|(path, data)| (path.as_str(), data.as_str())).collect();
        let harness = Harness::new(&files);

        let report = harness.run().await;
        assert_eq!((report.written, report.failed()), (9, 1));
        assert_eq!(report.failures[0].0, Path::new("Bad.md"));
        assert!(report.failures[0].1.starts_with("malformed note"), "{}", report.failures[0].1);
        assert!(report.to_string().contains("Bad.md: malformed note"));
        assert!(!harness.store.load_identifiers().await.unwrap().contains_key("Bad.md"));
    }

    #[tokio::test]
    async fn test_rejected_input_fails_alone() {
        let harness = Harness::new(&[("Good.md", "Fine"), ("Bad.md", "# REJECT me")]);
        harness.converter.reject_containing("REJECT");
        let report = harness.run().await;
        assert_eq!((report.written, report.failed()), (1, 1));
        let (path, reason) = &report.failures[0];
        assert_eq!(path, Path::new("Bad.md"));
        assert!(reason.contains("rejected by mock"), "{reason}");
        assert!(harness.output.contents("Bad.org").await.is_none());
    }

    #[tokio::test]
    async fn test_properties_and_body_fidelity() {
        let harness = Harness::new(&[("Foo.md", "---\ntitle: Foo\ntags: [a, b]\nstatus: draft\n---\nSome *plain* text.\n")]);
        harness.run().await;
        let id = harness.identifier("Foo.md").await;
        let foo = harness.output.contents("Foo.org").await.unwrap();
        assert_eq!(foo, format!(":PROPERTIES:\n:ID: {id}\n:END:\n#+title: Foo\n#+filetags: :a:b:\n#+status: draft\n\nSome *plain* text.\n"));
    }

    #[tokio::test]
    async fn test_missing_asset_is_a_warning() {
        let harness = Harness::new(&[("Alpha.md", "Look: ![[nope.png]]")]);
        let report = harness.run().await;
        assert_eq!(report.written, 1);
        assert_eq!(report.warnings[0].kind, WarningKind::MissingAsset);
        let alpha = harness.output.contents("Alpha.org").await.unwrap();
        assert!(alpha.contains("Look: /nope.png/ (unresolved)"));
    }

    #[tokio::test]
    async fn test_shared_asset_copied_once() {
        let harness = Harness::new(&[("A.md", "![[cat.png]]"), ("Sub/B.md", "![[cat.png]]"), ("cat.png", "PNG")]);
        let report = harness.run().await;
        assert_eq!(report.written, 2);
        assert!(harness.output.contents("Sub/B.org").await.unwrap().contains("[[file:../assets/cat.png]]"));
        assert_eq!(harness.output.write_count(), 3);
    }

    #[tokio::test]
    async fn test_skipped_note_refreshes_its_assets() {
        let harness = Harness::new(&[("A.md", "![[cat.png]]"), ("cat.png", "OLD")]);
        harness.run().await;
        assert_eq!(harness.output.contents("assets/cat.png").await.as_deref(), Some("OLD"));

        harness.vault.write(Path::new("cat.png"), b"NEW").await.unwrap();
        let report = harness.run().await;
        assert_eq!((report.skipped, report.written), (1, 0));
        assert_eq!(harness.output.contents("assets/cat.png").await.as_deref(), Some("NEW"));

        harness.output.delete(Path::new("assets/cat.png")).await.unwrap();
        let report = harness.run().await;
        assert_eq!(report.skipped, 1);
        assert_eq!(harness.output.contents("assets/cat.png").await.as_deref(), Some("NEW"));
    }

    #[tokio::test]
    async fn test_warnings_are_stable_across_runs() {
        let harness = Harness::new(&[
            ("Ref.md", "[[Dup]] and [[Dup]] and [[Ghost]] [[Ghost]]"),
            ("a/Dup.md", "A"),
            ("b/Dup.md", "B"),
        ]);
        let first = harness.run().await;
        assert_eq!(first.warnings.len(), 4);

        let second = harness.run().await;
        assert_eq!(second.skipped, 3);
        assert_eq!(second.warnings, first.warnings);
    }

    #[tokio::test]
    async fn test_output_collision_fails_second_note() {
        let harness = Harness::new(&[("a/Note.md", "A"), ("b/Note.md", "B")]);
        let mut ctx = harness.context();
        ctx.template = "{{ stem }}".parse::<PathGenerator>().unwrap();
        let report = run(&ctx).await.unwrap();
        assert_eq!((report.written, report.failed()), (1, 1));
        assert_eq!(report.failures[0].0, Path::new("b/Note.md"));
        assert!(report.failures[0].1.contains("already produced by a/Note.md"));
    }

    #[tokio::test]
    async fn test_duplicate_explicit_identifier() {
        let harness = Harness::new(&[("A.md", "---\nid: shared\n---\nA"), ("B.md", "---\nid: shared\n---\nB")]);
        let report = harness.run().await;
        assert_eq!(report.written, 2);
        assert_eq!(harness.identifier("A.md").await, "shared");
        assert_ne!(harness.identifier("B.md").await, "shared");
        assert_eq!(report.warnings[0].kind, WarningKind::DuplicateIdentifier { owner: "A.md".to_string() });
    }

    #[tokio::test]
    async fn test_missing_converter_is_fatal() {
        let harness = Harness::vault();
        harness.converter.set_missing(true);
        let err = run(&harness.context()).await.unwrap_err();
        assert!(matches!(&*err, LibraryErrorKind::Pipeline));
        assert_eq!(harness.output.write_count(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_output_is_fatal() {
        let harness = Harness::vault();
        harness.output.deny_writes(true);
        assert!(run(&harness.context()).await.is_err());
        assert!(harness.output.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_transient_converter_failure_is_retried() {
        let harness = Harness::new(&[("Alpha.md", "# Alpha")]);
        harness.converter.fail_transiently(1);
        let report = harness.run().await;
        assert_eq!(report.written, 1);
        assert_eq!(harness.converter.calls(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let harness = Harness::vault();
        let ctx = harness.context();
        ctx.cancel.cancel();
        let report = run(&ctx).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.total(), 0);
        assert_eq!(harness.output.write_count(), 0);
        assert!(harness.store.load_identifiers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_leaves_output_alone() {
        let harness = Harness::vault();
        let mut ctx = harness.context();
        ctx.output = Arc::new(ReadOnlyBackend::new(harness.output.clone()));
        let report = run(&ctx).await.unwrap();
        assert_eq!(report.written, 2);
        assert!(harness.output.paths().await.is_empty());
    }

    #[tokio::test]
    async fn test_results_match_outcomes() {
        let harness = Harness::new(&[("Alpha.md", "# Alpha")]);
        let ctx = harness.context();
        let events: Vec<_> = convert_vault(&ctx).map(Result::unwrap).collect().await;
        let outcomes: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Processed(result) => Some(result.outcome.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(outcomes, vec![Outcome::Written]);
    }
}
