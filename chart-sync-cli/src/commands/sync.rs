use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge_traits::catalog::ChartId;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use clap::Args;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, RecvError, SyncEvent};
use core_sync::{
    DedupMerger, StopReason, SyncConfig, SyncEngine, SyncError, SyncProgress, SyncRequest,
    SyncSnapshot,
};
use provider_enchor::EnchorConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::mirror::{Checkpoint, MirrorMetadata, MirrorStore};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Directory holding the local mirror
    #[arg(long, env = "CHART_SYNC_MIRROR_DIR", default_value = "chart-mirror")]
    pub mirror_dir: PathBuf,

    /// Fetch charts modified at or after this instant (RFC 3339) instead of
    /// since the last completed run
    #[arg(long, conflicts_with = "full")]
    pub since: Option<DateTime<Utc>>,

    /// Ignore the last run and re-fetch the whole catalog
    #[arg(long)]
    pub full: bool,

    /// Records per catalog page (1-250)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Stop after this many pages (development aid)
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Catalog API base URL
    #[arg(long, env = "CHART_SYNC_BASE_URL")]
    pub base_url: Option<String>,

    /// Attempts per page while the catalog is rate limiting
    #[arg(long)]
    pub max_rate_limit_attempts: Option<u32>,
}

/// Execute the `sync` command: crawl the catalog and fold the result into the
/// local mirror, resuming an interrupted run when one is on disk.
pub async fn execute(args: SyncArgs) -> Result<()> {
    let config = build_config(&args)?;
    let store = MirrorStore::open(&config.mirror_dir).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let plan = plan_run(&store, args.since, args.full, clock.now()).await?;

    let event_bus = EventBus::default();
    let progress = tokio::spawn(report_progress(EventStream::new(event_bus.subscribe())));

    let engine = SyncEngine::new(
        Arc::new(EnchorConnector::from_config(&config)),
        SyncConfig::from(&config),
    )?
    .with_clock(clock)
    .with_event_bus(event_bus.clone());

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current page");
                token.cancel();
            }
        }
    });

    let result = run_sync(&store, &engine, &plan, token).await;

    drop(engine);
    drop(event_bus);
    progress.await.ok();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(progress) = e.downcast_ref::<SyncError>().and_then(SyncError::progress) {
                eprintln!(
                    "Sync stopped at cursor {} after {} page(s); run again to resume.",
                    progress.cursor, progress.pages_completed
                );
            }
            return Err(e);
        }
    };

    match outcome {
        RunOutcome::Committed(report) => {
            println!(
                "Sync {}.",
                if plan.resumed { "resumed and completed" } else { "completed" }
            );
            println!("  Pages fetched:   {}", report.pages);
            println!("  Charts fetched:  {}", report.charts_fetched);
            println!("  Songs this run:  {}", report.songs_this_run);
            println!(
                "  Songs mirrored:  {} (+{})",
                report.metadata.total_songs, report.added
            );
            println!("  Next run after:  {}", report.metadata.last_run.to_rfc3339());
        }
        RunOutcome::PageLimit { cursor, pages_written } => {
            println!(
                "Page limit reached at cursor {}; {} page(s) checkpointed in {}.",
                cursor,
                pages_written,
                store.dir().display()
            );
            println!("Run `chart-sync sync` again to continue.");
        }
        RunOutcome::Interrupted { progress, pages_written } => {
            println!(
                "Sync interrupted at cursor {} after {} page(s); {} page(s) checkpointed in {}.",
                progress.cursor,
                progress.pages_completed,
                pages_written,
                store.dir().display()
            );
            println!("Run `chart-sync sync` again to resume.");
        }
    }
    Ok(())
}

/// Where a run starts and whether it continues an earlier attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub checkpoint: Checkpoint,
    pub resumed: bool,
}

/// How a run that did not fail ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The crawl converged and the mirror was rewritten
    Committed(CommitReport),
    /// `max_pages` was reached; the run stays checkpointed
    PageLimit { cursor: ChartId, pages_written: u32 },
    /// Cancelled between pages; the run stays checkpointed
    Interrupted {
        progress: SyncProgress,
        pages_written: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub metadata: MirrorMetadata,
    /// Songs the mirror did not hold before
    pub added: usize,
    pub pages: u32,
    pub charts_fetched: u64,
    pub songs_this_run: usize,
}

/// Decide the start point and persist it as the run's checkpoint.
///
/// An interrupted run is resumed unless `since` or `full` asks for a
/// different time window, in which case it is discarded. A new run fetches
/// changes since `since`, since the epoch for `full`, and otherwise since
/// the last completed run.
pub async fn plan_run(
    store: &MirrorStore,
    since: Option<DateTime<Utc>>,
    full: bool,
    now: DateTime<Utc>,
) -> Result<RunPlan> {
    let plan = match store.load_checkpoint().await? {
        Some(checkpoint) if !full && since.is_none() => {
            info!(
                cursor = checkpoint.cursor,
                pages = checkpoint.pages,
                after_time = %checkpoint.after_time,
                "Resuming interrupted sync"
            );
            RunPlan {
                checkpoint,
                resumed: true,
            }
        }
        stale => {
            if stale.is_some() {
                warn!("Discarding interrupted sync in favour of a new run");
            }
            store.discard_run().await?;

            let after_time = match (since, full) {
                (Some(since), _) => since,
                (None, true) => DateTime::<Utc>::UNIX_EPOCH,
                (None, false) => store
                    .load_metadata()
                    .await?
                    .map(|metadata| metadata.last_run)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            };
            RunPlan {
                checkpoint: Checkpoint::new(after_time, now),
                resumed: false,
            }
        }
    };

    store.save_checkpoint(&plan.checkpoint).await?;
    Ok(plan)
}

/// Crawl from `plan`, checkpointing every page, and commit the mirror once
/// the crawl converges.
///
/// # Errors
///
/// A fatal [`SyncError`] is returned with context and can be recovered with
/// `downcast_ref`. The run stays checkpointed so the next `sync` resumes it.
pub async fn run_sync(
    store: &MirrorStore,
    engine: &SyncEngine,
    plan: &RunPlan,
    token: CancellationToken,
) -> Result<RunOutcome> {
    let request = SyncRequest::new(plan.checkpoint.after_time)
        .resume_from(plan.checkpoint.cursor)
        .with_cancellation(token.clone());

    let (writer, writer_task) = store.spawn_writer(plan.checkpoint.clone());
    let result = engine
        .run_with(request, |records, cursor| {
            if !writer.submit(records, cursor) {
                // The writer hit an I/O error; its result explains why.
                token.cancel();
            }
        })
        .await;

    drop(writer);
    let pages_written = writer_task.await.context("Page writer task panicked")??;

    match result {
        Ok(snapshot) if snapshot.stop_reason == StopReason::PageLimit => {
            // Committing would move `lastRun` past charts not yet fetched.
            info!(
                cursor = snapshot.cursor,
                pages_written, "Page limit reached, leaving run checkpointed"
            );
            Ok(RunOutcome::PageLimit {
                cursor: snapshot.cursor,
                pages_written,
            })
        }
        Ok(snapshot) => fold_and_commit(store, plan, snapshot)
            .await
            .map(RunOutcome::Committed),
        Err(SyncError::Cancelled { progress }) => Ok(RunOutcome::Interrupted {
            progress,
            pages_written,
        }),
        Err(e) => Err(e).context("Catalog sync failed"),
    }
}

/// Merge the existing mirror, the run's checkpointed pages and `snapshot`,
/// newest record per song winning, and close out the run.
pub async fn fold_and_commit(
    store: &MirrorStore,
    plan: &RunPlan,
    snapshot: SyncSnapshot,
) -> Result<CommitReport> {
    let mut merger = DedupMerger::from_records(store.load_charts().await?);
    let existing = merger.len();

    let pending = store.load_pending().await?;
    for record in pending.into_iter().chain(snapshot.charts) {
        merger.observe(record);
    }

    let metadata = MirrorMetadata {
        last_run: plan.checkpoint.run_started.min(snapshot.metadata.last_run),
        total_songs: merger.len(),
    };
    store.commit(&merger.into_records(), &metadata).await?;

    Ok(CommitReport {
        added: metadata.total_songs.saturating_sub(existing),
        metadata,
        pages: snapshot.pages,
        charts_fetched: snapshot.total_charts,
        songs_this_run: snapshot.metadata.total_songs,
    })
}

fn build_config(args: &SyncArgs) -> Result<CoreConfig> {
    let mut builder = CoreConfig::builder()
        .mirror_dir(&args.mirror_dir)
        .max_pages(args.max_pages);
    if let Some(url) = &args.base_url {
        builder = builder.catalog_base_url(url.clone());
    }
    if let Some(page_size) = args.page_size {
        builder = builder.page_size(page_size);
    }
    if let Some(attempts) = args.max_rate_limit_attempts {
        builder = builder.max_rate_limit_attempts(attempts);
    }
    builder.build().context("Invalid sync configuration")
}

async fn report_progress(events: EventStream) {
    let mut events =
        events.filter(|event| matches!(event, CoreEvent::Sync(SyncEvent::PageFetched { .. })));

    loop {
        match events.recv().await {
            Ok(CoreEvent::Sync(SyncEvent::PageFetched {
                page,
                cursor,
                records,
                new_songs,
                total_songs,
            })) => {
                println!(
                    "page {:>5}  cursor {:>9}  charts {:>4}  new songs {:>4}  total songs {:>7}",
                    page, cursor, records, new_songs, total_songs
                );
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress output fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
