//! Download worker body
//!
//! Runs on the download pool, one instance per active task. Drives the task
//! through the Downloading state, reports throttled progress, maps the
//! fetcher outcome onto the state machine, and translates it into exactly
//! one completion event after the service maps are cleaned up.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::{debug, error, info, warn};

use crate::app::events::EventPayload;
use crate::app::fetch::ProgressUpdate;
use crate::app::models::{DownloadStatus, DownloadTask, TaskId};
use crate::constants::{progress, service};
use crate::errors::{FetchError, FetchResult};

use super::{CancelToken, WorkerContext};

/// Full worker lifecycle: download, clean up service state, publish outcome
pub(crate) async fn run(ctx: WorkerContext, task: DownloadTask, token: CancelToken) {
    let task_id = task.id;
    let outcome = download(&ctx, &task, &token).await;

    {
        let mut state = ctx.state.lock();
        state.active.remove(&task_id);
        state.cancel.remove(&task_id);
    }
    debug!(%task_id, "worker state cleaned up");

    match outcome {
        Ok(file_path) => {
            ctx.bus
                .emit(EventPayload::DownloadComplete { task_id, file_path });
        }
        Err(FetchError::Cancelled) => {
            ctx.bus.emit(EventPayload::DownloadStopped {
                task_id,
                reason: service::STOP_REASON.to_string(),
            });
        }
        Err(err) => {
            ctx.bus.emit(EventPayload::DownloadFailed {
                task_id,
                error: err.to_string(),
            });
        }
    }
}

/// Download body; every exit path has already updated the task status
async fn download(
    ctx: &WorkerContext,
    task: &DownloadTask,
    token: &CancelToken,
) -> FetchResult<PathBuf> {
    let task_id = task.id;

    // The user may have cancelled between submission and startup
    if token.is_set() {
        mark_stopped(ctx, task_id);
        return Err(FetchError::Cancelled);
    }

    if let Err(e) = ctx
        .queue
        .update_status(task_id, DownloadStatus::Downloading, Some(0.0), None)
    {
        // The task was removed or stopped underneath us
        if matches!(
            ctx.queue.get(task_id).map(|t| t.status),
            Some(DownloadStatus::Stopped)
        ) {
            return Err(FetchError::Cancelled);
        }
        warn!(%task_id, error = %e, "task is no longer startable");
        return Err(FetchError::failed(format!("task no longer startable: {e}")));
    }

    ctx.bus.emit(EventPayload::DownloadProgress {
        task_id,
        progress: 0.0,
        downloaded_bytes: None,
        total_bytes: None,
    });
    info!(%task_id, url = %task.descriptor.url, "download worker running");

    let sink = progress_sink(ctx.clone(), task_id, token.clone());

    let subtitles =
        task.descriptor.download_subtitles || ctx.settings.snapshot().subtitle_download;
    let fetched = if subtitles {
        ctx.fetcher
            .fetch_with_subtitles(&task.descriptor, &task.download_path, &sink)
            .await
    } else {
        ctx.fetcher
            .fetch(&task.descriptor, &task.download_path, &sink)
            .await
    };

    // Missing subtitles do not fail a download whose media was produced
    let fetched = match fetched {
        Err(FetchError::SubtitleUnavailable {
            media_path,
            message,
        }) => {
            warn!(%task_id, error = %message, "subtitles unavailable, keeping media");
            Ok(media_path)
        }
        other => other,
    };

    match fetched {
        Ok(path) => {
            if let Err(e) =
                ctx.queue
                    .update_status(task_id, DownloadStatus::Completed, Some(100.0), None)
            {
                warn!(%task_id, error = %e, "could not mark task completed");
            }
            let size_bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
            ctx.history.record(task, &path, size_bytes);
            info!(%task_id, path = %path.display(), "download completed");
            Ok(path)
        }
        Err(FetchError::Cancelled) => {
            mark_stopped(ctx, task_id);
            info!(%task_id, "download stopped by user");
            Err(FetchError::Cancelled)
        }
        Err(err) => {
            let raw = err.to_string();
            let kind = err.kind();
            let message = kind.describe(&raw);
            error!(
                %task_id,
                url = %task.descriptor.url,
                operation = "download_worker",
                %kind,
                "download failed: {raw}"
            );
            if let Err(e) = ctx.queue.update_status(
                task_id,
                DownloadStatus::Failed,
                None,
                Some(message.clone()),
            ) {
                warn!(%task_id, error = %e, "could not mark task failed");
            }
            Err(FetchError::failed(message))
        }
    }
}

fn mark_stopped(ctx: &WorkerContext, task_id: TaskId) {
    if let Err(e) = ctx.queue.update_status(
        task_id,
        DownloadStatus::Stopped,
        None,
        Some(service::STOP_REASON.to_string()),
    ) {
        warn!(%task_id, error = %e, "could not mark task stopped");
    }
}

/// Build the throttled progress sink for one task.
///
/// The token is checked on every call so a blocked fetcher is interrupted
/// at its next checkpoint. A progress event is published only when the
/// percentage crosses a 5-percent boundary (and at 100); the task row in
/// the queue is updated at the same boundaries.
fn progress_sink(
    ctx: WorkerContext,
    task_id: TaskId,
    token: CancelToken,
) -> impl Fn(ProgressUpdate) -> FetchResult<()> + Send + Sync {
    let last_bucket = AtomicI64::new(-1);

    move |update: ProgressUpdate| {
        if token.is_set() {
            info!(%task_id, "stop observed at progress checkpoint");
            return Err(FetchError::Cancelled);
        }

        let Some(total) = update.total_bytes.filter(|total| *total > 0) else {
            return Ok(());
        };
        let percent =
            (update.downloaded_bytes as f64 / total as f64 * 100.0).clamp(0.0, 100.0);

        let bucket = (percent / progress::THROTTLE_STEP_PERCENT) as i64;
        if bucket > last_bucket.load(Ordering::Relaxed) {
            last_bucket.store(bucket, Ordering::Relaxed);

            if let Err(e) = ctx.queue.update_status(
                task_id,
                DownloadStatus::Downloading,
                Some(percent),
                None,
            ) {
                debug!(%task_id, error = %e, "progress row update dropped");
            }
            ctx.bus.emit(EventPayload::DownloadProgress {
                task_id,
                progress: percent,
                downloaded_bytes: Some(update.downloaded_bytes),
                total_bytes: Some(total),
            });
            debug!(%task_id, progress = percent, "download progress");
        }
        Ok(())
    }
}
