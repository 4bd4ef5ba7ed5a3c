//! Box-Art Worker (§4.L). Grounded on
//! `original_source/app/backend/boxartmanager.cpp`: a job queue drained
//! by a fixed-size worker pool, with a disk-cache check ahead of any
//! fetch. The actual fetch-from-host-and-decode path is out of scope
//! here (§1); workers write a deterministic placeholder stub instead so
//! the scheduling contract — job in, cached path out — is still real.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::paths::AppPaths;

const WORKER_COUNT: usize = 4;
const CHANNEL_CAPACITY: usize = 256;

/// Bytes written for a job with no real artwork to fetch: the PNG
/// signature followed by a single marker byte, enough to round-trip
/// through any code that only checks "does a cache file exist" without
/// attempting to decode it as an image.
const PLACEHOLDER_STUB: [u8; 9] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

#[derive(Debug, Clone)]
struct Job {
    uuid: String,
    app_id: i32,
}

/// Handle for enqueuing box-art jobs (§4.L "fire-and-forget"). Cloning
/// shares the same job channel; dropping every handle stops the workers
/// once their queues drain.
#[derive(Clone)]
pub struct BoxArtWorker {
    tx: mpsc::Sender<Job>,
}

impl BoxArtWorker {
    /// Spawns `WORKER_COUNT` tasks draining a shared job channel.
    pub fn spawn(paths: Arc<AppPaths>) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..WORKER_COUNT {
            let rx = Arc::clone(&rx);
            let paths = Arc::clone(&paths);
            tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    match job {
                        Some(job) => process_job(&paths, job).await,
                        None => break,
                    }
                }
                tracing::debug!(worker_id, "box-art worker stopped");
            });
        }

        Self { tx }
    }

    /// Enqueue a fetch for `(uuid, app_id)`; silently dropped if the
    /// channel is full rather than blocking the caller (§4.L "does not
    /// block on it").
    pub fn enqueue(&self, uuid: impl Into<String>, app_id: i32) {
        let job = Job {
            uuid: uuid.into(),
            app_id,
        };
        if let Err(e) = self.tx.try_send(job) {
            tracing::debug!(error = %e, "box-art job dropped, worker queue is full");
        }
    }

    /// The cached artwork path for `(uuid, app_id)` if it already exists
    /// on disk, without enqueuing a fetch.
    pub fn cached_path(paths: &AppPaths, uuid: &str, app_id: i32) -> Option<PathBuf> {
        let path = cache_file(paths, uuid, app_id);
        path.exists().then_some(path)
    }
}

fn cache_file(paths: &AppPaths, uuid: &str, app_id: i32) -> PathBuf {
    paths.artwork_dir(uuid).join(format!("{app_id}.png"))
}

async fn process_job(paths: &AppPaths, job: Job) {
    let path = cache_file(paths, &job.uuid, job.app_id);
    if path.exists() {
        return;
    }

    let dir = paths.artwork_dir(&job.uuid);
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        tracing::warn!(uuid = %job.uuid, app_id = job.app_id, error = %e, "failed to create box-art cache dir");
        return;
    }

    if let Err(e) = tokio::fs::write(&path, PLACEHOLDER_STUB).await {
        tracing::warn!(uuid = %job.uuid, app_id = job.app_id, error = %e, "failed to write box-art placeholder");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn enqueued_job_produces_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::at(dir.path().to_path_buf()));
        let worker = BoxArtWorker::spawn(Arc::clone(&paths));

        worker.enqueue("host-1", 42);

        let mut found = false;
        for _ in 0..50 {
            if BoxArtWorker::cached_path(&paths, "host-1", 42).is_some() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(found, "box-art worker never produced a cache file");
    }

    #[tokio::test]
    async fn cached_path_is_none_when_no_job_has_run() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::at(dir.path().to_path_buf());
        assert!(BoxArtWorker::cached_path(&paths, "host-1", 7).is_none());
    }

    #[tokio::test]
    async fn existing_cache_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Arc::new(AppPaths::at(dir.path().to_path_buf()));
        let cache_path = cache_file(&paths, "host-1", 9);
        tokio::fs::create_dir_all(cache_path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&cache_path, b"real-artwork-bytes").await.unwrap();

        let worker = BoxArtWorker::spawn(Arc::clone(&paths));
        worker.enqueue("host-1", 9);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let contents = tokio::fs::read(&cache_path).await.unwrap();
        assert_eq!(contents, b"real-artwork-bytes");
    }
}
