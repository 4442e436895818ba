//! Concurrent per-file upload lifecycles and result splicing.
//!
//! Each enqueued file uploads independently; nothing orders completions
//! within a batch. A task captures the caret offset at enqueue time, and the
//! batch keeps an append-only log of every `(position, delta)` edit applied
//! to the buffer since. When a task completes, its captured offset is
//! remapped through the log entries recorded after it was enqueued, so two
//! completions at the same original offset land next to each other instead
//! of clobbering one another, regardless of completion order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tokio::sync::Semaphore;

use crate::collab::AssetKind;
use crate::collab::FileUploader;
use crate::collab::UploadRequest;
use crate::collab::UploadedAsset;
use crate::config::ComposerConfig;
use crate::error::UploadError;
use crate::events::ComposerEvent;
use crate::events::ComposerEventSender;
use crate::state::EditDelta;
use crate::state::TextBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Queued,
    Uploading,
    Succeeded,
    Failed,
}

impl UploadStatus {
    /// Queued or in flight; terminal states are Succeeded/Failed.
    pub fn is_pending(self) -> bool {
        matches!(self, UploadStatus::Queued | UploadStatus::Uploading)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub id: u64,
    pub name: String,
    pub mime_type: String,
    pub status: UploadStatus,
    /// Buffer offset captured at enqueue time. Must be remapped through the
    /// batch edit log before use.
    pub insert_offset: usize,
    pub asset: Option<UploadedAsset>,
    pub error: Option<UploadError>,
    /// Absolute edit-log index at enqueue; log entries before this one
    /// predate the task and never apply to it.
    log_mark: usize,
}

/// Aggregate counts recomputed from the task collection; never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadProgress {
    pub uploading: usize,
    pub uploaded: usize,
    pub failed: usize,
}

/// Owning collection of upload tasks plus the shared edit log.
#[derive(Debug, Default)]
pub struct UploadBatch {
    tasks: Vec<UploadTask>,
    edit_log: VecDeque<EditDelta>,
    /// Absolute index of `edit_log[0]`; grows as the log is pruned.
    log_base: usize,
    next_id: u64,
}

impl UploadBatch {
    fn add_task(&mut self, name: String, mime_type: String, insert_offset: usize) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.push(UploadTask {
            id,
            name,
            mime_type,
            status: UploadStatus::Queued,
            insert_offset,
            asset: None,
            error: None,
            log_mark: self.log_base + self.edit_log.len(),
        });
        id
    }

    fn task_mut(&mut self, id: u64) -> Option<&mut UploadTask> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Record one buffer edit so pending tasks can be remapped across it.
    fn note_edit(&mut self, delta: EditDelta) {
        self.edit_log.push_back(delta);
        self.prune();
    }

    /// Shift a task's captured offset across every edit recorded since it
    /// was enqueued.
    fn remapped_offset(&self, task: &UploadTask) -> usize {
        let skip = task.log_mark.saturating_sub(self.log_base);
        self.edit_log
            .iter()
            .skip(skip)
            .fold(task.insert_offset, |offset, delta| delta.remap(offset))
    }

    /// Drop log entries no pending task can still reference.
    fn prune(&mut self) {
        let min_mark = self
            .tasks
            .iter()
            .filter(|t| t.status.is_pending())
            .map(|t| t.log_mark)
            .min();
        let keep_from = min_mark.unwrap_or(self.log_base + self.edit_log.len());
        while self.log_base < keep_from {
            if self.edit_log.pop_front().is_none() {
                break;
            }
            self.log_base += 1;
        }
    }

    pub fn tasks(&self) -> &[UploadTask] {
        &self.tasks
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_pending()).count()
    }

    pub fn progress(&self) -> UploadProgress {
        let mut progress = UploadProgress::default();
        for task in &self.tasks {
            match task.status {
                UploadStatus::Queued | UploadStatus::Uploading => progress.uploading += 1,
                UploadStatus::Succeeded => progress.uploaded += 1,
                UploadStatus::Failed => progress.failed += 1,
            }
        }
        progress
    }

    /// URLs of successfully uploaded assets, in enqueue order. Failed tasks
    /// are omitted by construction.
    pub fn succeeded_urls(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter_map(|t| t.asset.as_ref())
            .map(|a| a.url.clone())
            .collect()
    }

    fn clear(&mut self) {
        self.tasks.clear();
        self.edit_log.clear();
        self.log_base = 0;
    }

    #[cfg(test)]
    fn log_len(&self) -> usize {
        self.edit_log.len()
    }
}

fn markdown_for(name: &str, asset: &UploadedAsset) -> String {
    match asset.kind {
        AssetKind::Image => format!("![{name}]({}) ", asset.url),
        AssetKind::File => format!("[{name}]({}) ", asset.url),
    }
}

pub struct UploadPipeline {
    batch: UploadBatch,
    uploader: Arc<dyn FileUploader>,
    tx: ComposerEventSender,
    alive: Arc<AtomicBool>,
    semaphore: Option<Arc<Semaphore>>,
    retry_limit: u32,
}

impl UploadPipeline {
    pub fn new(
        uploader: Arc<dyn FileUploader>,
        tx: ComposerEventSender,
        alive: Arc<AtomicBool>,
        config: &ComposerConfig,
    ) -> Self {
        Self {
            batch: UploadBatch::default(),
            uploader,
            tx,
            alive,
            semaphore: config
                .max_concurrent_uploads
                .map(|n| Arc::new(Semaphore::new(n.get()))),
            retry_limit: config.upload_retry_limit,
        }
    }

    pub fn batch(&self) -> &UploadBatch {
        &self.batch
    }

    /// Start one independent upload per file, all captured at `offset`.
    /// Returns the new task ids in file order.
    pub fn enqueue(&mut self, files: Vec<UploadRequest>, offset: usize) -> Vec<u64> {
        let mut ids = Vec::with_capacity(files.len());
        for request in files {
            let id = self
                .batch
                .add_task(request.name.clone(), request.mime_type.clone(), offset);
            ids.push(id);
            self.spawn_worker(id, request);
        }
        ids
    }

    fn spawn_worker(&self, id: u64, request: UploadRequest) {
        let uploader = Arc::clone(&self.uploader);
        let tx = self.tx.clone();
        let alive = Arc::clone(&self.alive);
        let semaphore = self.semaphore.clone();
        let retry_limit = self.retry_limit;
        tokio::spawn(async move {
            let _permit = match semaphore {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            tx.send(ComposerEvent::UploadStarted { id });

            let mut attempt = 0;
            let result = loop {
                match uploader.upload(&request).await {
                    Ok(asset) => break Ok(asset),
                    Err(err) if err.is_transient() && attempt < retry_limit => {
                        attempt += 1;
                        tracing::debug!(
                            "retrying upload of {:?} (attempt {attempt}): {err}",
                            request.name
                        );
                    }
                    Err(err) => break Err(err),
                }
            };
            if !alive.load(Ordering::SeqCst) {
                return;
            }
            tx.send(ComposerEvent::UploadFinished { id, result });
        });
    }

    /// Record a buffer edit that originated outside this pipeline.
    pub fn note_edit(&mut self, delta: EditDelta) {
        self.batch.note_edit(delta);
    }

    pub fn on_started(&mut self, id: u64) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }
        if let Some(task) = self.batch.task_mut(id)
            && task.status == UploadStatus::Queued
        {
            task.status = UploadStatus::Uploading;
        }
    }

    /// Resolve a task. On success the markdown syntax is spliced into the
    /// buffer at the task's remapped offset and the splice itself is recorded
    /// in the edit log so sibling pending tasks shift past it; the edit is
    /// returned for the owner to fan out. Failures touch only task state.
    pub fn on_finished(
        &mut self,
        id: u64,
        result: Result<UploadedAsset, UploadError>,
        buffer: &mut TextBuffer,
    ) -> Option<EditDelta> {
        if !self.alive.load(Ordering::SeqCst) {
            return None;
        }
        let Some(idx) = self.batch.tasks.iter().position(|t| t.id == id) else {
            return None;
        };
        if !self.batch.tasks[idx].status.is_pending() {
            return None;
        }

        match result {
            Ok(asset) => {
                let offset = self.batch.remapped_offset(&self.batch.tasks[idx]);
                let markdown = markdown_for(&self.batch.tasks[idx].name, &asset);
                let delta = buffer.insert_at(offset, &markdown);
                let entry = &mut self.batch.tasks[idx];
                entry.status = UploadStatus::Succeeded;
                entry.insert_offset = delta.position;
                entry.asset = Some(asset);
                self.batch.note_edit(delta);
                Some(delta)
            }
            Err(err) => {
                let entry = &mut self.batch.tasks[idx];
                tracing::debug!("upload of {:?} failed: {err}", entry.name);
                entry.status = UploadStatus::Failed;
                entry.error = Some(err);
                self.batch.prune();
                None
            }
        }
    }

    pub fn clear(&mut self) {
        self.batch.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::unbounded_channel;

    struct StubUploader {
        responses: Vec<Result<UploadedAsset, UploadError>>,
        calls: AtomicUsize,
    }

    impl StubUploader {
        fn ok(url: &str, kind: AssetKind) -> Self {
            Self {
                responses: vec![Ok(UploadedAsset {
                    url: url.to_string(),
                    kind,
                })],
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl FileUploader for StubUploader {
        async fn upload(&self, _request: &UploadRequest) -> Result<UploadedAsset, UploadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses[call.min(self.responses.len() - 1)].clone()
        }
    }

    fn request(name: &str) -> UploadRequest {
        UploadRequest {
            path: PathBuf::from(name),
            name: name.to_string(),
            mime_type: "image/png".to_string(),
            size_bytes: 1,
        }
    }

    fn asset(url: &str, kind: AssetKind) -> UploadedAsset {
        UploadedAsset {
            url: url.to_string(),
            kind,
        }
    }

    fn pipeline_with(
        uploader: StubUploader,
        config: &ComposerConfig,
    ) -> (
        UploadPipeline,
        tokio::sync::mpsc::UnboundedReceiver<ComposerEvent>,
        Arc<AtomicBool>,
    ) {
        let (tx, rx) = unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let pipeline = UploadPipeline::new(
            Arc::new(uploader),
            ComposerEventSender::new(tx),
            Arc::clone(&alive),
            config,
        );
        (pipeline, rx, alive)
    }

    #[tokio::test]
    async fn same_offset_completions_do_not_clobber_either_order() {
        for flipped in [false, true] {
            let config = ComposerConfig::default();
            let (mut pipeline, _rx, _alive) =
                pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
            let mut buffer = TextBuffer::new("hello ");
            let ids = pipeline.enqueue(vec![request("a.png"), request("b.pdf")], 6);

            let mut order = vec![
                (ids[0], asset("url-a", AssetKind::Image)),
                (ids[1], asset("url-b", AssetKind::File)),
            ];
            if flipped {
                order.reverse();
            }
            for (id, asset) in order {
                pipeline.on_finished(id, Ok(asset), &mut buffer);
            }

            let text = buffer.text();
            assert!(text.contains("![a.png](url-a) "), "clobbered: {text:?}");
            assert!(text.contains("[b.pdf](url-b) "), "clobbered: {text:?}");
        }
    }

    #[tokio::test]
    async fn completion_offset_is_remapped_across_user_edits() {
        let config = ComposerConfig::default();
        let (mut pipeline, _rx, _alive) =
            pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
        let mut buffer = TextBuffer::new("hello");
        let ids = pipeline.enqueue(vec![request("a.png")], 5);

        // User keeps typing at the front while the upload is in flight.
        let delta = buffer.insert_at(0, ">> ");
        pipeline.note_edit(delta);

        pipeline.on_finished(ids[0], Ok(asset("url-a", AssetKind::Image)), &mut buffer);
        assert_eq!(buffer.text(), ">> hello![a.png](url-a) ");
    }

    #[tokio::test]
    async fn edits_before_enqueue_never_shift_a_task() {
        let config = ComposerConfig::default();
        let (mut pipeline, _rx, _alive) =
            pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
        let mut buffer = TextBuffer::new("x");

        // An older task keeps the log populated while the new one enqueues.
        let stale = pipeline.enqueue(vec![request("old.png")], 0);
        let delta = buffer.insert_at(0, "abc ");
        pipeline.note_edit(delta);

        let ids = pipeline.enqueue(vec![request("new.png")], 5);
        pipeline.on_finished(ids[0], Ok(asset("url-n", AssetKind::Image)), &mut buffer);
        assert_eq!(buffer.text(), "abc x![new.png](url-n) ");

        pipeline.on_finished(stale[0], Err(UploadError::NetworkError), &mut buffer);
    }

    #[tokio::test]
    async fn failure_leaves_buffer_and_siblings_untouched() {
        let config = ComposerConfig::default();
        let (mut pipeline, _rx, _alive) =
            pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
        let mut buffer = TextBuffer::new("draft");
        let ids = pipeline.enqueue(vec![request("a.png"), request("b.png")], 5);

        pipeline.on_finished(ids[0], Err(UploadError::SizeExceeded), &mut buffer);
        assert_eq!(buffer.text(), "draft");
        assert_eq!(pipeline.batch().tasks()[0].status, UploadStatus::Failed);
        assert_eq!(
            pipeline.batch().tasks()[0].error,
            Some(UploadError::SizeExceeded)
        );
        assert!(pipeline.batch().tasks()[1].status.is_pending());

        pipeline.on_finished(ids[1], Ok(asset("url-b", AssetKind::Image)), &mut buffer);
        assert_eq!(buffer.text(), "draft![b.png](url-b) ");
    }

    #[tokio::test]
    async fn progress_counts_are_recomputed_per_transition() {
        let config = ComposerConfig::default();
        let (mut pipeline, _rx, _alive) =
            pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
        let mut buffer = TextBuffer::new("");
        let ids = pipeline.enqueue(vec![request("a"), request("b"), request("c")], 0);
        assert_eq!(
            pipeline.batch().progress(),
            UploadProgress {
                uploading: 3,
                uploaded: 0,
                failed: 0
            }
        );

        pipeline.on_started(ids[0]);
        pipeline.on_finished(ids[0], Ok(asset("u-a", AssetKind::Image)), &mut buffer);
        pipeline.on_finished(ids[1], Err(UploadError::ServerRejected), &mut buffer);
        assert_eq!(
            pipeline.batch().progress(),
            UploadProgress {
                uploading: 1,
                uploaded: 1,
                failed: 1
            }
        );
        assert_eq!(pipeline.batch().succeeded_urls(), vec!["u-a".to_string()]);
    }

    #[tokio::test]
    async fn edit_log_is_pruned_once_no_task_needs_it() {
        let config = ComposerConfig::default();
        let (mut pipeline, _rx, _alive) =
            pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
        let mut buffer = TextBuffer::new("");
        let ids = pipeline.enqueue(vec![request("a.png")], 0);

        for _ in 0..4 {
            let delta = buffer.insert_at(0, "x");
            pipeline.note_edit(delta);
        }
        assert_eq!(pipeline.batch().log_len(), 4);

        pipeline.on_finished(ids[0], Ok(asset("u-a", AssetKind::Image)), &mut buffer);
        assert_eq!(pipeline.batch().log_len(), 0);
    }

    #[tokio::test]
    async fn disposed_pipeline_ignores_completions() {
        let config = ComposerConfig::default();
        let (mut pipeline, _rx, alive) =
            pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
        let mut buffer = TextBuffer::new("");
        let ids = pipeline.enqueue(vec![request("a.png")], 0);

        alive.store(false, Ordering::SeqCst);
        let spliced = pipeline.on_finished(ids[0], Ok(asset("u", AssetKind::Image)), &mut buffer);
        assert_eq!(spliced, None);
        assert_eq!(buffer.text(), "");
    }

    #[tokio::test]
    async fn worker_reports_started_then_finished() {
        let config = ComposerConfig::default();
        let (mut pipeline, mut rx, _alive) =
            pipeline_with(StubUploader::ok("url-a", AssetKind::Image), &config);
        let mut buffer = TextBuffer::new("");
        pipeline.enqueue(vec![request("a.png")], 0);

        let started = rx.recv().await.unwrap();
        let ComposerEvent::UploadStarted { id } = started else {
            panic!("expected UploadStarted, got {started:?}");
        };
        pipeline.on_started(id);
        assert_eq!(pipeline.batch().tasks()[0].status, UploadStatus::Uploading);

        let finished = rx.recv().await.unwrap();
        let ComposerEvent::UploadFinished { id, result } = finished else {
            panic!("expected UploadFinished, got {finished:?}");
        };
        pipeline.on_finished(id, result, &mut buffer);
        assert_eq!(buffer.text(), "![a.png](url-a) ");
    }

    #[tokio::test]
    async fn transient_failures_are_retried_up_to_the_limit() {
        let uploader = StubUploader {
            responses: vec![
                Err(UploadError::NetworkError),
                Ok(asset("url-a", AssetKind::File)),
            ],
            calls: AtomicUsize::new(0),
        };
        let config = ComposerConfig {
            upload_retry_limit: 1,
            ..Default::default()
        };
        let (mut pipeline, mut rx, _alive) = pipeline_with(uploader, &config);
        let mut buffer = TextBuffer::new("");
        pipeline.enqueue(vec![request("a.bin")], 0);

        loop {
            let event = rx.recv().await.unwrap();
            if let ComposerEvent::UploadFinished { id, result } = event {
                assert_eq!(result.as_ref().map(|a| a.url.as_str()), Ok("url-a"));
                pipeline.on_finished(id, result, &mut buffer);
                break;
            }
        }
        assert_eq!(buffer.text(), "[a.bin](url-a) ");
    }

    #[tokio::test]
    async fn concurrency_cap_serializes_workers() {
        let config = ComposerConfig {
            max_concurrent_uploads: Some(std::num::NonZeroUsize::new(1).unwrap()),
            ..Default::default()
        };
        let (mut pipeline, mut rx, _alive) =
            pipeline_with(StubUploader::ok("u", AssetKind::Image), &config);
        pipeline.enqueue(vec![request("a"), request("b")], 0);

        let mut kinds = Vec::new();
        for _ in 0..4 {
            match rx.recv().await.unwrap() {
                ComposerEvent::UploadStarted { .. } => kinds.push("started"),
                ComposerEvent::UploadFinished { .. } => kinds.push("finished"),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(kinds, ["started", "finished", "started", "finished"]);
    }
}
