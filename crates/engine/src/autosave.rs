// Autosave pipeline: editor change events → immediate mark cleanup →
// coalesced persisted writes.
//
// Each logical stream (content save, title save, thread sweep) holds at
// most one pending deadline. A new event supersedes the pending slot rather
// than queueing behind it, so a burst of keystrokes produces exactly one
// write per stream. Disposal cancels every pending slot: no write lands
// after teardown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::editor::ContentCapabilities;
use crate::reconcile;
use crate::threads::ThreadStore;

/// Default debounce window for content persists.
const DEFAULT_CONTENT_SAVE_MS: u64 = 600;
/// Default debounce window for title/metadata persists.
const DEFAULT_TITLE_SAVE_MS: u64 = 600;
/// Default debounce window for the orphan-thread sweep.
const DEFAULT_THREAD_SWEEP_MS: u64 = 800;

/// The logical debounced streams. One pending timer each, never more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveStream {
    Content,
    Title,
    ThreadSweep,
}

#[derive(Debug, Clone)]
pub struct CoalescerConfig {
    pub content_window: Duration,
    pub title_window: Duration,
    pub sweep_window: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            content_window: Duration::from_millis(DEFAULT_CONTENT_SAVE_MS),
            title_window: Duration::from_millis(DEFAULT_TITLE_SAVE_MS),
            sweep_window: Duration::from_millis(DEFAULT_THREAD_SWEEP_MS),
        }
    }
}

impl CoalescerConfig {
    fn window_for(&self, stream: SaveStream) -> Duration {
        match stream {
            SaveStream::Content => self.content_window,
            SaveStream::Title => self.title_window,
            SaveStream::ThreadSweep => self.sweep_window,
        }
    }
}

/// Coalescing scheduler: at most one pending deadline per stream.
///
/// Call `schedule()` on each incoming event, then `drain_ready()`
/// periodically to collect streams whose window has elapsed.
pub struct Coalescer {
    config: CoalescerConfig,
    pending: HashMap<SaveStream, Instant>,
}

impl Coalescer {
    pub fn new(config: CoalescerConfig) -> Self {
        Self { config, pending: HashMap::new() }
    }

    /// Arm (or re-arm) a stream's single slot. A pending deadline for the
    /// same stream is superseded, never queued behind.
    pub fn schedule(&mut self, stream: SaveStream) {
        self.schedule_at(stream, Instant::now());
    }

    /// Like `schedule` but with a specific timestamp (for testing).
    fn schedule_at(&mut self, stream: SaveStream, now: Instant) {
        self.pending.insert(stream, now + self.config.window_for(stream));
    }

    /// Disarm one stream. Returns true when a slot was pending.
    pub fn cancel(&mut self, stream: SaveStream) -> bool {
        self.pending.remove(&stream).is_some()
    }

    /// Disarm everything. Used on session disposal.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// Drain streams whose window has elapsed, earliest deadline first.
    pub fn drain_ready(&mut self) -> Vec<SaveStream> {
        self.drain_ready_at(Instant::now())
    }

    /// Like `drain_ready` but with a specific timestamp (for testing).
    fn drain_ready_at(&mut self, now: Instant) -> Vec<SaveStream> {
        let mut ready: Vec<(SaveStream, Instant)> = Vec::new();
        self.pending.retain(|stream, deadline| {
            if *deadline <= now {
                ready.push((*stream, *deadline));
                false
            } else {
                true
            }
        });
        ready.sort_by_key(|(_, deadline)| *deadline);
        ready.into_iter().map(|(stream, _)| stream).collect()
    }

    /// Number of streams still waiting in their window.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Time at which the next pending stream becomes ready, or None.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }
}

/// Events from the editing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    /// The content tree changed (keystroke, paste, undo, mark mutation).
    ContentChanged,
    /// The document title changed; carries the latest value.
    TitleChanged(String),
}

/// Notifications for upstream consumers (UI, tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineNotice {
    ContentSaved,
    TitleSaved,
    ThreadsSwept { deleted: Vec<Uuid> },
    Error { stage: &'static str, error: String },
}

/// Where debounced persists land. Content persistence is owned by the
/// surrounding document bookkeeping, so the pipeline only sees this seam.
pub trait SaveSink: Send + Sync {
    fn save_content(&self, doc_id: Uuid, content: &Value) -> anyhow::Result<()>;
    fn save_title(&self, doc_id: Uuid, title: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub coalescer: CoalescerConfig,
    /// How often to check the coalescer for elapsed windows.
    pub poll_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { coalescer: CoalescerConfig::default(), poll_interval: Duration::from_millis(50) }
    }
}

/// Runs the autosave pipeline for one editing session as an async loop.
///
/// On every content change: immediate mark cleanup on the same cycle, then
/// the content-save and thread-sweep slots are (re)armed. Exits when the
/// event channel closes (session disposed) or `shutdown` fires; both paths
/// cancel pending slots before returning, so nothing is written after
/// teardown.
pub async fn run_pipeline<C: ContentCapabilities>(
    doc_id: Uuid,
    mut events: mpsc::Receiver<EditorEvent>,
    notices: mpsc::Sender<PipelineNotice>,
    content: Arc<Mutex<C>>,
    threads: ThreadStore,
    sink: Arc<dyn SaveSink>,
    config: PipelineConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut coalescer = Coalescer::new(config.coalescer);
    let mut pending_title: Option<String> = None;

    info!(%doc_id, "autosave pipeline started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.recv() => {
                info!(%doc_id, "autosave pipeline shutting down, pending saves cancelled");
                coalescer.cancel_all();
                break;
            }

            maybe_event = events.recv() => {
                match maybe_event {
                    Some(EditorEvent::ContentChanged) => {
                        run_mark_cleanup(doc_id, &content, &threads).await;
                        coalescer.schedule(SaveStream::Content);
                        coalescer.schedule(SaveStream::ThreadSweep);
                    }
                    Some(EditorEvent::TitleChanged(title)) => {
                        pending_title = Some(title);
                        coalescer.schedule(SaveStream::Title);
                    }
                    None => {
                        info!(%doc_id, "editor event channel closed, pending saves cancelled");
                        coalescer.cancel_all();
                        break;
                    }
                }
            }

            _ = tokio::time::sleep(config.poll_interval) => {
                // Check for elapsed debounce windows.
            }
        }

        for stream in coalescer.drain_ready() {
            let notice = match stream {
                SaveStream::Content => persist_content(doc_id, &content, sink.as_ref()).await,
                SaveStream::Title => match pending_title.take() {
                    Some(title) => persist_title(doc_id, &title, sink.as_ref()),
                    None => continue,
                },
                SaveStream::ThreadSweep => {
                    match run_thread_sweep(doc_id, &content, &threads).await {
                        Some(notice) => notice,
                        None => continue,
                    }
                }
            };

            if notices.send(notice).await.is_err() {
                debug!(%doc_id, "pipeline notice channel closed, exiting");
                return;
            }
        }
    }
}

/// Immediate corrective pass. Failures are logged and skipped for the
/// cycle; reconciliation never blocks further editing.
async fn run_mark_cleanup<C: ContentCapabilities>(
    doc_id: Uuid,
    content: &Arc<Mutex<C>>,
    threads: &ThreadStore,
) {
    match threads.live_thread_ids(doc_id) {
        Ok(live) => {
            let mut tree = content.lock().await;
            let removed = reconcile::strip_orphan_marks(&mut *tree, &live);
            if removed > 0 {
                debug!(%doc_id, removed, "stripped orphan marks");
            }
        }
        Err(error) => {
            warn!(%doc_id, error = %error, "mark cleanup skipped for this cycle");
        }
    }
}

async fn persist_content<C: ContentCapabilities>(
    doc_id: Uuid,
    content: &Arc<Mutex<C>>,
    sink: &dyn SaveSink,
) -> PipelineNotice {
    let serialized = {
        let tree = content.lock().await;
        tree.serialize()
    };
    match sink.save_content(doc_id, &serialized) {
        Ok(()) => PipelineNotice::ContentSaved,
        Err(error) => {
            warn!(%doc_id, error = %error, "content save failed");
            PipelineNotice::Error { stage: "content_save", error: error.to_string() }
        }
    }
}

fn persist_title(doc_id: Uuid, title: &str, sink: &dyn SaveSink) -> PipelineNotice {
    match sink.save_title(doc_id, title) {
        Ok(()) => PipelineNotice::TitleSaved,
        Err(error) => {
            warn!(%doc_id, error = %error, "title save failed");
            PipelineNotice::Error { stage: "title_save", error: error.to_string() }
        }
    }
}

/// Debounced corrective pass. Returns None when there is nothing to report
/// (no orphans, or the pass was skipped after an error).
async fn run_thread_sweep<C: ContentCapabilities>(
    doc_id: Uuid,
    content: &Arc<Mutex<C>>,
    threads: &ThreadStore,
) -> Option<PipelineNotice> {
    let tree = content.lock().await;
    match reconcile::sweep_orphan_threads(&*tree, threads, doc_id) {
        Ok(deleted) if deleted.is_empty() => None,
        Ok(deleted) => Some(PipelineNotice::ThreadsSwept { deleted }),
        Err(error) => {
            warn!(%doc_id, error = %error, "thread sweep skipped for this cycle");
            None
        }
    }
}
