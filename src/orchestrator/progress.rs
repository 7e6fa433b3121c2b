use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Shared counters describing a run in flight. Cheap to clone; every clone
/// observes the same run.
#[derive(Clone, Default)]
pub struct RunProgress {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    files_total: AtomicUsize,
    files_processed: AtomicUsize,
    deep_dives: AtomicUsize,
    read_failures: AtomicUsize,
    is_active: AtomicBool,
    current_file: Mutex<Option<String>>,
    started_at: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub is_active: bool,
    pub files_total: usize,
    pub files_processed: usize,
    pub deep_dives: usize,
    pub read_failures: usize,
    pub current_file: Option<String>,
    pub elapsed_ms: u64,
    pub progress_pct: f64,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, total_files: usize) {
        self.inner.files_total.store(total_files, Ordering::Release);
        self.inner.files_processed.store(0, Ordering::Release);
        self.inner.deep_dives.store(0, Ordering::Release);
        self.inner.read_failures.store(0, Ordering::Release);
        self.inner.is_active.store(true, Ordering::Release);
        if let Ok(mut started) = self.inner.started_at.lock() {
            *started = Some(Instant::now());
        }
    }

    pub fn begin_file(&self, file: &str) {
        if let Ok(mut current) = self.inner.current_file.lock() {
            *current = Some(file.to_string());
        }
    }

    pub fn finish_file(&self, deepened: bool, read_failed: bool) {
        self.inner.files_processed.fetch_add(1, Ordering::Relaxed);
        if deepened {
            self.inner.deep_dives.fetch_add(1, Ordering::Relaxed);
        }
        if read_failed {
            self.inner.read_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn finish(&self) {
        self.inner.is_active.store(false, Ordering::Release);
        if let Ok(mut current) = self.inner.current_file.lock() {
            *current = None;
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let is_active = self.inner.is_active.load(Ordering::Acquire);
        let files_total = self.inner.files_total.load(Ordering::Acquire);
        let files_processed = self.inner.files_processed.load(Ordering::Acquire);

        let elapsed_ms = self
            .inner
            .started_at
            .lock()
            .ok()
            .and_then(|t| t.map(|t| t.elapsed().as_millis() as u64))
            .unwrap_or(0);

        let progress_pct = if files_total > 0 {
            (files_processed as f64 / files_total as f64) * 100.0
        } else {
            0.0
        };

        ProgressSnapshot {
            is_active,
            files_total,
            files_processed,
            deep_dives: self.inner.deep_dives.load(Ordering::Acquire),
            read_failures: self.inner.read_failures.load(Ordering::Acquire),
            current_file: self
                .inner
                .current_file
                .lock()
                .ok()
                .and_then(|c| c.clone()),
            elapsed_ms,
            progress_pct,
        }
    }
}
