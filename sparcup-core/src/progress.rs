use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::{Duration, Instant};

/// Periodic heartbeat for long unattended runs.
#[derive(Clone)]
pub struct Progress {
    enabled: bool,
    pub stage: Arc<Mutex<String>>,
    pub units_done: Arc<AtomicUsize>,
    pub files_uploaded: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl Progress {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            stage: Arc::new(Mutex::new(String::new())),
            units_done: Arc::new(AtomicUsize::new(0)),
            files_uploaded: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_stage(&self, s: &str) {
        if !self.enabled {
            return;
        }
        if let Ok(mut stage) = self.stage.lock() {
            *stage = s.to_string();
        }
    }

    pub fn inc_unit(&self) {
        self.units_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_uploaded(&self, n: usize) {
        self.files_uploaded.store(n, Ordering::Relaxed);
    }

    pub fn start(&self, every: Duration) {
        if !self.enabled {
            return;
        }
        self.running.store(true, Ordering::Relaxed);
        let stage = self.stage.clone();
        let units_done = self.units_done.clone();
        let files_uploaded = self.files_uploaded.clone();
        let running = self.running.clone();
        thread::spawn(move || {
            let t0 = Instant::now();
            while running.load(Ordering::Relaxed) {
                thread::sleep(every);
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                let s = stage.lock().map(|s| s.clone()).unwrap_or_default();
                tracing::info!(
                    elapsed_secs = t0.elapsed().as_secs(),
                    destination = %s,
                    units = units_done.load(Ordering::Relaxed),
                    uploaded = files_uploaded.load(Ordering::Relaxed),
                    "progress"
                );
            }
        });
    }

    pub fn stop(&self) {
        if self.enabled {
            self.running.store(false, Ordering::Relaxed);
        }
    }
}
