use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observer of a walk-forward run
pub trait ProgressCallback {
    fn on_run_start(&mut self, strategy: &str, windows: usize);

    fn on_window_complete(&mut self, window: usize, total: usize, score: Option<f64>);

    fn on_run_complete(&mut self, composite_score: Option<f64>);
}

pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_run_start(&mut self, strategy: &str, windows: usize) {
        println!("Walk-forward for {} over {} windows...", strategy, windows);
    }

    fn on_window_complete(&mut self, window: usize, total: usize, score: Option<f64>) {
        match score {
            Some(score) => println!("  Window {}/{} OOS score: {:.4}", window + 1, total, score),
            None => println!("  Window {}/{} degraded", window + 1, total),
        }
    }

    fn on_run_complete(&mut self, composite_score: Option<f64>) {
        match composite_score {
            Some(score) => println!("Composite score: {:.4}", score),
            None => println!("Composite score: n/a (no healthy windows)"),
        }
    }
}

/// Discards every event
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_run_start(&mut self, _strategy: &str, _windows: usize) {}

    fn on_window_complete(&mut self, _window: usize, _total: usize, _score: Option<f64>) {}

    fn on_run_complete(&mut self, _composite_score: Option<f64>) {}
}

/// Shared abort flag, checked before each window is processed
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
