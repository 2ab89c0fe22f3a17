// Progress notification cells
//
// Two single-slot "latest value" cells (status text and percent) connect the orchestrator to
// whatever presentation layer is listening. Publishing never blocks and never fails, even with
// no subscribers; a slow listener only ever sees the newest value and may miss intermediate ones.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Producer side, owned by the installer context.
#[derive(Debug)]
pub struct ProgressReporter {
    status: watch::Sender<String>,
    percent: Arc<watch::Sender<f64>>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (status, _) = watch::channel(String::new());
        let (percent, _) = watch::channel(0.0);
        Self {
            status,
            percent: Arc::new(percent),
        }
    }

    pub fn publish_status(&self, status: impl Into<String>) {
        self.status.send_replace(status.into());
    }

    /// Publish a percentage; values are clamped to `[0, 100]`.
    pub fn publish_percent(&self, percent: f64) {
        self.percent.send_replace(clamp_percent(percent));
    }

    /// A callback publishing into the percent cell, for code that reports through closures.
    pub fn percent_sink(&self) -> Arc<dyn Fn(f64) + Send + Sync> {
        let percent = Arc::clone(&self.percent);
        Arc::new(move |p| {
            percent.send_replace(clamp_percent(p));
        })
    }

    pub fn subscribe_status(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }

    pub fn subscribe_percent(&self) -> watch::Receiver<f64> {
        self.percent.subscribe()
    }

    pub fn latest_status(&self) -> String {
        self.status.borrow().clone()
    }

    pub fn latest_percent(&self) -> f64 {
        *self.percent.borrow()
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// Wraps a progress callback so it only ever sees non-decreasing values in `[0, 100]`.
#[derive(Clone)]
pub struct MonotonicProgress {
    last: Arc<Mutex<f64>>,
    sink: Arc<dyn Fn(f64) + Send + Sync>,
}

impl MonotonicProgress {
    pub fn new(sink: Arc<dyn Fn(f64) + Send + Sync>) -> Self {
        Self {
            last: Arc::new(Mutex::new(0.0)),
            sink,
        }
    }

    pub fn report(&self, percent: f64) {
        if percent.is_nan() {
            return;
        }
        let p = percent.clamp(0.0, 100.0);
        let forward = match self.last.lock() {
            Ok(mut last) => {
                if p < *last {
                    false
                } else {
                    *last = p;
                    true
                }
            }
            Err(_) => false,
        };
        if forward {
            (self.sink)(p);
        }
    }
}

/// Map a sub-task fraction `[0, 100]` into the overall range `[start, end]`.
pub fn scale_percent(sub_percent: f64, start: f64, end: f64) -> f64 {
    let f = (sub_percent.clamp(0.0, 100.0)) / 100.0;
    start + (end - start) * f
}
