//! HTTP date header value management.
//!
//! Formatting an RFC 7231 date per response is wasted work under load; this
//! service keeps the current date string in a lock-free cell and refreshes
//! it on a timer task owned by the scheduler. It is an explicitly
//! constructed component with a start/stop lifecycle tied to the server's,
//! not a process-wide singleton.

use arc_swap::ArcSwap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weft_runtime::{Scheduler, WorkerHandle};

const UPDATE_INTERVAL: Duration = Duration::from_millis(800);

/// Maintains the current HTTP date string for the response writer.
///
/// `new` seeds the value from the system clock; [`start`](Self::start)
/// schedules the periodic refresh. Reads never block and never format.
#[derive(Debug)]
pub struct DateService {
    current: Arc<ArcSwap<String>>,
    timer: Mutex<Option<WorkerHandle>>,
    interval: Duration,
}

impl DateService {
    pub fn new() -> Self {
        Self::new_with_update_interval(UPDATE_INTERVAL)
    }

    /// A service refreshing at a custom interval.
    pub fn new_with_update_interval(interval: Duration) -> Self {
        Self { current: Arc::new(ArcSwap::from_pointee(format_http_date())), timer: Mutex::new(None), interval }
    }

    /// Begins refreshing on a repeating timer task. Starting an already
    /// started service replaces the previous timer.
    pub fn start(&self, scheduler: &dyn Scheduler) {
        let current = Arc::clone(&self.current);
        let handle = scheduler.schedule_repeating(
            self.interval,
            Box::new(move || {
                current.store(Arc::new(format_http_date()));
            }),
        );
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(previous) = timer.replace(handle) {
                previous.cancel();
            }
        }
    }

    /// Cancels the refresh timer. The last value stays readable.
    pub fn stop(&self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(handle) = timer.take() {
                handle.cancel();
            }
        }
    }

    /// The current date string, e.g. `Tue, 03 Jun 2025 10:00:00 GMT`.
    pub fn current(&self) -> Arc<String> {
        self.current.load_full()
    }
}

impl Default for DateService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DateService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn format_http_date() -> String {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}
