//! Per-call counters and the periodic health report.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Audio counters and response timing for one call, shared by the router
/// loop and the health task.
#[derive(Debug, Default)]
pub struct CallStats {
    audio_in: AtomicU64,
    audio_out: AtomicU64,
    last_user_audio: Mutex<Option<Instant>>,
    response_started: Mutex<Option<Instant>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub audio_in: u64,
    pub audio_out: u64,
    pub responding: bool,
}

impl CallStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one caller frame. Returns `true` if a bot response was in
    /// flight, i.e. the caller is talking over the bot.
    pub fn on_caller_audio(&self) -> bool {
        self.audio_in.fetch_add(1, Ordering::Relaxed);
        *self.last_user_audio.lock() = Some(Instant::now());
        self.response_started.lock().take().is_some()
    }

    /// Records one bot frame. On the first frame of a response, returns the
    /// time since the caller's last audio.
    pub fn on_bot_audio(&self) -> Option<Duration> {
        self.audio_out.fetch_add(1, Ordering::Relaxed);
        let mut response_started = self.response_started.lock();
        if response_started.is_some() {
            return None;
        }
        let now = Instant::now();
        *response_started = Some(now);
        let last_user_audio = *self.last_user_audio.lock();
        last_user_audio.map(|last| now.saturating_duration_since(last))
    }

    pub fn clear_response(&self) {
        *self.response_started.lock() = None;
    }

    /// Clears response tracking once any bot audio has flowed, so the next
    /// response measures its own latency.
    pub fn reset_response_tracking(&self) {
        if self.audio_out.load(Ordering::Relaxed) > 0 {
            self.clear_response();
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            audio_in: self.audio_in.load(Ordering::Relaxed),
            audio_out: self.audio_out.load(Ordering::Relaxed),
            responding: self.response_started.lock().is_some(),
        }
    }
}

pub struct HealthMonitor {
    interval: Duration,
    stats: Arc<CallStats>,
}

impl HealthMonitor {
    pub fn new(interval: Duration, stats: Arc<CallStats>) -> Self {
        Self { interval, stats }
    }

    /// Logs the counters every interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs_f64(), "Health check started");
        let mut ticker = interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = self.stats.snapshot();
                    info!(
                        audio_in = snapshot.audio_in,
                        audio_out = snapshot.audio_out,
                        "Call stats"
                    );
                    self.stats.reset_response_tracking();
                }
            }
        }
        info!("Health check stopped");
    }
}
