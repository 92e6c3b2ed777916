//! Heartbeat ticker and periodic task scheduling.
//!
//! All periodic work in the runtime (WebSocket health checks, exchange
//! pings, listen-key refresh, bus health checks) is driven by a single
//! 1-second ticker owned by [`Heartbeat`]. A task registered with interval
//! `k` runs on every tick where `tick_count % k == 0` and receives its own
//! task id plus the current tick count. Ticks never overlap; a task that
//! outlives its interval simply misses firings, they are not made up.
//!
//! One-shot work uses [`spawn`] (next opportunity) or [`call_later`]
//! (after a delay).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::util;

/// Identifier handed out by [`Heartbeat::register`].
pub type TaskId = String;

type LoopFn = Arc<dyn Fn(TaskId, u64) -> BoxFuture<'static, ()> + Send + Sync>;

struct LoopEntry {
    func: LoopFn,
    interval: u64,
}

/// The 1-second heartbeat driving every registered loop task.
///
/// Constructed once by the runtime root and shared with every subsystem
/// that needs periodic work.
pub struct Heartbeat {
    count: AtomicU64,
    /// Emit a heartbeat log line every this many ticks; `0` disables it.
    print_interval: u64,
    tasks: Mutex<HashMap<TaskId, LoopEntry>>,
}

impl Heartbeat {
    /// Create a heartbeat. `print_interval` comes from the `HEARTBEAT`
    /// config section.
    pub fn new(print_interval: u64) -> Arc<Self> {
        Arc::new(Self {
            count: AtomicU64::new(0),
            print_interval,
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Number of ticks elapsed since the ticker started.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Register `func` to run every `interval` ticks (seconds).
    ///
    /// An `interval` of `0` is clamped to `1`.
    pub fn register<F, Fut>(&self, interval: u64, func: F) -> TaskId
    where
        F: Fn(TaskId, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task_id = util::uuid1();
        let entry = LoopEntry {
            func: Arc::new(move |id, n| Box::pin(func(id, n))),
            interval: interval.max(1),
        };
        self.tasks
            .lock()
            .expect("heartbeat task table poisoned")
            .insert(task_id.clone(), entry);
        task_id
    }

    /// Remove a previously registered loop task.
    pub fn unregister(&self, task_id: &str) {
        self.tasks
            .lock()
            .expect("heartbeat task table poisoned")
            .remove(task_id);
    }

    /// Start the ticker. The first tick fires after 0.5 s, then every
    /// second. Missed ticks are skipped, not replayed.
    pub fn start(self: &Arc<Self>) {
        let hb = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                hb.tick();
            }
        });
    }

    /// Advance the tick counter and spawn every due task.
    fn tick(&self) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;

        if self.print_interval > 0 && n % self.print_interval == 0 {
            tracing::info!(count = n, "server heartbeat");
        }

        let due: Vec<(TaskId, LoopFn)> = {
            let tasks = self.tasks.lock().expect("heartbeat task table poisoned");
            tasks
                .iter()
                .filter(|(_, entry)| n % entry.interval == 0)
                .map(|(id, entry)| (id.clone(), entry.func.clone()))
                .collect()
        };
        for (task_id, func) in due {
            tokio::spawn(func(task_id, n));
        }
    }
}

/// Run a future at the next scheduling opportunity.
pub fn spawn<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut);
}

/// Run a future after `delay` seconds.
pub fn call_later<F>(delay: f64, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        fut.await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn loop_task_fires_on_interval_multiples() {
        let hb = Heartbeat::new(0);
        let fired = Arc::new(Mutex::new(Vec::new()));

        let fired2 = fired.clone();
        hb.register(3, move |_, n| {
            let fired = fired2.clone();
            async move {
                fired.lock().unwrap().push(n);
            }
        });

        for _ in 0..10 {
            hb.tick();
        }
        // Let the spawned task bodies run.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut seen = fired.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![3, 6, 9]);
    }

    #[tokio::test]
    async fn unregistered_task_stops_firing() {
        let hb = Heartbeat::new(0);
        let hits = Arc::new(AtomicUsize::new(0));

        let hits2 = hits.clone();
        let id = hb.register(1, move |_, _| {
            let hits = hits2.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        });

        hb.tick();
        hb.tick();
        tokio::time::sleep(Duration::from_millis(20)).await;
        hb.unregister(&id);
        hb.tick();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn task_receives_its_own_id_and_tick_count() {
        let hb = Heartbeat::new(0);
        let seen = Arc::new(Mutex::new(None));

        let seen2 = seen.clone();
        let id = hb.register(2, move |task_id, n| {
            let seen = seen2.clone();
            async move {
                *seen.lock().unwrap() = Some((task_id, n));
            }
        });

        hb.tick();
        hb.tick();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let got = seen.lock().unwrap().clone().expect("task did not fire");
        assert_eq!(got, (id, 2));
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let hb = Heartbeat::new(0);
        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = hits.clone();
        hb.register(0, move |_, _| {
            let hits = hits2.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
            }
        });
        hb.tick();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
