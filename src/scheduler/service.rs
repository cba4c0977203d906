//! Scheduler service: tick loop, dispatch, jitter and reload handling.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng as _;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::metrics::MetricsCollector;

use super::limiter::LimiterRegistry;
use super::task::{Task, TaskQueue};

/// Capacity of the bounded task channel feeding the worker pool.
pub const TASK_CHANNEL_CAPACITY: usize = 1000;

/// How often the scheduler checks for due tasks.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Symmetric jitter applied to every rescheduled interval.
const DEFAULT_JITTER_PCT: f64 = 0.10;

/// Heap and limiter registry, replaced together on every config load.
#[derive(Default)]
struct SchedulerState {
    queue: TaskQueue,
    limiters: LimiterRegistry,
}

/// Owns the probe schedule.
///
/// Every 100 ms the tick loop pops all due tasks; each one is dispatched
/// onto the task channel when its rate limiter permits, and re-inserted
/// with a jittered `next_run` either way. Config reloads replace the heap
/// and limiters atomically; new tasks first fire one jittered interval in
/// the future, which dampens reload bursts.
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    /// Taken (and thereby closed) on shutdown; workers treat channel
    /// closure as the terminal signal.
    task_tx: Mutex<Option<mpsc::Sender<Task>>>,
    jitter_pct: f64,
    metrics: Arc<MetricsCollector>,
}

/// Point-in-time scheduler counters for the debug endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub tasks: usize,
    pub limiters: usize,
}

impl Scheduler {
    /// Create the scheduler and the receiving end of its task channel.
    pub fn new(metrics: Arc<MetricsCollector>) -> (Self, mpsc::Receiver<Task>) {
        let (task_tx, task_rx) = mpsc::channel(TASK_CHANNEL_CAPACITY);
        (
            Self {
                state: Mutex::new(SchedulerState::default()),
                task_tx: Mutex::new(Some(task_tx)),
                jitter_pct: DEFAULT_JITTER_PCT,
                metrics,
            },
            task_rx,
        )
    }

    /// Override the jitter percentage. Zero disables jitter entirely.
    pub fn with_jitter(mut self, pct: f64) -> Self {
        self.jitter_pct = pct;
        self
    }

    /// Adopt a config snapshot: discard all tasks and limiters, then build
    /// fresh ones. No task fires before one jittered interval from now.
    pub fn load_config(&self, config: &Config) {
        let mut state = self.state.lock();
        let now = Instant::now();

        state.queue = TaskQueue::new();
        state.limiters = LimiterRegistry::from_config(config);

        for payer in &config.payers {
            for endpoint in &payer.endpoints {
                let interval = endpoint.effective_schedule();
                state.queue.push(Task {
                    payer: payer.name.clone(),
                    endpoint: endpoint.clone(),
                    next_run: now + self.jitter(interval),
                    interval,
                });
            }
        }

        self.metrics.set_scheduler_tasks(state.queue.len() as u64);
        info!(
            tasks = state.queue.len(),
            limiters = state.limiters.len(),
            "Scheduler loaded configuration"
        );
    }

    /// Run the tick loop until cancelled, adopting reloaded snapshots as
    /// they arrive. On cancellation the task channel is closed.
    pub async fn run(
        &self,
        mut reloads: broadcast::Receiver<Arc<Config>>,
        cancel: CancellationToken,
    ) {
        info!("Starting scheduler");
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut reloads_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler stopping, closing task channel");
                    self.task_tx.lock().take();
                    return;
                }
                _ = ticker.tick() => self.process_due(),
                reload = reloads.recv(), if reloads_open => match reload {
                    Ok(config) => self.load_config(&config),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Scheduler lagged behind config reloads");
                    }
                    Err(broadcast::error::RecvError::Closed) => reloads_open = false,
                },
            }
        }
    }

    /// Dispatch every task whose `next_run` has arrived.
    fn process_due(&self) {
        let Some(task_tx) = self.task_tx.lock().clone() else {
            return;
        };

        let mut state = self.state.lock();
        let now = Instant::now();

        while state.queue.peek_next_run().is_some_and(|t| t <= now) {
            let mut task = state.queue.pop().expect("peeked task present");
            let key = task.limiter_key();

            match state.limiters.get_mut(&key) {
                Some(limiter) => {
                    if limiter.allow_at(now) {
                        match task_tx.try_send(task.clone()) {
                            Ok(()) => {
                                debug!(payer = %task.payer, endpoint_type = %task.endpoint.endpoint_type, "Task dispatched");
                            }
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                self.metrics.record_task_dropped();
                                warn!(payer = %task.payer, endpoint_type = %task.endpoint.endpoint_type, "Task channel full, dropping dispatch");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                debug!("Task channel closed, dispatch skipped");
                            }
                        }
                    }
                    // Rate limited: skip the dispatch, keep the schedule.
                }
                None => {
                    error!(key = %key, "No rate limiter for task, skipping dispatch");
                }
            }

            task.next_run = now + self.jitter(task.interval);
            state.queue.push(task);
        }
    }

    /// `interval` perturbed by a uniform offset in `±jitter_pct`.
    fn jitter(&self, interval: Duration) -> Duration {
        if self.jitter_pct <= 0.0 {
            return interval;
        }
        let offset = rand::rng().random_range(-1.0..=1.0) * self.jitter_pct;
        Duration::from_secs_f64(interval.as_secs_f64() * (1.0 + offset))
    }

    /// Counters for the debug endpoint.
    pub fn stats(&self) -> SchedulerStats {
        let state = self.state.lock();
        SchedulerStats {
            tasks: state.queue.len(),
            limiters: state.limiters.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    const TWO_PAYERS: &str = r#"
payers:
  - name: acme
    endpoints:
      - type: login
        url: https://a.test
        schedule: 1m
      - type: api
        url: https://a.test/api
        schedule: 1m
  - name: umbrella
    endpoints:
      - type: login
        url: https://u.test
        schedule: 2m
"#;

    const ONE_PAYER_THREE_ENDPOINTS: &str = r#"
payers:
  - name: acme
    endpoints:
      - type: login
        url: https://a.test
        schedule: 1m
      - type: api
        url: https://a.test/api
        schedule: 1m
      - type: patient_search
        url: https://a.test/search
        schedule: 1m
"#;

    #[test]
    fn test_load_config_sizes() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, _rx) = Scheduler::new(metrics);

        scheduler.load_config(&config(TWO_PAYERS));
        let stats = scheduler.stats();
        assert_eq!(stats.tasks, 3);
        assert_eq!(stats.limiters, 3);
    }

    #[test]
    fn test_reload_replaces_everything() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, _rx) = Scheduler::new(metrics);

        scheduler.load_config(&config(TWO_PAYERS));
        scheduler.load_config(&config(ONE_PAYER_THREE_ENDPOINTS));

        let stats = scheduler.stats();
        assert_eq!(stats.tasks, 3);
        assert_eq!(stats.limiters, 3);
    }

    #[test]
    fn test_reload_is_idempotent_on_sizes() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, _rx) = Scheduler::new(metrics);

        scheduler.load_config(&config(TWO_PAYERS));
        let first = scheduler.stats();
        scheduler.load_config(&config(TWO_PAYERS));
        let second = scheduler.stats();

        assert_eq!(first.tasks, second.tasks);
        assert_eq!(first.limiters, second.limiters);
    }

    #[test]
    fn test_no_task_fires_before_nine_tenths_of_schedule() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, _rx) = Scheduler::new(metrics);

        let before = Instant::now();
        scheduler.load_config(&config(TWO_PAYERS));

        let earliest = scheduler.state.lock().queue.peek_next_run().unwrap();
        // Shortest schedule above is 1m; jitter is bounded at ±10%.
        assert!(earliest >= before + Duration::from_secs(54));
    }

    #[test]
    fn test_jitter_zero_is_deterministic() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, _rx) = Scheduler::new(metrics);
        let scheduler = scheduler.with_jitter(0.0);

        let interval = Duration::from_secs(60);
        for _ in 0..10 {
            assert_eq!(scheduler.jitter(interval), interval);
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, _rx) = Scheduler::new(metrics);

        let interval = Duration::from_secs(60);
        for _ in 0..200 {
            let jittered = scheduler.jitter(interval);
            assert!(jittered >= Duration::from_secs_f64(54.0));
            assert!(jittered <= Duration::from_secs_f64(66.0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_task_is_dispatched() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, mut rx) = Scheduler::new(metrics);
        let scheduler = Arc::new(scheduler.with_jitter(0.0));

        scheduler.load_config(&config(
            r#"
payers:
  - name: acme
    endpoints:
      - type: login
        url: https://a.test
        schedule: 1m
"#,
        ));

        let cancel = CancellationToken::new();
        let (_reload_tx, reload_rx) = broadcast::channel(4);
        let runner = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(reload_rx, cancel).await })
        };

        // The paused clock auto-advances through the 100 ms ticks; the
        // task becomes due one full (unjittered) minute in.
        let task = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("dispatch within two virtual minutes")
            .expect("channel open");
        assert_eq!(task.payer, "acme");
        assert_eq!(task.endpoint.endpoint_type, "login");

        cancel.cancel();
        runner.await.unwrap();
        // Channel closes once the scheduler drops its sender.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_throttles_rapid_ticks() {
        let metrics = Arc::new(MetricsCollector::new());
        let (scheduler, mut rx) = Scheduler::new(metrics);
        let scheduler = scheduler.with_jitter(0.0);

        scheduler.load_config(&config(
            r#"
payers:
  - name: acme
    endpoints:
      - type: login
        url: https://a.test
        schedule: 1m
"#,
        ));

        // Force the task due immediately, then drive the tick body ten
        // times within the same instant: the limiter admits exactly one.
        {
            let mut state = scheduler.state.lock();
            let mut task = state.queue.pop().unwrap();
            task.next_run = Instant::now();
            state.queue.push(task);
        }
        for _ in 0..10 {
            {
                let mut state = scheduler.state.lock();
                let mut task = state.queue.pop().unwrap();
                task.next_run = Instant::now();
                state.queue.push(task);
            }
            scheduler.process_due();
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 1);
    }

    #[test]
    fn test_rng_range_sanity() {
        use rand::Rng as _;

        // random_range over an inclusive float range stays inside it.
        let mut rng = rand::rng();
        for _ in 0..100 {
            let v: f64 = rng.random_range(-1.0..=1.0);
            assert!((-1.0..=1.0).contains(&v));
        }
    }
}
