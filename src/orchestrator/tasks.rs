//! Cancellable scheduled work: the status poller and the held-button repeater.

use crate::orchestrator::Orchestrator;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// Shortest period a timer runs at; tokio rejects a zero interval
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

fn timer_period(period: Duration) -> Duration {
    if period < MIN_PERIOD {
        debug!(?period, "Timer period raised to {:?}", MIN_PERIOD);
    }
    period.max(MIN_PERIOD)
}

/// Owned handle to a spawned task; stopping or dropping it aborts the task
#[derive(Default)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: Some(tokio::spawn(future)),
        }
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runs an action once immediately and then every `interval` until stopped.
/// Starting again replaces the running repeat.
#[derive(Default)]
pub struct Repeater {
    task: ScheduledTask,
}

impl Repeater {
    pub fn start<F, Fut>(&mut self, period: Duration, mut action: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.task.stop();
        let period = timer_period(period);
        self.task = ScheduledTask::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !action().await {
                    break;
                }
            }
        });
    }

    pub fn stop(&mut self) {
        self.task.stop();
    }

    pub fn is_active(&self) -> bool {
        self.task.is_running()
    }
}

/// Tick the orchestrator every poll interval. The first tick is one period out
/// because `Orchestrator::initialize` already polls once.
pub fn spawn_poller(orchestrator: &Arc<Orchestrator>) -> ScheduledTask {
    let period = timer_period(orchestrator.config().poll_interval);
    let weak = Arc::downgrade(orchestrator);

    ScheduledTask::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(orchestrator) = weak.upgrade() else {
                debug!("Orchestrator dropped, poller exiting");
                break;
            };
            orchestrator.poll_tick().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::simulated::TransportCall;
    use crate::infrastructure::transport::SimulatedTransport;
    use crate::orchestrator::test_support::*;
    use crate::orchestrator::OrchestratorConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<bool> {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeater_fires_immediately_then_on_interval() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut repeater = Repeater::default();

        repeater.start(Duration::from_millis(200), counting(&fired));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);

        repeater.stop();
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(!repeater.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_previous_repeat() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut repeater = Repeater::default();

        repeater.start(Duration::from_millis(200), counting(&first));
        tokio::time::sleep(Duration::from_millis(1)).await;
        repeater.start(Duration::from_millis(200), counting(&second));
        tokio::time::sleep(Duration::from_millis(1001)).await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_can_end_the_repeat() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let mut repeater = Repeater::default();

        repeater.start(Duration::from_millis(200), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(n < 1)
        });
        tokio::time::sleep(Duration::from_millis(1000)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert!(!repeater.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_repeat_period_runs_at_minimum() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut repeater = Repeater::default();

        repeater.start(Duration::ZERO, counting(&fired));
        tokio::time::sleep(Duration::from_millis(10)).await;
        repeater.stop();

        assert!(fired.load(Ordering::SeqCst) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_still_polls() {
        let config = OrchestratorConfig {
            poll_interval: Duration::ZERO,
            ..OrchestratorConfig::default()
        };
        let h = harness_with_config(SimulatedTransport::new(devices(&["A"])), config);

        let mut poller = spawn_poller(&h.orchestrator);
        tokio::time::sleep(Duration::from_millis(5)).await;
        poller.stop();

        assert!(h.transport.count(|c| matches!(c, TransportCall::HasBluetooth)) >= 2);
        assert_eq!(h.orchestrator.snapshot().devices, devices(&["A"]));
    }
}
