//! The `simulate` command: build a paused queue from the command line
//! arguments and wait for it to go idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::info;
use serde::Serialize;

use quiesce::config::{Config, TimeUnit};
use quiesce::controller::IdlingController;
use quiesce::queue::{Clock, PausedQueue, TaskQueue};
use quiesce::resource::{CountingIdlingResource, IdlingResourceRegistry};

use super::commands::SimulateArgs;

/// Outcome of one simulated wait.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub idle: bool,
    pub error: Option<String>,
    pub tasks_run: u64,
    pub dispatched: u64,
    pub pending: usize,
    pub generations: u64,
    pub simulated_ms: u128,
    pub elapsed_ms: u128,
}

pub fn run<C: Clock + 'static>(args: &SimulateArgs, config: &Config, clock: Arc<C>) -> SimulationReport {
    let mut config = config.clone();
    if let Some(ms) = args.timeout_ms {
        config.policies.master = config
            .policies
            .master
            .clone()
            .with_timeout(ms, TimeUnit::Milliseconds);
    }

    let queue = Arc::new(PausedQueue::new());
    let registry = Arc::new(IdlingResourceRegistry::new(queue.clone(), &config.policies));

    let tasks_run = Arc::new(AtomicU64::new(0));
    for &at in &args.task_at {
        let tasks_run = tasks_run.clone();
        queue.post_delayed(
            Box::new(move || {
                tasks_run.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            Duration::from_millis(at),
        );
    }

    if let Some(ms) = args.busy_for {
        let resource = Arc::new(CountingIdlingResource::new("simulated"));
        resource.increment();
        registry.register(resource.clone());
        queue.post_delayed(Box::new(move || resource.decrement()), Duration::from_millis(ms));
    }

    let controller = IdlingController::new(queue.clone(), clock.clone(), registry, &config);
    let started = clock.now();
    let result = match args.at_least {
        Some(ms) => controller.loop_for_at_least(Duration::from_millis(ms)),
        None => controller.loop_until_idle(),
    };
    let elapsed = clock.now().saturating_sub(started);
    info!("Simulation finished in {:?}: {:?}", elapsed, result);

    SimulationReport {
        idle: result.is_ok(),
        error: result.err().map(|e| e.to_string()),
        tasks_run: tasks_run.load(Ordering::SeqCst),
        dispatched: queue.dispatched_count(),
        pending: queue.pending_count(),
        generations: controller.generation(),
        simulated_ms: queue.now().as_millis(),
        elapsed_ms: elapsed.as_millis(),
    }
}
