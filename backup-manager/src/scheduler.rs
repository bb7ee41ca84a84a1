//! Periodic tick that selects due agents, enforces the per-agent in-flight
//! guard, and hands each due agent off to the pull client.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use backup_kernel::{Registry, TaskScheduler};
use backup_primitives::{AgentId, AgentRecord};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::pull_client;

/// Drives the periodic scheduler tick against a shared [`Registry`].
pub struct Scheduler {
    registry: Arc<Registry>,
    tick_window: std::time::Duration,
    in_flight: Arc<Mutex<HashSet<AgentId>>>,
}

impl Scheduler {
    /// Builds a scheduler that ticks every `tick_window` against `registry`.
    #[must_use]
    pub fn new(registry: Arc<Registry>, tick_window: std::time::Duration) -> Self {
        Self {
            registry,
            tick_window,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Runs the periodic tick loop until `shutdown` resolves.
    pub async fn run(&self, task_scheduler: TaskScheduler, shutdown: impl std::future::Future<Output = ()>) {
        let mut interval = tokio::time::interval(self.tick_window);
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(&task_scheduler).await;
                }
                () = &mut shutdown => {
                    info!("scheduler shutting down");
                    return;
                }
            }
        }
    }

    async fn tick(&self, task_scheduler: &TaskScheduler) {
        let now0 = Utc::now();
        let backups = self.registry.list().await;

        let mut updates: HashMap<AgentId, AgentRecord> = HashMap::new();
        let mut in_flight = self.in_flight.lock().await;

        for (id, record) in backups {
            if !is_due(&record, now0) {
                continue;
            }
            if in_flight.contains(&id) {
                warn!(agent_id = %id, "skipping tick: previous pull still in flight");
                continue;
            }
            let Ok(freq) = record.parsed_freq() else {
                warn!(agent_id = %id, freq = %record.freq, "skipping tick: frequency no longer parses");
                continue;
            };

            in_flight.insert(id);
            let mut updated = record.clone();
            updated.next = (now0 + freq).to_rfc3339();
            updates.insert(id, updated);

            self.spawn_pull(task_scheduler, id, record);
        }
        drop(in_flight);

        if let Err(err) = self.registry.apply_updates(updates).await {
            warn!(%err, "failed to persist scheduler tick advances");
        }
    }

    fn spawn_pull(&self, task_scheduler: &TaskScheduler, id: AgentId, record: AgentRecord) {
        let registry = Arc::clone(&self.registry);
        let in_flight = Arc::clone(&self.in_flight);

        task_scheduler.spawn(async move {
            let agent_dir = match registry.ensure_agent_dir(id).await {
                Ok(dir) => dir,
                Err(err) => {
                    warn!(agent_id = %id, %err, "failed to ensure agent directory before pull");
                    in_flight.lock().await.remove(&id);
                    return;
                }
            };

            if let Err(err) = pull_client::pull_agent(id, &record, &agent_dir).await {
                warn!(agent_id = %id, %err, "pull job failed");
            }
            in_flight.lock().await.remove(&id);
        });
    }
}

fn is_due(record: &AgentRecord, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(&record.next) {
        Ok(next) => next.with_timezone(&Utc) < now,
        Err(_) => true,
    }
}
