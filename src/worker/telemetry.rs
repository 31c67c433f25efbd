//! Shared metrics surface for worker snapshots and process resource sampling

use dashmap::DashMap;
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use uuid::Uuid;

use super::{WorkerSnapshot, WorkerStatus};
use crate::models::Lane;

/// Latest snapshot per worker, readable by operators while slots publish
#[derive(Debug, Default)]
pub struct TelemetryRegistry {
    snapshots: DashMap<Uuid, WorkerSnapshot>,
}

impl TelemetryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: WorkerSnapshot) {
        self.snapshots.insert(snapshot.worker_id, snapshot);
    }

    pub fn get(&self, worker_id: Uuid) -> Option<WorkerSnapshot> {
        self.snapshots.get(&worker_id).map(|entry| entry.clone())
    }

    pub fn remove(&self, worker_id: Uuid) -> Option<WorkerSnapshot> {
        self.snapshots.remove(&worker_id).map(|(_, snapshot)| snapshot)
    }

    pub fn snapshots(&self) -> Vec<WorkerSnapshot> {
        self.snapshots.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn lane_snapshots(&self, lane: Lane) -> Vec<WorkerSnapshot> {
        self.snapshots
            .iter()
            .filter(|entry| entry.lane == lane)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Workers currently holding a job
    pub fn busy_count(&self, lane: Lane) -> usize {
        self.snapshots
            .iter()
            .filter(|entry| {
                entry.lane == lane
                    && matches!(entry.status, WorkerStatus::Processing | WorkerStatus::Stalled)
            })
            .count()
    }
}

/// Memory and CPU of the current process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    pub memory_bytes: u64,
    pub cpu_percent: f32,
}

/// Samples the current process through sysinfo
#[derive(Debug)]
pub struct ResourceSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    /// A zeroed sample if the process cannot be inspected on this platform
    pub fn sample(&self) -> ResourceSample {
        let Some(pid) = self.pid else {
            return ResourceSample::default();
        };
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            ProcessRefreshKind::new().with_memory().with_cpu(),
        );
        system
            .process(pid)
            .map(|process| ResourceSample {
                memory_bytes: process.memory(),
                cpu_percent: process.cpu_usage(),
            })
            .unwrap_or_default()
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}
