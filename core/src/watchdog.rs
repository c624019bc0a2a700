//! Stall detection for build processes.
//!
//! A watchdog samples the CPU usage of one build process at a fixed interval
//! and keeps a decayed inactivity score: idle samples add a fixed increment,
//! active samples multiply the score down. Crossing the threshold reports the
//! process as stuck; the owner of the process is responsible for killing it.

use std::collections::HashSet;
use std::time::Duration;

use sysinfo::{Pid, ProcessRefreshKind, System};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::WatchdogConfig;

#[derive(Debug, Clone)]
pub struct InactivityScore {
    score: f64,
    idle_cpu_percent: f32,
    idle_increment: f64,
    decay: f64,
    threshold: f64,
}

impl InactivityScore {
    pub fn new(cfg: &WatchdogConfig) -> Self {
        Self {
            score: 0.0,
            idle_cpu_percent: cfg.idle_cpu_percent,
            idle_increment: cfg.idle_increment,
            decay: cfg.decay,
            threshold: cfg.threshold,
        }
    }

    /// Feed one CPU sample (percent). Returns true once the score exceeds
    /// the threshold.
    pub fn observe(&mut self, cpu_percent: f32) -> bool {
        if cpu_percent <= self.idle_cpu_percent {
            self.score += self.idle_increment;
        } else {
            self.score *= self.decay;
        }
        self.score > self.threshold
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Source of CPU usage samples for one process.
pub trait CpuSampler: Send {
    /// Current CPU usage in percent, or `None` once the process is gone.
    fn sample(&mut self) -> Option<f32>;
}

/// Samples a live process through `sysinfo`, optionally summing the usage of
/// every descendant (build drivers mostly wait on compiler children).
pub struct SysinfoSampler {
    system: System,
    pid: Pid,
    include_children: bool,
}

impl SysinfoSampler {
    pub fn new(pid: u32, include_children: bool) -> Self {
        let mut sampler = Self {
            system: System::new(),
            pid: Pid::from_u32(pid),
            include_children,
        };
        // cpu_usage is a delta between refreshes; prime the first one
        sampler.refresh();
        sampler
    }

    fn refresh(&mut self) -> bool {
        let kind = ProcessRefreshKind::new().with_cpu();
        if self.include_children {
            self.system.refresh_processes_specifics(kind);
            self.system.process(self.pid).is_some()
        } else {
            self.system.refresh_process_specifics(self.pid, kind)
        }
    }

    fn tree_usage(&self) -> f32 {
        let mut members = HashSet::from([self.pid]);
        loop {
            let before = members.len();
            for (pid, process) in self.system.processes() {
                if process.parent().is_some_and(|parent| members.contains(&parent)) {
                    members.insert(*pid);
                }
            }
            if members.len() == before {
                break;
            }
        }
        members
            .iter()
            .filter_map(|pid| self.system.process(*pid))
            .map(|p| p.cpu_usage())
            .sum()
    }
}

impl CpuSampler for SysinfoSampler {
    fn sample(&mut self) -> Option<f32> {
        if !self.refresh() {
            return None;
        }
        if self.include_children {
            Some(self.tree_usage())
        } else {
            self.system.process(self.pid).map(|p| p.cpu_usage())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchdogVerdict {
    Stalled { score: f64 },
    ProcessGone,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    score: InactivityScore,
    interval: Duration,
}

impl Watchdog {
    pub fn new(cfg: &WatchdogConfig) -> Self {
        Self {
            score: InactivityScore::new(cfg),
            interval: Duration::from_millis(cfg.sample_interval_ms.max(1)),
        }
    }

    /// Sample until the process stalls or disappears.
    pub async fn watch<S: CpuSampler>(mut self, mut sampler: S) -> WatchdogVerdict {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(cpu) = sampler.sample() else {
                return WatchdogVerdict::ProcessGone;
            };
            if self.score.observe(cpu) {
                return WatchdogVerdict::Stalled {
                    score: self.score.score(),
                };
            }
            tracing::trace!(cpu, score = self.score.score(), "watchdog sample");
        }
    }

    /// Run [`Watchdog::watch`] on its own task.
    pub fn spawn<S: CpuSampler + 'static>(self, sampler: S) -> WatchdogHandle {
        WatchdogHandle {
            handle: Some(tokio::spawn(self.watch(sampler))),
        }
    }
}

/// Owner side of a spawned watchdog. Dropping it stops the watchdog.
pub struct WatchdogHandle {
    handle: Option<JoinHandle<WatchdogVerdict>>,
}

impl WatchdogHandle {
    /// Resolves with the inactivity score if the process stalls; never
    /// resolves otherwise.
    pub async fn stalled(&mut self) -> f64 {
        if let Some(handle) = self.handle.as_mut() {
            let verdict = handle.await;
            self.handle = None;
            if let Ok(WatchdogVerdict::Stalled { score }) = verdict {
                return score;
            }
        }
        std::future::pending().await
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
