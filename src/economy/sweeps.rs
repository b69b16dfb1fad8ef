//! Periodic background passes: autosave, loan-due notices and interaction expiry.
//!
//! Each sweep is its own tokio task driven by `tokio::time::interval`. An
//! interval of zero disables that sweep. Stop the sweeps before calling
//! `EconomyService::shutdown`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::economy::service::EconomyService;

/// Sweep periods in seconds; 0 disables a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepIntervals {
    pub autosave_seconds: u64,
    pub loan_due_seconds: u64,
    pub interaction_expiry_seconds: u64,
}

impl Default for SweepIntervals {
    fn default() -> Self {
        Self {
            autosave_seconds: 600,
            loan_due_seconds: 60,
            interaction_expiry_seconds: 1,
        }
    }
}

/// Running sweep tasks.
pub struct SweepHandles {
    stop: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SweepHandles {
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// Signal every sweep to stop and wait for them to finish.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        debug!("sweeps stopped");
    }
}

/// Spawn the enabled sweeps on the current runtime.
pub fn start_sweeps(service: Arc<EconomyService>, intervals: SweepIntervals) -> SweepHandles {
    let (stop, stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if intervals.autosave_seconds > 0 {
        let service = service.clone();
        tasks.push(spawn_sweep(
            "autosave",
            intervals.autosave_seconds,
            stop_rx.clone(),
            move || {
                let queued = service.autosave();
                if queued > 0 {
                    info!("autosave: {} accounts queued", queued);
                }
            },
        ));
    } else {
        info!("autosave disabled");
    }

    if intervals.loan_due_seconds > 0 {
        let service = service.clone();
        tasks.push(spawn_sweep(
            "loan-due",
            intervals.loan_due_seconds,
            stop_rx.clone(),
            move || {
                let notified = service.sweep_overdue_loans(Utc::now());
                if notified > 0 {
                    info!("loan-due sweep: {} overdue notices sent", notified);
                }
            },
        ));
    }

    if intervals.interaction_expiry_seconds > 0 {
        let service = service.clone();
        tasks.push(spawn_sweep(
            "interaction-expiry",
            intervals.interaction_expiry_seconds,
            stop_rx,
            move || {
                let expired = service.expire_interactions(Utc::now());
                if expired > 0 {
                    debug!("{} interactions timed out", expired);
                }
            },
        ));
    }

    SweepHandles { stop, tasks }
}

fn spawn_sweep<F>(
    name: &'static str,
    period_seconds: u64,
    mut stop: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(period_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick fires immediately
        interval.tick().await;
        debug!("{} sweep every {}s", name, period_seconds);
        loop {
            tokio::select! {
                _ = interval.tick() => tick(),
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
