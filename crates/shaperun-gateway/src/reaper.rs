//! Background retention sweep over the workspace.

use std::sync::Arc;
use std::time::Duration;

use shaperun_pool::TaskRunner;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Every `interval`, delete artifacts and sidecars older than `ttl`.
pub fn spawn_reaper(
    runner: Arc<dyn TaskRunner>,
    ttl: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep(&runner, ttl).await;
        }
    })
}

/// One sweep off the async threads. Returns the number of files removed.
pub async fn sweep(runner: &Arc<dyn TaskRunner>, ttl: Duration) -> usize {
    let runner = Arc::clone(runner);
    match tokio::task::spawn_blocking(move || runner.reap(ttl)).await {
        Ok(Ok(removed)) => {
            if removed > 0 {
                info!(removed, ?ttl, "Reaped expired artifacts");
            }
            removed
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Retention sweep failed");
            0
        }
        Err(e) => {
            warn!(error = %e, "Retention sweep task failed");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaperun_pool::{Dispatcher, PoolConfig, Supervisor, WorkerCommand, Workspace};
    use std::fs;

    #[tokio::test]
    async fn test_sweep_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path()).unwrap();
        fs::write(dir.path().join("old.brep"), "artifact").unwrap();
        fs::write(dir.path().join("old.brep.err"), "detail").unwrap();

        let supervisor = Supervisor::new(PoolConfig::new(
            WorkerCommand::new("shaperun-worker"),
            Default::default(),
        ));
        let runner: Arc<dyn TaskRunner> = Arc::new(Dispatcher::new(workspace, supervisor));

        assert_eq!(sweep(&runner, Duration::from_secs(3600)).await, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sweep(&runner, Duration::ZERO).await, 2);
        assert!(!dir.path().join("old.brep").exists());

        // Nothing was ever dispatched.
        assert_eq!(runner.pool_stats().live, 0);
    }
}
