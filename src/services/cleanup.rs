//! Periodic purge of lapsed registrations and sessions.

use chrono::Utc;
use tokio::time::{interval, Duration};

use super::{Directory, RoleRequestWorkflow, ServiceResult};

pub struct RegistrationCleanup {
    workflow: RoleRequestWorkflow,
    directory: Directory,
}

/// Statistics from a cleanup run
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub pending_users_removed: u64,
    pub sessions_removed: u64,
}

impl RegistrationCleanup {
    pub fn new(workflow: RoleRequestWorkflow, directory: Directory) -> Self {
        Self {
            workflow,
            directory,
        }
    }

    /// Run a single cleanup cycle
    pub async fn run_cleanup(&self) -> ServiceResult<CleanupStats> {
        let now = Utc::now();
        let stats = CleanupStats {
            pending_users_removed: self.workflow.purge_expired_pending(now).await?,
            sessions_removed: self.directory.purge_expired_sessions(now).await?,
        };

        if stats.pending_users_removed > 0 || stats.sessions_removed > 0 {
            tracing::info!(
                pending_users = stats.pending_users_removed,
                sessions = stats.sessions_removed,
                "Cleanup cycle completed"
            );
        } else {
            tracing::debug!("Cleanup cycle found nothing to remove");
        }

        Ok(stats)
    }
}

/// Spawn the background cleanup task
pub fn spawn_cleanup_task(cleanup: RegistrationCleanup, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("Registration cleanup is disabled");
        return;
    }

    tracing::info!(interval_secs, "Starting registration cleanup task");

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = cleanup.run_cleanup().await {
                tracing::error!(error = %e, "Cleanup cycle failed");
            }
        }
    });
}
