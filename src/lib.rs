pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod engine;
pub mod notifications;
pub mod services;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::engine::SlaPolicy;
use crate::notifications::Notifier;
use crate::services::cleanup::RegistrationCleanup;
use crate::services::{Directory, RoleRequestWorkflow, TicketStore};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub directory: Directory,
    pub workflow: RoleRequestWorkflow,
    pub tickets: TicketStore,
    pub notifier: Arc<dyn Notifier>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, notifier: Arc<dyn Notifier>) -> Self {
        let directory = Directory::new(db.clone(), &config.auth);
        let workflow =
            RoleRequestWorkflow::new(db.clone(), notifier.clone(), &config.registration);
        let tickets = TicketStore::new(db.clone(), SlaPolicy::from_config(&config.sla));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            directory,
            workflow,
            tickets,
            notifier,
            rate_limiter,
        }
    }

    /// Background purge of lapsed registrations and sessions
    pub fn registration_cleanup(&self) -> RegistrationCleanup {
        RegistrationCleanup::new(self.workflow.clone(), self.directory.clone())
    }
}
