pub mod achievements;
pub mod config;
pub mod error;
pub mod handlers;
pub mod password;
pub mod response;
pub mod store;
pub mod types;
pub mod users;
pub mod validation;

use achievements::AchievementWorkflow;
use config::Config;
use password::PasswordDigest;
use std::sync::Arc;
use store::{AchievementStore, MirrorStore, UserStore};
use users::UserDirectory;

/// Shared application state, built once at cold start.
pub struct AppState {
    pub config: Config,
    pub achievements: AchievementWorkflow,
    pub users: UserDirectory,
}

impl AppState {
    pub fn new(
        config: Config,
        records: Arc<dyn AchievementStore>,
        mirror: Arc<dyn MirrorStore>,
        user_store: Arc<dyn UserStore>,
        digest: Arc<dyn PasswordDigest>,
    ) -> Arc<Self> {
        let achievements = AchievementWorkflow::new(records, mirror, config.store_timeout);
        let users = UserDirectory::new(user_store, digest, config.store_timeout);
        Arc::new(Self {
            config,
            achievements,
            users,
        })
    }
}
