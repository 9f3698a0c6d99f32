use crate::config::AppConfig;
use crate::db::Database;
use crate::users::UserService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<AppConfig>,
    pub users: UserService,
}

impl AppState {
    /// Connects the pool and applies migrations.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = Arc::new(Database::new());
        db.connect(&config.database).await?;
        db.migrate().await?;

        Ok(Self::from_parts(db, config))
    }

    pub fn from_parts(db: Arc<Database>, config: Arc<AppConfig>) -> Self {
        let users = UserService::new(Arc::clone(&db));
        Self { db, config, users }
    }
}

/// State over a fresh migrated SQLite file. Keep the `TempDir` alive for the test.
#[cfg(test)]
pub(crate) async fn test_state() -> (tempfile::TempDir, AppState) {
    let (dir, db) = crate::db::test_support::migrated_database().await;
    let mut config = AppConfig::from_vars(|_| None).expect("default config");
    config.environment = "test".into();
    config.database = crate::db::test_support::config_in(&dir);
    (dir, AppState::from_parts(db, Arc::new(config)))
}
