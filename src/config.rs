use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    /// Pool settings for a SQLite file, used by tests and local tooling.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub app_version: String,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unparsable numbers fall back to defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        let environment = var("ENVIRONMENT").unwrap_or_else(|| "dev".into());
        anyhow::ensure!(
            matches!(environment.as_str(), "dev" | "test" | "prod"),
            "ENVIRONMENT must be one of dev, test, prod (got {environment})"
        );

        let database = DatabaseConfig {
            url: var("DATABASE_URL").unwrap_or_else(|| "sqlite://admin_portal.db".into()),
            max_connections: u32::try_from(number("DB_POOL_SIZE", 10))
                .unwrap_or(10)
                .max(1),
            acquire_timeout: Duration::from_secs(number("DB_ACQUIRE_TIMEOUT_SECS", 30)),
            busy_timeout: Duration::from_secs(number("DB_BUSY_TIMEOUT_SECS", 5)),
        };

        let cors_origins = var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            app_name: var("APP_NAME").unwrap_or_else(|| "Admin Portal API".into()),
            app_version: env!("CARGO_PKG_VERSION").into(),
            environment,
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: var("APP_PORT")
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            database,
            cors_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.environment, "dev");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.database.max_connections, 10);
        assert_eq!(cfg.database.acquire_timeout, Duration::from_secs(30));
        assert!(cfg.cors_origins.is_empty());
    }

    #[test]
    fn reads_pool_and_cors_settings() {
        let cfg = config_from(&[
            ("DATABASE_URL", "sqlite://test.db"),
            ("DB_POOL_SIZE", "3"),
            ("DB_ACQUIRE_TIMEOUT_SECS", "2"),
            ("CORS_ORIGINS", "http://localhost:3000, http://localhost:8000,"),
            ("ENVIRONMENT", "test"),
        ])
        .unwrap();
        assert_eq!(cfg.database.url, "sqlite://test.db");
        assert_eq!(cfg.database.max_connections, 3);
        assert_eq!(cfg.database.acquire_timeout, Duration::from_secs(2));
        assert_eq!(
            cfg.cors_origins,
            vec!["http://localhost:3000", "http://localhost:8000"]
        );
    }

    #[test]
    fn pool_size_is_at_least_one_and_garbage_falls_back() {
        let cfg = config_from(&[("DB_POOL_SIZE", "0"), ("APP_PORT", "nope")]).unwrap();
        assert_eq!(cfg.database.max_connections, 1);
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn rejects_unknown_environment() {
        assert!(config_from(&[("ENVIRONMENT", "staging")]).is_err());
    }
}
