use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn parse(s: &str) -> Self {
        match s {
            "development" | "dev" => Environment::Development,
            _ => Environment::Production,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbDriver {
    Sqlite,
    Postgres,
}

impl DbDriver {
    fn parse(s: &str) -> trc::Result<Self> {
        match s {
            "sqlite" => Ok(DbDriver::Sqlite),
            "postgres" => Ok(DbDriver::Postgres),
            other => Err(trc::Error::fatal(format!(
                "unsupported DB_DRIVER {other:?}, expected \"sqlite\" or \"postgres\""
            ))),
        }
    }
}

/// Process-environment configuration, per the external interfaces table.
/// There is no layered/file-based config in the source system, so none is
/// invented here.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_url: String,
    pub app_env: Environment,
    pub app_key: String,
    pub smtp_listen_addr: String,
    pub http_listen_addr: String,
    pub db_driver: DbDriver,
    pub db_dsn: String,
    pub webhook_workers: usize,
    pub storage_path: String,
}

impl Config {
    pub fn from_env() -> trc::Result<Self> {
        Ok(Config {
            app_url: env_or("APP_URL", "http://localhost:8080"),
            app_env: Environment::parse(&env_or("APP_ENV", "development")),
            app_key: env_or("APP_KEY", "change-me-in-production-32chars!"),
            smtp_listen_addr: env_or("SMTP_LISTEN_ADDR", ":2525"),
            http_listen_addr: env_or("HTTP_LISTEN_ADDR", ":8080"),
            db_driver: DbDriver::parse(&env_or("DB_DRIVER", "sqlite"))?,
            db_dsn: env_or("DB_DSN", "mailgress.db"),
            webhook_workers: env_parsed("WEBHOOK_WORKERS", 5),
            storage_path: env_or("STORAGE_PATH", "./data/attachments"),
        })
    }

    pub fn is_development(&self) -> bool {
        self.app_env == Environment::Development
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // SAFETY: test runs single-threaded within this process; no other
        // test in this crate touches these env vars.
        for key in [
            "APP_URL",
            "APP_ENV",
            "APP_KEY",
            "SMTP_LISTEN_ADDR",
            "HTTP_LISTEN_ADDR",
            "DB_DRIVER",
            "DB_DSN",
            "WEBHOOK_WORKERS",
            "STORAGE_PATH",
        ] {
            env::remove_var(key);
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.smtp_listen_addr, ":2525");
        assert_eq!(cfg.http_listen_addr, ":8080");
        assert_eq!(cfg.webhook_workers, 5);
        assert_eq!(cfg.storage_path, "./data/attachments");
        assert!(matches!(cfg.db_driver, DbDriver::Sqlite));
        assert!(cfg.is_development());
    }

    #[test]
    fn rejects_unknown_driver() {
        env::set_var("DB_DRIVER", "oracle");
        assert!(Config::from_env().is_err());
        env::remove_var("DB_DRIVER");
    }
}
