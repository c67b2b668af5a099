use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

use crate::migrate::{split_statements, translate_for_postgres, CREATE_TRACKING_TABLE_POSTGRES, MIGRATIONS};

#[derive(Clone)]
pub struct PostgresBackend {
    pub(crate) pool: Pool,
}

impl PostgresBackend {
    pub async fn open(dsn: &str) -> trc::Result<Self> {
        let config: tokio_postgres::Config = dsn
            .parse()
            .map_err(|e| trc::Error::fatal(format!("invalid postgres DSN: {e}")))?;
        let manager = Manager::from_config(
            config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(25)
            .build()
            .map_err(|e| trc::Error::fatal(format!("failed to build postgres pool: {e}")))?;
        Ok(PostgresBackend { pool })
    }

    pub async fn migrate(&self) -> trc::Result<()> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| trc::Error::fatal(format!("failed to acquire postgres connection: {e}")))?;
        client
            .batch_execute(CREATE_TRACKING_TABLE_POSTGRES)
            .await
            .map_err(|e| trc::Error::fatal(format!("failed to create schema_migrations: {e}")))?;

        for (version, sql) in MIGRATIONS {
            let row = client
                .query_one(
                    "SELECT COUNT(*) FROM schema_migrations WHERE version = $1",
                    &[version],
                )
                .await
                .map_err(|e| trc::Error::fatal(format!("failed to check migration {version}: {e}")))?;
            let applied: i64 = row.get(0);
            if applied > 0 {
                continue;
            }
            let translated = translate_for_postgres(sql);
            for stmt in split_statements(&translated) {
                client
                    .batch_execute(&stmt)
                    .await
                    .map_err(|e| trc::Error::fatal(format!("migration {version} failed: {e}")))?;
            }
            client
                .execute(
                    "INSERT INTO schema_migrations (version) VALUES ($1)",
                    &[version],
                )
                .await
                .map_err(|e| trc::Error::fatal(format!("failed to record migration {version}: {e}")))?;
        }
        Ok(())
    }
}
