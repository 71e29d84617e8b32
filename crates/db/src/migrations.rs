use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of migrations embedded in the binary.
pub fn embedded_count() -> usize {
    MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count()
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{embedded_count, run_pending};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const MANAGED_SCHEMA_OBJECTS: &[&str] = &[
        "service_plans",
        "customers",
        "contract_terms",
        "customer_usage",
        "network_status",
        "knowledge_passages",
        "idx_customer_usage_customer_period",
        "idx_network_status_area",
        "idx_knowledge_passages_document",
    ];

    async fn table_exists(pool: &sqlx::SqlitePool, name: &str) -> bool {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?1",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
            == 1
    }

    #[tokio::test]
    async fn migrations_create_support_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_SCHEMA_OBJECTS.iter().filter(|name| !name.starts_with("idx_")) {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
        assert_eq!(embedded_count(), 1);
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert!(!table_exists(&pool, "customers").await);
        assert!(!table_exists(&pool, "knowledge_passages").await);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            MANAGED_SCHEMA_OBJECTS.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(
            managed_schema_signature(&pool).await.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(
            managed_schema_signature(&pool).await,
            initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            if MANAGED_SCHEMA_OBJECTS.contains(&name.as_str()) {
                Some((row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
            } else {
                None
            }
        })
        .collect();
        signature.sort();
        signature
    }
}
