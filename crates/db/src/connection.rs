use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&normalize_url(database_url))
        .await
}

/// Round-trips a trivial statement; used by readiness probes.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.map(|_| ())
}

fn normalize_url(database_url: &str) -> String {
    let trimmed = database_url.trim();
    if trimmed == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if trimmed.starts_with("sqlite://") && !trimmed.contains("mode=") && !trimmed.contains(":memory:")
    {
        let separator = if trimmed.contains('?') { '&' } else { '?' };
        return format!("{trimmed}{separator}mode=rwc");
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, normalize_url, ping};

    #[test]
    fn file_urls_are_created_on_demand() {
        assert_eq!(normalize_url("sqlite://telassist.db"), "sqlite://telassist.db?mode=rwc");
        assert_eq!(normalize_url("sqlite://a.db?cache=shared"), "sqlite://a.db?cache=shared&mode=rwc");
        assert_eq!(normalize_url("sqlite://a.db?mode=ro"), "sqlite://a.db?mode=ro");
        assert_eq!(normalize_url(":memory:"), "sqlite::memory:");
        assert_eq!(normalize_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn in_memory_pool_answers_ping() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        ping(&pool).await.expect("ping");
    }
}
