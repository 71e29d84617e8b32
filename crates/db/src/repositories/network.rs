use async_trait::async_trait;

use telassist_core::domain::support::NetworkIncident;
use telassist_core::lookup::{LookupError, NetworkStatusLookup};

use super::{optional_text_column, text_column, RepositoryError};
use crate::DbPool;

pub struct SqlNetworkStatusRepository {
    pool: DbPool,
}

impl SqlNetworkStatusRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Exact area matches come first; a partial match such as `Mumbai` for
    /// `Mumbai West` is also returned.
    pub async fn fetch_incidents(&self, area: &str) -> Result<Vec<NetworkIncident>, RepositoryError> {
        let needle = area.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT area, status, updated_at, details
             FROM network_status
             WHERE lower(area) = ?1
                OR instr(lower(area), ?1) > 0
                OR instr(?1, lower(area)) > 0
             ORDER BY (lower(area) = ?1) DESC, updated_at DESC, id ASC",
        )
        .bind(&needle)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(NetworkIncident {
                    area: text_column(row, "area")?,
                    status: text_column(row, "status")?,
                    updated_at: text_column(row, "updated_at")?,
                    details: optional_text_column(row, "details")?,
                })
            })
            .collect()
    }

    pub async fn fetch_areas(&self) -> Result<Vec<String>, RepositoryError> {
        let areas = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT area FROM network_status ORDER BY area ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(areas)
    }
}

#[async_trait]
impl NetworkStatusLookup for SqlNetworkStatusRepository {
    async fn incidents_for_area(&self, area: &str) -> Result<Vec<NetworkIncident>, LookupError> {
        Ok(self.fetch_incidents(area).await?)
    }

    async fn known_areas(&self) -> Result<Vec<String>, LookupError> {
        Ok(self.fetch_areas().await?)
    }
}
