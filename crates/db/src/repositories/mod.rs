use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use telassist_core::lookup::LookupError;

pub mod account;
pub mod knowledge;
pub mod memory;
pub mod network;

pub use account::SqlAccountRepository;
pub use knowledge::{rank_passages, score_passage, SqlKnowledgeRepository};
pub use memory::{
    InMemoryAccountRepository, InMemoryKnowledgeRepository, InMemoryNetworkStatusRepository,
};
pub use network::SqlNetworkStatusRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for LookupError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Database(error) => Self::Unavailable(error.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}

pub(crate) fn text_column(row: &SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn optional_text_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<String>, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn integer_column(row: &SqliteRow, column: &str) -> Result<i64, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn optional_integer_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<i64>, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, RepositoryError> {
    parse_decimal(column, &text_column(row, column)?)
}

pub(crate) fn optional_decimal_column(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, RepositoryError> {
    optional_text_column(row, column)?.map(|raw| parse_decimal(column, &raw)).transpose()
}

fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw.trim())
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}

#[cfg(test)]
mod tests {
    use telassist_core::lookup::LookupError;

    use super::{parse_decimal, RepositoryError};

    #[test]
    fn decimals_parse_from_text_columns() {
        assert_eq!(parse_decimal("monthly_cost", " 299.00 ").expect("parse").to_string(), "299.00");
        assert!(matches!(
            parse_decimal("monthly_cost", "cheap"),
            Err(RepositoryError::Decode(message)) if message.contains("monthly_cost")
        ));
    }

    #[test]
    fn repository_errors_map_to_lookup_errors() {
        let decode = LookupError::from(RepositoryError::Decode("bad row".to_string()));
        assert_eq!(decode, LookupError::Decode("bad row".to_string()));

        let database = LookupError::from(RepositoryError::Database(sqlx::Error::PoolClosed));
        assert!(matches!(database, LookupError::Unavailable(_)));
    }
}
