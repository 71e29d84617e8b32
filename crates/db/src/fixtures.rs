use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Expected minimum row counts per seeded table.
const SEED_TABLES: &[SeedTableContract] = &[
    SeedTableContract { table: "service_plans", min_rows: 3 },
    SeedTableContract { table: "contract_terms", min_rows: 3 },
    SeedTableContract { table: "customers", min_rows: 2 },
    SeedTableContract { table: "customer_usage", min_rows: 3 },
    SeedTableContract { table: "network_status", min_rows: 3 },
    SeedTableContract { table: "knowledge_passages", min_rows: 14 },
];

const SEED_CUSTOMER_IDS: &[&str] = &["CUST001", "CUST002"];
const SEED_PLAN_IDS: &[&str] = &["PLAN_BASIC", "PLAN_STANDARD", "PLAN_FAMILY"];
const SEED_USAGE_IDS: &[&str] =
    &["USG-CUST001-2025-10", "USG-CUST001-2025-11", "USG-CUST002-2025-11"];
const SEED_NETWORK_IDS: &[&str] = &["NET-001", "NET-002", "NET-003"];

/// Deterministic support fixtures: plans, two customers with billing history,
/// regional network status and the troubleshooting and billing-policy
/// passages the knowledge handler searches.
pub struct SupportSeedDataset;

impl SupportSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/support_seed_data.sql");

    /// Load the dataset. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(Self::SQL).await?;
        tx.commit().await?;

        let mut tables = Vec::with_capacity(SEED_TABLES.len());
        for contract in SEED_TABLES {
            let rows = count_rows(pool, contract.table).await?;
            tables.push(TableSeedInfo { table: contract.table, rows });
        }

        Ok(SeedResult { tables })
    }

    /// Verify that seed data exists and matches the contract.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for contract in SEED_TABLES {
            let rows = count_rows(pool, contract.table).await?;
            checks.push((contract.table, rows >= contract.min_rows));
        }

        let basic_customer: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM customers WHERE customer_id = 'CUST001' AND service_plan_id = 'PLAN_BASIC')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("customer-basic-plan", basic_customer == 1));

        let usage_history: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM customer_usage WHERE customer_id = 'CUST001'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("customer-usage-history", usage_history >= 2));

        let outage: i64 = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM network_status WHERE area = 'Mumbai West' AND status = 'Outage')",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("network-outage", outage == 1));

        let orphaned_usage: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM customer_usage u
             LEFT JOIN customers c ON c.customer_id = u.customer_id
             WHERE c.customer_id IS NULL",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("usage-references-customers", orphaned_usage == 0));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Remove seeded rows from a test database.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(&format!(
            "DELETE FROM customer_usage WHERE usage_id IN {}",
            sql_array_from_ids(SEED_USAGE_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "DELETE FROM customers WHERE customer_id IN {}",
            sql_array_from_ids(SEED_CUSTOMER_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        let plans = sql_array_from_ids(SEED_PLAN_IDS);
        sqlx::query(&format!("DELETE FROM contract_terms WHERE plan_id IN {plans}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DELETE FROM service_plans WHERE plan_id IN {plans}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "DELETE FROM network_status WHERE id IN {}",
            sql_array_from_ids(SEED_NETWORK_IDS)
        ))
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM knowledge_passages WHERE passage_id LIKE 'KB-%'")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

async fn count_rows(pool: &DbPool, table: &str) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar(&format!("SELECT COUNT(1) FROM {table}")).fetch_one(pool).await?;
    Ok(count)
}

#[derive(Debug, Clone, Copy)]
struct SeedTableContract {
    table: &'static str,
    min_rows: i64,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub tables: Vec<TableSeedInfo>,
}

impl SeedResult {
    pub fn total_rows(&self) -> i64 {
        self.tables.iter().map(|table| table.rows).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSeedInfo {
    pub table: &'static str,
    pub rows: i64,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
