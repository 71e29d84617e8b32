use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use telassist_core::domain::query::CustomerId;
use telassist_core::domain::support::{ContractTerms, CustomerAccount, ServicePlan, UsageRecord};
use telassist_core::lookup::{AccountLookup, LookupError};

use super::{
    decimal_column, integer_column, optional_decimal_column, optional_integer_column,
    optional_text_column, text_column, RepositoryError,
};
use crate::DbPool;

const PLAN_COLUMNS: &str =
    "plan_id, name, monthly_cost, data_limit_gb, voice_minutes, sms_count, description";

pub struct SqlAccountRepository {
    pool: DbPool,
}

impl SqlAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn fetch_account(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerAccount>, RepositoryError> {
        let row = sqlx::query(
            "SELECT customer_id, name, email, phone_number, service_plan_id, account_status
             FROM customers WHERE customer_id = ?",
        )
        .bind(&customer_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn fetch_plan(&self, plan_id: &str) -> Result<Option<ServicePlan>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PLAN_COLUMNS} FROM service_plans WHERE plan_id = ?"))
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_plan).transpose()
    }

    /// Plans ordered by monthly cost, cheapest first.
    pub async fn fetch_plans(&self) -> Result<Vec<ServicePlan>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {PLAN_COLUMNS} FROM service_plans ORDER BY CAST(monthly_cost AS REAL) ASC, plan_id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_plan).collect()
    }

    pub async fn fetch_contract_terms(
        &self,
        plan_id: &str,
    ) -> Result<Option<ContractTerms>, RepositoryError> {
        let row = sqlx::query(
            "SELECT plan_id, term_months, early_termination_fee, notes
             FROM contract_terms WHERE plan_id = ?",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref()
            .map(|row| {
                Ok(ContractTerms {
                    plan_id: text_column(row, "plan_id")?,
                    term_months: integer_column(row, "term_months")?,
                    early_termination_fee: decimal_column(row, "early_termination_fee")?,
                    notes: optional_text_column(row, "notes")?,
                })
            })
            .transpose()
    }

    pub async fn fetch_usage(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT customer_id, billing_period_start, billing_period_end, data_used_gb,
                    voice_minutes_used, sms_count_used, additional_charges, total_bill_amount
             FROM customer_usage
             WHERE customer_id = ?
             ORDER BY billing_period_start DESC
             LIMIT ?",
        )
        .bind(&customer_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_usage).collect()
    }
}

fn row_to_account(row: &SqliteRow) -> Result<CustomerAccount, RepositoryError> {
    Ok(CustomerAccount {
        customer_id: CustomerId(text_column(row, "customer_id")?),
        name: text_column(row, "name")?,
        email: optional_text_column(row, "email")?,
        phone_number: optional_text_column(row, "phone_number")?,
        service_plan_id: optional_text_column(row, "service_plan_id")?,
        account_status: text_column(row, "account_status")?,
    })
}

fn row_to_plan(row: &SqliteRow) -> Result<ServicePlan, RepositoryError> {
    Ok(ServicePlan {
        plan_id: text_column(row, "plan_id")?,
        name: text_column(row, "name")?,
        monthly_cost: decimal_column(row, "monthly_cost")?,
        data_limit_gb: optional_decimal_column(row, "data_limit_gb")?,
        voice_minutes: optional_integer_column(row, "voice_minutes")?,
        sms_count: optional_integer_column(row, "sms_count")?,
        description: optional_text_column(row, "description")?,
    })
}

fn row_to_usage(row: &SqliteRow) -> Result<UsageRecord, RepositoryError> {
    Ok(UsageRecord {
        customer_id: CustomerId(text_column(row, "customer_id")?),
        billing_period_start: text_column(row, "billing_period_start")?,
        billing_period_end: text_column(row, "billing_period_end")?,
        data_used_gb: decimal_column(row, "data_used_gb")?,
        voice_minutes_used: integer_column(row, "voice_minutes_used")?,
        sms_count_used: integer_column(row, "sms_count_used")?,
        additional_charges: decimal_column(row, "additional_charges")?,
        total_bill_amount: decimal_column(row, "total_bill_amount")?,
    })
}

#[async_trait]
impl AccountLookup for SqlAccountRepository {
    async fn find_account(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerAccount>, LookupError> {
        Ok(self.fetch_account(customer_id).await?)
    }

    async fn find_plan(&self, plan_id: &str) -> Result<Option<ServicePlan>, LookupError> {
        Ok(self.fetch_plan(plan_id).await?)
    }

    async fn list_plans(&self) -> Result<Vec<ServicePlan>, LookupError> {
        Ok(self.fetch_plans().await?)
    }

    async fn contract_terms(&self, plan_id: &str) -> Result<Option<ContractTerms>, LookupError> {
        Ok(self.fetch_contract_terms(plan_id).await?)
    }

    async fn recent_usage(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, LookupError> {
        Ok(self.fetch_usage(customer_id, limit).await?)
    }
}
