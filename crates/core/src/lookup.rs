//! Collaborator seams handlers use to reach support data.
//!
//! Implementations live in `telassist-db`; handlers only see these traits so
//! they can be exercised against in-memory fixtures.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::query::CustomerId;
use crate::domain::support::{
    AccountSnapshot, ContractTerms, CustomerAccount, KnowledgePassage, NetworkIncident,
    ServicePlan, UsageRecord,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("support data unavailable: {0}")]
    Unavailable(String),
    #[error("support data could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn find_account(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerAccount>, LookupError>;

    async fn find_plan(&self, plan_id: &str) -> Result<Option<ServicePlan>, LookupError>;

    async fn list_plans(&self) -> Result<Vec<ServicePlan>, LookupError>;

    async fn contract_terms(&self, plan_id: &str) -> Result<Option<ContractTerms>, LookupError>;

    /// Usage rows for a customer, newest billing period first.
    async fn recent_usage(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, LookupError>;

    async fn snapshot(
        &self,
        customer_id: &CustomerId,
        usage_limit: u32,
    ) -> Result<Option<AccountSnapshot>, LookupError> {
        let Some(account) = self.find_account(customer_id).await? else {
            return Ok(None);
        };

        let (plan, contract) = match account.service_plan_id.as_deref() {
            Some(plan_id) => (self.find_plan(plan_id).await?, self.contract_terms(plan_id).await?),
            None => (None, None),
        };
        let usage = self.recent_usage(customer_id, usage_limit).await?;

        Ok(Some(AccountSnapshot { account, plan, contract, usage }))
    }
}

#[async_trait]
pub trait NetworkStatusLookup: Send + Sync {
    /// Incidents whose area matches `area` case-insensitively, newest first.
    async fn incidents_for_area(&self, area: &str) -> Result<Vec<NetworkIncident>, LookupError>;

    async fn known_areas(&self) -> Result<Vec<String>, LookupError>;
}

#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    /// Best matching passages for `text`, highest score first, at most `limit`.
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<KnowledgePassage>, LookupError>;
}
