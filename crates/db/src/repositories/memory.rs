use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use telassist_core::domain::query::CustomerId;
use telassist_core::domain::support::{
    ContractTerms, CustomerAccount, KnowledgePassage, NetworkIncident, ServicePlan, UsageRecord,
};
use telassist_core::lookup::{AccountLookup, KnowledgeSearch, LookupError, NetworkStatusLookup};

use super::knowledge::rank_passages;

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<String, CustomerAccount>>,
    plans: RwLock<HashMap<String, ServicePlan>>,
    contracts: RwLock<HashMap<String, ContractTerms>>,
    usage: RwLock<Vec<UsageRecord>>,
}

impl InMemoryAccountRepository {
    pub fn with_account(mut self, account: CustomerAccount) -> Self {
        self.accounts.get_mut().insert(account.customer_id.0.clone(), account);
        self
    }

    pub fn with_plan(mut self, plan: ServicePlan) -> Self {
        self.plans.get_mut().insert(plan.plan_id.clone(), plan);
        self
    }

    pub fn with_contract(mut self, contract: ContractTerms) -> Self {
        self.contracts.get_mut().insert(contract.plan_id.clone(), contract);
        self
    }

    pub fn with_usage(mut self, record: UsageRecord) -> Self {
        self.usage.get_mut().push(record);
        self
    }

    pub async fn save_account(&self, account: CustomerAccount) {
        self.accounts.write().await.insert(account.customer_id.0.clone(), account);
    }
}

#[async_trait]
impl AccountLookup for InMemoryAccountRepository {
    async fn find_account(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<CustomerAccount>, LookupError> {
        Ok(self.accounts.read().await.get(&customer_id.0).cloned())
    }

    async fn find_plan(&self, plan_id: &str) -> Result<Option<ServicePlan>, LookupError> {
        Ok(self.plans.read().await.get(plan_id).cloned())
    }

    async fn list_plans(&self) -> Result<Vec<ServicePlan>, LookupError> {
        let mut plans: Vec<ServicePlan> = self.plans.read().await.values().cloned().collect();
        plans.sort_by(|a, b| a.monthly_cost.cmp(&b.monthly_cost).then_with(|| a.plan_id.cmp(&b.plan_id)));
        Ok(plans)
    }

    async fn contract_terms(&self, plan_id: &str) -> Result<Option<ContractTerms>, LookupError> {
        Ok(self.contracts.read().await.get(plan_id).cloned())
    }

    async fn recent_usage(
        &self,
        customer_id: &CustomerId,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, LookupError> {
        let mut records: Vec<UsageRecord> = self
            .usage
            .read()
            .await
            .iter()
            .filter(|record| record.customer_id == *customer_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.billing_period_start.cmp(&a.billing_period_start));
        records.truncate(limit as usize);
        Ok(records)
    }
}

#[derive(Default)]
pub struct InMemoryNetworkStatusRepository {
    incidents: RwLock<Vec<NetworkIncident>>,
}

impl InMemoryNetworkStatusRepository {
    pub fn with_incident(mut self, incident: NetworkIncident) -> Self {
        self.incidents.get_mut().push(incident);
        self
    }
}

#[async_trait]
impl NetworkStatusLookup for InMemoryNetworkStatusRepository {
    async fn incidents_for_area(&self, area: &str) -> Result<Vec<NetworkIncident>, LookupError> {
        let needle = area.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut matches: Vec<NetworkIncident> = self
            .incidents
            .read()
            .await
            .iter()
            .filter(|incident| {
                let candidate = incident.area.to_lowercase();
                candidate.contains(&needle) || needle.contains(&candidate)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            let a_exact = a.area.to_lowercase() == needle;
            let b_exact = b.area.to_lowercase() == needle;
            b_exact.cmp(&a_exact).then_with(|| b.updated_at.cmp(&a.updated_at))
        });
        Ok(matches)
    }

    async fn known_areas(&self) -> Result<Vec<String>, LookupError> {
        let mut areas: Vec<String> =
            self.incidents.read().await.iter().map(|incident| incident.area.clone()).collect();
        areas.sort();
        areas.dedup();
        Ok(areas)
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeRepository {
    passages: RwLock<Vec<KnowledgePassage>>,
}

impl InMemoryKnowledgeRepository {
    pub fn with_passage(
        mut self,
        document: impl Into<String>,
        topic: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.passages.get_mut().push(KnowledgePassage {
            document: document.into(),
            topic: Some(topic.into()),
            content: content.into(),
            score: 0,
        });
        self
    }
}

#[async_trait]
impl KnowledgeSearch for InMemoryKnowledgeRepository {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<KnowledgePassage>, LookupError> {
        let candidates = self.passages.read().await.clone();
        Ok(rank_passages(text, candidates, limit))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use telassist_core::domain::query::CustomerId;
    use telassist_core::domain::support::{
        ContractTerms, CustomerAccount, NetworkIncident, ServicePlan, UsageRecord,
    };
    use telassist_core::lookup::{AccountLookup, KnowledgeSearch, NetworkStatusLookup};

    use crate::repositories::{
        InMemoryAccountRepository, InMemoryKnowledgeRepository, InMemoryNetworkStatusRepository,
    };

    fn usage(start: &str, total: i64) -> UsageRecord {
        UsageRecord {
            customer_id: CustomerId::new("CUST001"),
            billing_period_start: start.to_string(),
            billing_period_end: start.to_string(),
            data_used_gb: Decimal::new(125, 1),
            voice_minutes_used: 10,
            sms_count_used: 1,
            additional_charges: Decimal::ZERO,
            total_bill_amount: Decimal::new(total, 0),
        }
    }

    #[tokio::test]
    async fn in_memory_account_snapshot_combines_records() {
        let repo = InMemoryAccountRepository::default()
            .with_plan(ServicePlan {
                plan_id: "PLAN_BASIC".to_string(),
                name: "Basic Plan".to_string(),
                monthly_cost: Decimal::new(29_900, 2),
                data_limit_gb: Some(Decimal::new(10, 0)),
                voice_minutes: Some(500),
                sms_count: Some(100),
                description: None,
            })
            .with_contract(ContractTerms {
                plan_id: "PLAN_BASIC".to_string(),
                term_months: 12,
                early_termination_fee: Decimal::new(150, 0),
                notes: None,
            })
            .with_account(CustomerAccount {
                customer_id: CustomerId::new("CUST001"),
                name: "Test User".to_string(),
                email: None,
                phone_number: None,
                service_plan_id: Some("PLAN_BASIC".to_string()),
                account_status: "active".to_string(),
            })
            .with_usage(usage("2025-10-01", 299))
            .with_usage(usage("2025-11-01", 399));

        let snapshot = repo
            .snapshot(&CustomerId::new("CUST001"), 2)
            .await
            .expect("snapshot")
            .expect("customer exists");

        assert_eq!(snapshot.plan.map(|plan| plan.name), Some("Basic Plan".to_string()));
        assert_eq!(snapshot.contract.map(|terms| terms.term_months), Some(12));
        assert_eq!(snapshot.usage.len(), 2);
        assert_eq!(snapshot.usage[0].billing_period_start, "2025-11-01");

        assert!(repo.snapshot(&CustomerId::new("NOPE"), 2).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn in_memory_network_lookup_prefers_exact_area() {
        let incident = |area: &str, status: &str| NetworkIncident {
            area: area.to_string(),
            status: status.to_string(),
            updated_at: "2025-12-01".to_string(),
            details: None,
        };
        let repo = InMemoryNetworkStatusRepository::default()
            .with_incident(incident("Mumbai West", "Outage"))
            .with_incident(incident("Mumbai", "Operational"));

        let found = repo.incidents_for_area("mumbai west").await.expect("lookup");
        assert_eq!(found[0].status, "Outage");
        assert!(repo.incidents_for_area("Chennai").await.expect("lookup").is_empty());
        assert_eq!(repo.known_areas().await.expect("areas"), vec!["Mumbai", "Mumbai West"]);
    }

    #[tokio::test]
    async fn in_memory_knowledge_search_ranks_passages() {
        let repo = InMemoryKnowledgeRepository::default()
            .with_passage("device_guides.md", "APN settings", "Create an APN named internet.")
            .with_passage("billing_policies.md", "Roaming charges", "Roaming is billed per day.");

        let found = repo.search("APN settings for data", 3).await.expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].document, "device_guides.md");
    }
}
