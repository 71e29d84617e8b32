//! Response strategies, one per routing category.
//!
//! Every handler satisfies the same contract: given a query and read-only
//! session context, produce an [`AgentResult`]. Collaborator failures are
//! reported as `AgentResult::failure`, never as panics or errors, and model
//! failures degrade to the deterministic answer the handler can compose on
//! its own.

pub mod billing;
pub mod fallback;
pub mod knowledge;
pub mod network;
pub mod service;

use std::sync::Arc;

use async_trait::async_trait;
use telassist_core::domain::support::KnowledgePassage;
use telassist_core::lookup::{AccountLookup, KnowledgeSearch, NetworkStatusLookup};
use telassist_core::{AgentResult, ConversationState, ConversationTurn, Query};
use tracing::warn;

use crate::llm::LlmClient;

pub use billing::BillingHandler;
pub use fallback::FallbackHandler;
pub use knowledge::KnowledgeHandler;
pub use network::NetworkHandler;
pub use service::ServiceHandler;

#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, query: &Query, context: &HandlerContext<'_>) -> AgentResult;
}

/// Read-only view of the session a query belongs to.
#[derive(Clone, Copy, Debug)]
pub struct HandlerContext<'a> {
    conversation: &'a ConversationState,
    prompt_turns: usize,
}

impl<'a> HandlerContext<'a> {
    pub fn new(conversation: &'a ConversationState, prompt_turns: usize) -> Self {
        Self { conversation, prompt_turns }
    }

    pub fn conversation(&self) -> &'a ConversationState {
        self.conversation
    }

    pub fn prior_turns(&self) -> &'a [ConversationTurn] {
        self.conversation.turns()
    }

    /// Recent turns rendered for a model prompt.
    pub fn transcript(&self) -> String {
        self.conversation.transcript(self.prompt_turns)
    }
}

/// Data collaborators shared by the concrete handlers.
#[derive(Clone)]
pub struct SupportServices {
    pub accounts: Arc<dyn AccountLookup>,
    pub network: Arc<dyn NetworkStatusLookup>,
    pub knowledge: Arc<dyn KnowledgeSearch>,
}

/// Asks the model to phrase `facts` for the customer, returning `facts`
/// unchanged when no model is configured or the call fails.
pub(crate) async fn phrase_with_model(
    model: Option<&Arc<dyn LlmClient>>,
    handler: &'static str,
    prompt: String,
    facts: String,
) -> String {
    let Some(model) = model else {
        return facts;
    };

    match model.complete(&prompt).await {
        Ok(text) => text,
        Err(error) => {
            warn!(
                event_name = "handler.model.failed",
                handler,
                error = %error,
                "model phrasing failed, using deterministic answer"
            );
            facts
        }
    }
}

pub(crate) fn prompt_with_context(
    instructions: &str,
    facts: &str,
    context: &HandlerContext<'_>,
    question: &str,
) -> String {
    let history = context.transcript();
    let history = if history.is_empty() { "(none)".to_string() } else { history };
    format!(
        "{instructions}\n\nFacts:\n{facts}\n\nConversation so far:\n{history}\n\nCustomer question: {question}\n\nAnswer:"
    )
}

pub(crate) fn render_passages(passages: &[KnowledgePassage]) -> String {
    passages
        .iter()
        .map(|passage| match passage.topic.as_deref() {
            Some(topic) => format!("From {} ({topic}):\n{}", passage.document, passage.content),
            None => format!("From {}:\n{}", passage.document, passage.content),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use telassist_core::domain::support::{
        ContractTerms, CustomerAccount, KnowledgePassage, NetworkIncident, ServicePlan,
        UsageRecord,
    };
    use telassist_core::lookup::{AccountLookup, KnowledgeSearch, LookupError, NetworkStatusLookup};
    use telassist_core::{ConversationState, CustomerId, Query, Role, SessionId};
    use telassist_db::repositories::{
        InMemoryAccountRepository, InMemoryKnowledgeRepository, InMemoryNetworkStatusRepository,
    };

    use super::SupportServices;
    use crate::llm::LlmClient;

    pub(crate) struct EchoModel;

    #[async_trait]
    impl LlmClient for EchoModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            Ok(format!("model answer ({} prompt chars)", prompt.chars().count()))
        }
    }

    pub(crate) struct DownModel;

    #[async_trait]
    impl LlmClient for DownModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("model endpoint unreachable"))
        }
    }

    /// Every lookup fails as if the database were gone.
    pub(crate) struct UnavailableStore;

    fn unavailable<T>() -> Result<T, LookupError> {
        Err(LookupError::Unavailable("pool timed out".to_string()))
    }

    #[async_trait]
    impl AccountLookup for UnavailableStore {
        async fn find_account(
            &self,
            _customer_id: &CustomerId,
        ) -> Result<Option<CustomerAccount>, LookupError> {
            unavailable()
        }

        async fn find_plan(&self, _plan_id: &str) -> Result<Option<ServicePlan>, LookupError> {
            unavailable()
        }

        async fn list_plans(&self) -> Result<Vec<ServicePlan>, LookupError> {
            unavailable()
        }

        async fn contract_terms(
            &self,
            _plan_id: &str,
        ) -> Result<Option<ContractTerms>, LookupError> {
            unavailable()
        }

        async fn recent_usage(
            &self,
            _customer_id: &CustomerId,
            _limit: u32,
        ) -> Result<Vec<UsageRecord>, LookupError> {
            unavailable()
        }
    }

    #[async_trait]
    impl NetworkStatusLookup for UnavailableStore {
        async fn incidents_for_area(
            &self,
            _area: &str,
        ) -> Result<Vec<NetworkIncident>, LookupError> {
            unavailable()
        }

        async fn known_areas(&self) -> Result<Vec<String>, LookupError> {
            unavailable()
        }
    }

    #[async_trait]
    impl KnowledgeSearch for UnavailableStore {
        async fn search(
            &self,
            _text: &str,
            _limit: usize,
        ) -> Result<Vec<KnowledgePassage>, LookupError> {
            unavailable()
        }
    }

    pub(crate) fn unavailable_services() -> SupportServices {
        SupportServices {
            accounts: Arc::new(UnavailableStore),
            network: Arc::new(UnavailableStore),
            knowledge: Arc::new(UnavailableStore),
        }
    }

    pub(crate) fn query(text: &str) -> Query {
        Query::new(text, SessionId::new("test-session"), Role::Customer)
    }

    pub(crate) fn customer_query(text: &str, customer: &str) -> Query {
        query(text).with_customer(CustomerId::new(customer))
    }

    pub(crate) fn empty_history() -> ConversationState {
        ConversationState::new(SessionId::new("test-session"))
    }

    fn plan(plan_id: &str, name: &str, cost: i64, data_gb: i64) -> ServicePlan {
        ServicePlan {
            plan_id: plan_id.to_string(),
            name: name.to_string(),
            monthly_cost: Decimal::new(cost * 100, 2),
            data_limit_gb: Some(Decimal::new(data_gb, 0)),
            voice_minutes: Some(500),
            sms_count: Some(100),
            description: None,
        }
    }

    fn usage(start: &str, end: &str, data_tenths: i64, extra: i64, total: i64) -> UsageRecord {
        UsageRecord {
            customer_id: CustomerId::new("CUST001"),
            billing_period_start: start.to_string(),
            billing_period_end: end.to_string(),
            data_used_gb: Decimal::new(data_tenths, 1),
            voice_minutes_used: 450,
            sms_count_used: 30,
            additional_charges: Decimal::new(extra * 100, 2),
            total_bill_amount: Decimal::new(total * 100, 2),
        }
    }

    /// CUST001 on the basic plan with two billing periods, the second one
    /// over the data allowance.
    pub(crate) fn seeded_accounts() -> InMemoryAccountRepository {
        InMemoryAccountRepository::default()
            .with_plan(plan("PLAN_BASIC", "Basic Plan", 299, 10))
            .with_plan(plan("PLAN_STANDARD", "Standard Plan", 599, 50))
            .with_plan(plan("PLAN_FAMILY", "Family Plan", 999, 200))
            .with_contract(ContractTerms {
                plan_id: "PLAN_BASIC".to_string(),
                term_months: 12,
                early_termination_fee: Decimal::new(15_000, 2),
                notes: None,
            })
            .with_account(CustomerAccount {
                customer_id: CustomerId::new("CUST001"),
                name: "Test User".to_string(),
                email: None,
                phone_number: None,
                service_plan_id: Some("PLAN_BASIC".to_string()),
                account_status: "Active".to_string(),
            })
            .with_usage(usage("2025-10-01", "2025-10-31", 82, 0, 299))
            .with_usage(usage("2025-11-01", "2025-11-30", 125, 50, 399))
    }

    pub(crate) fn seeded_network() -> InMemoryNetworkStatusRepository {
        InMemoryNetworkStatusRepository::default()
            .with_incident(NetworkIncident {
                area: "Mumbai West".to_string(),
                status: "Outage".to_string(),
                updated_at: "2025-11-20 09:30:00".to_string(),
                details: Some("Localized antenna maintenance affecting voice calls".to_string()),
            })
            .with_incident(NetworkIncident {
                area: "Bengaluru".to_string(),
                status: "Operational".to_string(),
                updated_at: "2025-11-20 08:00:00".to_string(),
                details: None,
            })
    }

    pub(crate) fn seeded_knowledge() -> InMemoryKnowledgeRepository {
        InMemoryKnowledgeRepository::default()
            .with_passage(
                "billing_policies.md",
                "Data overage",
                "Data used beyond your plan allowance is billed per GB and appears as an additional charge.",
            )
            .with_passage(
                "network_troubleshooting.md",
                "Call drops",
                "If calls drop indoors, enable Wi-Fi calling and check that VoLTE is switched on.",
            )
            .with_passage(
                "device_guides.md",
                "VoLTE on Samsung",
                "On Samsung Galaxy phones open Settings, Connections, Mobile networks and turn on VoLTE calls.",
            )
    }

    pub(crate) fn services(
        accounts: InMemoryAccountRepository,
        network: InMemoryNetworkStatusRepository,
        knowledge: InMemoryKnowledgeRepository,
    ) -> SupportServices {
        SupportServices {
            accounts: Arc::new(accounts),
            network: Arc::new(network),
            knowledge: Arc::new(knowledge),
        }
    }
}
