use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use telassist_core::domain::support::{AccountSnapshot, UsageRecord};
use telassist_core::lookup::{AccountLookup, KnowledgeSearch};
use telassist_core::{AgentResult, Query};
use tracing::debug;

use super::{phrase_with_model, prompt_with_context, render_passages, Handler, HandlerContext};
use crate::llm::LlmClient;

const USAGE_PERIODS: u32 = 3;
const TERMINATION_WORDS: [&str; 5] = ["terminat", "cancel", "contract", "early exit", "leave"];

const INSTRUCTIONS: &str = "Explain the customer's bill using only the facts below. \
Point out what changed since the previous period and why, mention relevant policies, \
and finish with one or two practical next steps.";

pub struct BillingHandler {
    accounts: Arc<dyn AccountLookup>,
    knowledge: Arc<dyn KnowledgeSearch>,
    model: Option<Arc<dyn LlmClient>>,
    passage_limit: usize,
}

impl BillingHandler {
    pub fn new(
        accounts: Arc<dyn AccountLookup>,
        knowledge: Arc<dyn KnowledgeSearch>,
        passage_limit: usize,
    ) -> Self {
        Self { accounts, knowledge, model: None, passage_limit }
    }

    pub fn with_model(mut self, model: Arc<dyn LlmClient>) -> Self {
        self.model = Some(model);
        self
    }
}

#[async_trait]
impl Handler for BillingHandler {
    fn name(&self) -> &'static str {
        "billing"
    }

    async fn handle(&self, query: &Query, context: &HandlerContext<'_>) -> AgentResult {
        let Some(customer_id) = &query.customer_id else {
            return AgentResult::success(
                "I couldn't find your account details for this conversation. Please sign in with your customer ID so I can look at your bill.",
            );
        };

        let snapshot = match self.accounts.snapshot(customer_id, USAGE_PERIODS).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                return AgentResult::success(format!(
                    "I couldn't find an account for customer ID {customer_id}. Please check the ID or contact support so we can look into your bill."
                ));
            }
            Err(error) => return AgentResult::failure(format!("account lookup failed: {error}")),
        };

        let policies = match self
            .knowledge
            .search(&format!("billing policy {}", query.text), self.passage_limit)
            .await
        {
            Ok(passages) => passages,
            Err(error) => return AgentResult::failure(format!("policy search failed: {error}")),
        };
        debug!(
            event_name = "handler.billing.facts_loaded",
            correlation_id = %query.id,
            usage_periods = snapshot.usage.len(),
            policy_passages = policies.len(),
            "billing facts loaded"
        );

        let mut facts = describe_bill(&snapshot, asks_about_termination(&query.text));
        if let Some(policy) = policies.first() {
            let _ = write!(facts, "\n\nRelevant policy:\n{}", render_passages(std::slice::from_ref(policy)));
        }

        let prompt = prompt_with_context(INSTRUCTIONS, &facts, context, &query.text);
        AgentResult::success(
            phrase_with_model(self.model.as_ref(), self.name(), prompt, facts).await,
        )
    }
}

fn asks_about_termination(text: &str) -> bool {
    let lowered = text.to_lowercase();
    TERMINATION_WORDS.iter().any(|word| lowered.contains(word))
}

/// Plain-language bill summary built only from account records.
pub fn describe_bill(snapshot: &AccountSnapshot, include_termination: bool) -> String {
    let mut lines = vec![format!("Hi {}, here is a summary of your latest bill.", snapshot.account.name)];

    if let Some(plan) = &snapshot.plan {
        let data = plan
            .data_limit_gb
            .map(|limit| format!("{} GB data", limit.normalize()))
            .unwrap_or_else(|| "unlimited data".to_string());
        lines.push(format!("Plan: {} ({} per month, {data}).", plan.name, plan.monthly_cost));
    }

    let Some(latest) = snapshot.latest_usage() else {
        lines.push("I couldn't find any billing history on your account yet.".to_string());
        return lines.join("\n");
    };

    lines.push(format!(
        "Billing period {} to {}: total {}, including {} in additional charges.",
        latest.billing_period_start,
        latest.billing_period_end,
        latest.total_bill_amount,
        latest.additional_charges
    ));

    match snapshot.plan.as_ref().and_then(|plan| plan.data_limit_gb) {
        Some(limit) if latest.data_used_gb > limit => lines.push(format!(
            "You used {} GB of data, {} GB more than your plan's {} GB allowance, which is the usual reason for extra charges.",
            latest.data_used_gb.normalize(),
            (latest.data_used_gb - limit).normalize(),
            limit.normalize()
        )),
        Some(limit) => lines.push(format!(
            "You used {} GB of your {} GB data allowance.",
            latest.data_used_gb.normalize(),
            limit.normalize()
        )),
        None => lines.push(format!("You used {} GB of data.", latest.data_used_gb.normalize())),
    }

    if let Some(previous) = snapshot.usage.get(1) {
        lines.push(describe_change(latest, previous));
    }

    if include_termination {
        match &snapshot.contract {
            Some(contract) => lines.push(format!(
                "Your {}-month contract carries an early termination fee of {}.",
                contract.term_months, contract.early_termination_fee
            )),
            None => lines.push(
                "Your plan has no fixed-term contract, so there is no early termination fee."
                    .to_string(),
            ),
        }
    }

    lines.join("\n")
}

fn describe_change(latest: &UsageRecord, previous: &UsageRecord) -> String {
    let change = latest.total_bill_amount - previous.total_bill_amount;
    let since = &previous.billing_period_start;
    if change > Decimal::ZERO {
        format!("Compared with the period starting {since}, your bill went up by {change}.")
    } else if change < Decimal::ZERO {
        format!("Compared with the period starting {since}, your bill went down by {}.", change.abs())
    } else {
        format!("Your bill is the same as in the period starting {since}.")
    }
}
