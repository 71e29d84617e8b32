use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use telassist_core::domain::support::{KnowledgePassage, ServicePlan};
use telassist_core::lookup::{AccountLookup, KnowledgeSearch};
use telassist_core::{AgentResult, Query};
use tracing::{debug, warn};

use super::{phrase_with_model, prompt_with_context, render_passages, Handler, HandlerContext};
use crate::llm::LlmClient;

const DAYS_PER_MONTH: i64 = 30;
const WEEKS_PER_MONTH: i64 = 4;
/// Upper bound on hours per day or per week taken from customer text.
const MAX_PERIOD_HOURS: i64 = 168;

const INSTRUCTIONS: &str = "Recommend a service plan using only the catalogue and the usage \
estimate below. Use the plan documentation for benefits and terms. Explain the \
recommendation briefly and mention the monthly cost.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activity {
    Streaming,
    Browsing,
    VideoCall,
}

impl Activity {
    /// Approximate data use per hour, in GB.
    pub fn gb_per_hour(&self) -> Decimal {
        match self {
            Self::Streaming => Decimal::new(3, 0),
            Self::Browsing => Decimal::new(1, 1),
            Self::VideoCall => Decimal::ONE,
        }
    }

    fn default_daily_hours(&self) -> Decimal {
        match self {
            Self::Streaming => Decimal::new(2, 0),
            Self::Browsing => Decimal::new(3, 0),
            Self::VideoCall => Decimal::ONE,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Browsing => "browsing",
            Self::VideoCall => "video calls",
        }
    }

    fn detect(clause: &str) -> Option<Self> {
        if ["video call", "zoom", "facetime", "whatsapp call"].iter().any(|word| clause.contains(word))
        {
            Some(Self::VideoCall)
        } else if ["stream", "netflix", "youtube", "watch"].iter().any(|word| clause.contains(word))
        {
            Some(Self::Streaming)
        } else if ["brows", "social media", "instagram", "web"].iter().any(|word| clause.contains(word))
        {
            Some(Self::Browsing)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageEstimate {
    pub monthly_gb: Decimal,
    pub activities: Vec<(Activity, Decimal)>,
}

pub struct ServiceHandler {
    accounts: Arc<dyn AccountLookup>,
    knowledge: Arc<dyn KnowledgeSearch>,
    model: Option<Arc<dyn LlmClient>>,
    passage_limit: usize,
}

impl ServiceHandler {
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

    async fn current_plan(&self, query: &Query) -> Result<Option<ServicePlan>, String> {
        let Some(customer_id) = &query.customer_id else {
            return Ok(None);
        };
        let account = self
            .accounts
            .find_account(customer_id)
            .await
            .map_err(|error| format!("account lookup failed: {error}"))?;
        match account.and_then(|account| account.service_plan_id) {
            Some(plan_id) => self
                .accounts
                .find_plan(&plan_id)
                .await
                .map_err(|error| format!("plan lookup failed: {error}")),
            None => Ok(None),
        }
    }

    /// Plan documentation is supplementary; a failed search leaves it out.
    async fn plan_documentation(&self, query: &Query) -> Vec<KnowledgePassage> {
        match self
            .knowledge
            .search(&format!("service plan {}", query.text), self.passage_limit)
            .await
        {
            Ok(passages) => passages,
            Err(error) => {
                warn!(
                    event_name = "handler.service.docs_unavailable",
                    correlation_id = %query.id,
                    error = %error,
                    "plan documentation search failed"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Handler for ServiceHandler {
    fn name(&self) -> &'static str {
        "service"
    }

    async fn handle(&self, query: &Query, context: &HandlerContext<'_>) -> AgentResult {
        let current = match self.current_plan(query).await {
            Ok(current) => current,
            Err(reason) => return AgentResult::failure(reason),
        };
        let catalog = match self.accounts.list_plans().await {
            Ok(plans) => plans,
            Err(error) => return AgentResult::failure(format!("plan catalogue lookup failed: {error}")),
        };
        if catalog.is_empty() {
            return AgentResult::failure("plan catalogue is empty");
        }

        let estimate = estimate_monthly_usage(&query.text);
        let recommended = recommend(&catalog, estimate.as_ref(), &query.text);
        debug!(
            event_name = "handler.service.recommended",
            correlation_id = %query.id,
            estimate_gb = %estimate.as_ref().map(|e| e.monthly_gb).unwrap_or_default(),
            plan_id = recommended.map(|plan| plan.plan_id.as_str()).unwrap_or("none"),
            "service recommendation computed"
        );

        let mut lines = Vec::new();
        if let Some(estimate) = &estimate {
            let breakdown = estimate
                .activities
                .iter()
                .map(|(activity, gb)| format!("{} about {} GB", activity.label(), gb))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "Based on what you described, you'd use about {} GB of data a month ({breakdown}).",
                estimate.monthly_gb
            ));
        }

        match (recommended, current.as_ref()) {
            (Some(plan), Some(current)) if plan.plan_id == current.plan_id => lines.push(format!(
                "Your current {} already fits your needs at {} per month.",
                current.name, current.monthly_cost
            )),
            (Some(plan), current) => {
                lines.push(format!("I recommend the {}: {}.", plan.name, describe_plan(plan)));
                if let Some(current) = current {
                    lines.push(format!(
                        "You're currently on the {} at {} per month.",
                        current.name, current.monthly_cost
                    ));
                }
            }
            (None, _) => lines.push(
                "Tell me how you use your phone (for example, 2 hours of streaming daily) and I'll recommend a plan."
                    .to_string(),
            ),
        }

        lines.push(format!(
            "Our plans:\n{}",
            catalog
                .iter()
                .map(|plan| format!("- {}: {}", plan.name, describe_plan(plan)))
                .collect::<Vec<_>>()
                .join("\n")
        ));

        let mut facts = lines.join("\n\n");
        if let Some(passage) = self.plan_documentation(query).await.first() {
            let _ = write!(
                facts,
                "\n\nPlan documentation:\n{}",
                render_passages(std::slice::from_ref(passage))
            );
        }
        let prompt = prompt_with_context(INSTRUCTIONS, &facts, context, &query.text);
        AgentResult::success(
            phrase_with_model(self.model.as_ref(), self.name(), prompt, facts).await,
        )
    }
}

fn describe_plan(plan: &ServicePlan) -> String {
    let data = plan
        .data_limit_gb
        .map(|limit| format!("{} GB data", limit.normalize()))
        .unwrap_or_else(|| "unlimited data".to_string());
    let mut parts = vec![format!("{} per month", plan.monthly_cost), data];
    if let Some(minutes) = plan.voice_minutes {
        parts.push(format!("{minutes} minutes"));
    }
    if let Some(sms) = plan.sms_count {
        parts.push(format!("{sms} SMS"));
    }
    parts.join(", ")
}

/// Monthly data estimate from a free-form activity description, or `None`
/// when no known activity is mentioned.
pub fn estimate_monthly_usage(text: &str) -> Option<UsageEstimate> {
    let lowered = text.to_lowercase();
    let mut activities: Vec<(Activity, Decimal)> = Vec::new();

    let clauses = lowered
        .split([',', ';', '!', '?'])
        .flat_map(|part| part.split(". "))
        .flat_map(|part| part.split(" and "));
    for clause in clauses {
        let Some(activity) = Activity::detect(clause) else {
            continue;
        };
        if activities.iter().any(|(seen, _)| *seen == activity) {
            continue;
        }

        let hours = hours_in(clause).unwrap_or_else(|| activity.default_daily_hours());
        let multiplier = if ["weekly", "a week", "per week", "each week"]
            .iter()
            .any(|word| clause.contains(word))
        {
            WEEKS_PER_MONTH
        } else {
            DAYS_PER_MONTH
        };
        let Some(gb) = activity
            .gb_per_hour()
            .checked_mul(hours)
            .and_then(|per_period| per_period.checked_mul(Decimal::from(multiplier)))
        else {
            continue;
        };
        activities.push((activity, gb.round_dp(1).normalize()));
    }

    if activities.is_empty() {
        return None;
    }
    let monthly_gb = activities
        .iter()
        .try_fold(Decimal::ZERO, |total, (_, gb)| total.checked_add(*gb))?
        .normalize();
    Some(UsageEstimate { monthly_gb, activities })
}

fn hours_in(clause: &str) -> Option<Decimal> {
    let words: Vec<&str> = clause.split_whitespace().collect();
    words.windows(2).find_map(|pair| {
        let unit = pair[1].trim_matches(|ch: char| !ch.is_alphanumeric());
        let per_hour = match unit {
            "hour" | "hours" | "hr" | "hrs" | "h" => Decimal::ONE,
            "minute" | "minutes" | "min" | "mins" => Decimal::new(60, 0),
            _ => return None,
        };
        pair[0]
            .parse::<Decimal>()
            .ok()
            .filter(|amount| *amount > Decimal::ZERO)
            .map(|amount| (amount / per_hour).min(Decimal::from(MAX_PERIOD_HOURS)))
    })
}

/// Cheapest plan covering the estimate, else the largest plan. Without an
/// estimate, explicit "family" or "cheapest" requests still pick a plan.
pub fn recommend<'a>(
    catalog: &'a [ServicePlan],
    estimate: Option<&UsageEstimate>,
    text: &str,
) -> Option<&'a ServicePlan> {
    let by_cost = |a: &&ServicePlan, b: &&ServicePlan| a.monthly_cost.cmp(&b.monthly_cost);

    if let Some(estimate) = estimate {
        let covering = catalog
            .iter()
            .filter(|plan| plan.data_limit_gb.map_or(true, |limit| limit >= estimate.monthly_gb))
            .min_by(by_cost);
        return covering.or_else(|| {
            catalog.iter().max_by(|a, b| match (a.data_limit_gb, b.data_limit_gb) {
                (None, None) => by_cost(b, a),
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(left), Some(right)) => left.cmp(&right),
            })
        });
    }

    let lowered = text.to_lowercase();
    if lowered.contains("family") {
        if let Some(plan) =
            catalog.iter().find(|plan| plan.name.to_lowercase().contains("family"))
        {
            return Some(plan);
        }
    }
    if lowered.contains("cheapest") || lowered.contains("cheap") {
        return catalog.iter().min_by(by_cost);
    }
    None
}
