use std::sync::Arc;

use async_trait::async_trait;
use telassist_core::domain::support::NetworkIncident;
use telassist_core::lookup::{KnowledgeSearch, NetworkStatusLookup};
use telassist_core::{AgentResult, Query};
use tracing::debug;

use super::{phrase_with_model, prompt_with_context, render_passages, Handler, HandlerContext};
use crate::llm::LlmClient;

const LOCATION_PREPOSITIONS: [&str; 3] = ["in", "at", "near"];
const LOCATION_STOPWORDS: [&str; 14] = [
    "since", "for", "when", "while", "today", "yesterday", "and", "but", "because", "with",
    "on", "after", "every", "all",
];
const NOT_A_PLACE: [&str; 8] = ["home", "work", "night", "the", "my", "office", "times", "all"];

const DEVICES: [(&str, &str); 9] = [
    ("iphone", "iPhone"),
    ("galaxy", "Samsung Galaxy"),
    ("samsung", "Samsung"),
    ("pixel", "Google Pixel"),
    ("oneplus", "OnePlus"),
    ("xiaomi", "Xiaomi"),
    ("redmi", "Redmi"),
    ("motorola", "Motorola"),
    ("nokia", "Nokia"),
];

const QUICK_CHECKS: &str = "Quick checks (do these first):\n\
1. Toggle Airplane Mode on, wait five seconds, then turn it off.\n\
2. Restart your phone.\n\
3. Open your SIM settings and make sure the SIM is enabled.\n\
4. Check the signal bars and try moving near a window or outdoors briefly.\n\
5. If you see No Service or Emergency Calls Only, try the SIM in another phone.\n\
6. Check call barring and Do Not Disturb settings, and that your account is active.";

const INSTRUCTIONS: &str = "Help the customer with a connectivity problem. Start with any \
reported incident for their area, then give device-specific steps from the documentation, \
simplest first.";

pub struct NetworkHandler {
    network: Arc<dyn NetworkStatusLookup>,
    knowledge: Arc<dyn KnowledgeSearch>,
    model: Option<Arc<dyn LlmClient>>,
    passage_limit: usize,
}

impl NetworkHandler {
    pub fn new(
        network: Arc<dyn NetworkStatusLookup>,
        knowledge: Arc<dyn KnowledgeSearch>,
        passage_limit: usize,
    ) -> Self {
        Self { network, knowledge, model: None, passage_limit }
    }

    pub fn with_model(mut self, model: Arc<dyn LlmClient>) -> Self {
        self.model = Some(model);
        self
    }

    /// Location named in the text, preferring areas the incident table knows.
    async fn locate(&self, text: &str) -> Result<Option<String>, String> {
        let lowered = text.to_lowercase();
        let areas = self
            .network
            .known_areas()
            .await
            .map_err(|error| format!("network status lookup failed: {error}"))?;
        let known = areas
            .into_iter()
            .filter(|area| !area.trim().is_empty() && lowered.contains(&area.to_lowercase()))
            .max_by_key(|area| area.chars().count());

        Ok(known.or_else(|| extract_location(text)))
    }
}

#[async_trait]
impl Handler for NetworkHandler {
    fn name(&self) -> &'static str {
        "network"
    }

    async fn handle(&self, query: &Query, context: &HandlerContext<'_>) -> AgentResult {
        let location = match self.locate(&query.text).await {
            Ok(location) => location,
            Err(reason) => return AgentResult::failure(reason),
        };
        let device = extract_device(&query.text);

        let incidents = match &location {
            Some(area) => match self.network.incidents_for_area(area).await {
                Ok(incidents) => incidents,
                Err(error) => {
                    return AgentResult::failure(format!("network status lookup failed: {error}"))
                }
            },
            None => Vec::new(),
        };

        let search_text = match &device {
            Some(device) => format!("{device} {}", query.text),
            None => query.text.clone(),
        };
        let passages = match self.knowledge.search(&search_text, self.passage_limit).await {
            Ok(passages) => passages,
            Err(error) => {
                return AgentResult::failure(format!("troubleshooting search failed: {error}"))
            }
        };

        let outages: Vec<&NetworkIncident> =
            incidents.iter().filter(|incident| is_disruption(incident)).collect();
        debug!(
            event_name = "handler.network.facts_loaded",
            correlation_id = %query.id,
            location = location.as_deref().unwrap_or("unknown"),
            device = device.as_deref().unwrap_or("unknown"),
            incidents = incidents.len(),
            outages = outages.len(),
            passages = passages.len(),
            "network facts loaded"
        );

        let mut sections = Vec::new();
        match &location {
            Some(area) if incidents.is_empty() => {
                sections.push(format!("I found no reported network incidents in {area}."))
            }
            Some(_) => sections.extend(incidents.iter().map(describe_incident)),
            None => sections.push(
                "I couldn't tell which area you're in, so I haven't checked for local outages yet."
                    .to_string(),
            ),
        }

        for outage in &outages {
            sections.push(format!(
                "Our engineers are working on the {} in {}. Service should recover once the work completes, so you don't need to change any settings for this.",
                outage.status.to_lowercase(),
                outage.area
            ));
        }

        if !passages.is_empty() {
            sections.push(format!("Suggested steps:\n{}", render_passages(&passages)));
        }

        if outages.is_empty() && passages.is_empty() {
            sections.push(QUICK_CHECKS.to_string());
        }

        let questions = clarifying_questions(location.is_none(), device.is_none());
        if outages.is_empty() && !questions.is_empty() {
            sections.push(format!(
                "To help further, please tell me:\n{}",
                questions.iter().map(|question| format!("- {question}")).collect::<Vec<_>>().join("\n")
            ));
        }

        let facts = sections.join("\n\n");
        let prompt = prompt_with_context(INSTRUCTIONS, &facts, context, &query.text);
        AgentResult::success(
            phrase_with_model(self.model.as_ref(), self.name(), prompt, facts).await,
        )
    }
}

fn is_disruption(incident: &NetworkIncident) -> bool {
    !incident.status.trim().eq_ignore_ascii_case("operational")
}

fn describe_incident(incident: &NetworkIncident) -> String {
    let details = incident.details.as_deref().map(|details| format!(" {details}.")).unwrap_or_default();
    format!(
        "Network status for {}: {}.{details} (updated {})",
        incident.area, incident.status, incident.updated_at
    )
}

fn clarifying_questions(missing_location: bool, missing_device: bool) -> Vec<&'static str> {
    let mut questions = Vec::new();
    if missing_location {
        questions.push("Your exact location, for example 'Mumbai West' or your neighbourhood.");
    }
    if missing_device {
        questions.push("Your device model, for example iPhone 14 or Samsung Galaxy S22.");
    }
    if missing_location || missing_device {
        questions.push("When the issue started and whether others nearby are affected.");
    }
    questions
}

/// Place named after the last `in`, `at` or `near`, cut at the first word
/// that clearly is not part of a place name.
pub fn extract_location(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words
        .iter()
        .rposition(|word| LOCATION_PREPOSITIONS.contains(&word.to_lowercase().as_str()))?;

    let mut place = Vec::new();
    for word in &words[start + 1..] {
        let trimmed = word.trim_matches(|ch: char| !ch.is_alphanumeric() && ch != '-');
        let lowered = trimmed.to_lowercase();
        if trimmed.is_empty() || LOCATION_STOPWORDS.contains(&lowered.as_str()) {
            break;
        }
        if place.is_empty() && lowered == "my" {
            continue;
        }
        place.push(trimmed);
        if word.ends_with(|ch: char| matches!(ch, '.' | ',' | '!' | '?' | ';')) {
            break;
        }
    }

    let place = place.join(" ");
    let lowered = place.to_lowercase();
    if place.is_empty() || NOT_A_PLACE.contains(&lowered.as_str()) {
        return None;
    }
    Some(place)
}

/// Device brand, plus the model token when one follows it (`iPhone 14`).
pub fn extract_device(text: &str) -> Option<String> {
    let words: Vec<&str> = text
        .split_whitespace()
        .map(|word| word.trim_matches(|ch: char| !ch.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .collect();

    DEVICES.iter().find_map(|(needle, label)| {
        let index = words.iter().position(|word| word.to_lowercase().starts_with(needle))?;
        let model = words
            .get(index + 1)
            .filter(|next| next.chars().any(|ch| ch.is_ascii_digit()))
            .map(|next| format!(" {next}"))
            .unwrap_or_default();
        Some(format!("{label}{model}"))
    })
}
