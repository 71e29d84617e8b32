use std::collections::BTreeSet;
use std::sync::Arc;

use telassist_core::Category;
use tracing::{debug, warn};

use crate::llm::LlmClient;

const SMALL_TALK: [&str; 4] = ["joke", "funny", "make me laugh", "tell me something fun"];

const BILLING_KEYWORDS: &[&str] =
    &["bill", "billing", "charge", "payment", "invoice", "due", "refund", "fee"];
const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "signal",
    "internet",
    "outage",
    "connect",
    "disconnect",
    "slow",
    "no service",
    "coverage drop",
    "dropped call",
    "call drop",
];
const SERVICE_KEYWORDS: &[&str] =
    &["plan", "upgrade", "recommend", "switch", "family", "cheapest"];
const KNOWLEDGE_KEYWORDS: &[&str] = &[
    "how to",
    "how do i",
    "how can i",
    "compatib",
    "setup",
    "set up",
    "guide",
    "what is",
    "what are",
    "settings",
    "activate",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassificationMethod {
    EmptyInput,
    SmallTalk,
    Keyword,
    Model,
    Default,
    /// The query exceeded the length limit and was not examined.
    Oversized,
}

impl ClassificationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::SmallTalk => "small_talk",
            Self::Keyword => "keyword",
            Self::Model => "model",
            Self::Default => "default",
            Self::Oversized => "oversized",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    pub method: ClassificationMethod,
    /// Every category with at least one keyword hit, so multi-intent queries
    /// stay visible in logs even though only one category wins.
    pub matched: BTreeSet<Category>,
}

impl Classification {
    pub(crate) fn new(category: Category, method: ClassificationMethod) -> Self {
        Self { category, method, matched: BTreeSet::new() }
    }

    pub fn is_multi_intent(&self) -> bool {
        self.matched.len() > 1
    }
}

/// Keyword rules first, then an optional model call, FALLBACK otherwise.
#[derive(Clone, Default)]
pub struct Classifier {
    model: Option<Arc<dyn LlmClient>>,
}

impl Classifier {
    pub fn keyword_only() -> Self {
        Self { model: None }
    }

    pub fn with_model(model: Arc<dyn LlmClient>) -> Self {
        Self { model: Some(model) }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Total over all inputs. Blank text never reaches the model.
    pub async fn classify(&self, text: &str) -> Classification {
        let by_rules = classify_by_rules(text);
        if by_rules.method != ClassificationMethod::Default {
            return by_rules;
        }

        let Some(model) = &self.model else {
            return by_rules;
        };

        match model.complete(&classification_prompt(text)).await {
            Ok(label) => {
                let category = Category::from_label(&label);
                debug!(
                    event_name = "classifier.model.labelled",
                    label = %label.trim(),
                    category = category.as_str(),
                    "model classified query"
                );
                Classification::new(category, ClassificationMethod::Model)
            }
            Err(error) => {
                warn!(
                    event_name = "classifier.model.failed",
                    error = %error,
                    "model classification failed, using fallback category"
                );
                by_rules
            }
        }
    }
}

/// The deterministic half of classification. Returns method `Default` when
/// no rule fired.
pub fn classify_by_rules(text: &str) -> Classification {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return Classification::new(Category::Fallback, ClassificationMethod::EmptyInput);
    }

    if is_small_talk(&normalized) {
        return Classification::new(Category::Fallback, ClassificationMethod::SmallTalk);
    }

    let mut best: Option<(Category, usize)> = None;
    let mut matched = BTreeSet::new();
    for category in [Category::Billing, Category::Network, Category::Service, Category::Knowledge]
    {
        let hits = keywords_for(category)
            .iter()
            .filter(|keyword| contains_at_word_start(&normalized, keyword))
            .count();
        if hits == 0 {
            continue;
        }
        matched.insert(category);
        // Strictly greater keeps the earlier, higher-priority category on ties.
        if best.map_or(true, |(_, best_hits)| hits > best_hits) {
            best = Some((category, hits));
        }
    }

    match best {
        Some((category, _)) => {
            Classification { category, method: ClassificationMethod::Keyword, matched }
        }
        None => Classification::new(Category::Fallback, ClassificationMethod::Default),
    }
}

/// Requests for jokes or banter rather than support.
pub fn is_small_talk(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SMALL_TALK.iter().any(|phrase| lowered.contains(phrase))
}

fn keywords_for(category: Category) -> &'static [&'static str] {
    match category {
        Category::Billing => BILLING_KEYWORDS,
        Category::Network => NETWORK_KEYWORDS,
        Category::Service => SERVICE_KEYWORDS,
        Category::Knowledge => KNOWLEDGE_KEYWORDS,
        Category::Fallback => &[],
    }
}

fn contains_at_word_start(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(index, _)| {
        haystack[..index].chars().next_back().map_or(true, |previous| !previous.is_alphanumeric())
    })
}

fn classification_prompt(text: &str) -> String {
    format!(
        "Classify the following telecom support query into exactly one category.\n\
         BILLING: bills, charges, payments, account balance.\n\
         NETWORK: signal, internet issues, outages, device connectivity.\n\
         SERVICE: plan recommendations, upgrades, new services.\n\
         KNOWLEDGE: how-to guides, technical or coverage and compatibility questions.\n\
         OTHER: anything else.\n\
         Reply with the category name only.\n\n\
         Query: {text}\n\
         Category:"
    )
}
