use std::collections::BTreeSet;

use async_trait::async_trait;

use telassist_core::domain::support::KnowledgePassage;
use telassist_core::lookup::{KnowledgeSearch, LookupError};

use super::{optional_text_column, text_column, RepositoryError};
use crate::DbPool;

const STOPWORDS: &[&str] = &[
    "to", "on", "in", "of", "is", "it", "do", "an", "or", "at", "be", "me", "by", "as", "am",
    "the", "and", "for", "are", "was", "with", "that", "this", "from", "have", "has", "how",
    "what", "why", "can", "you", "your", "my", "our", "its", "not", "but", "too", "any", "all",
    "does", "did", "into", "out", "about", "there", "their", "them", "then", "than", "when",
    "where", "which", "who", "will", "would", "should", "could", "please", "tell", "need",
];

/// Lower-cased content words of `text`, without stopwords or very short tokens.
pub fn terms(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|token| token.chars().count() >= 2 && !STOPWORDS.contains(&token.as_str()))
        .collect()
}

/// Number of distinct query terms found in the passage. Title and topic
/// matches count double.
pub fn score_passage(query_terms: &BTreeSet<String>, passage: &KnowledgePassage) -> u32 {
    let body = terms(&passage.content);
    let mut heading = terms(&passage.document);
    if let Some(topic) = &passage.topic {
        heading.extend(terms(topic));
    }

    query_terms
        .iter()
        .map(|term| {
            let mut score = 0;
            if body.contains(term) {
                score += 1;
            }
            if heading.contains(term) {
                score += 2;
            }
            score
        })
        .sum()
}

/// Scores, filters and orders candidate passages; highest score first, then
/// by document and topic for a stable order.
pub fn rank_passages(
    text: &str,
    candidates: impl IntoIterator<Item = KnowledgePassage>,
    limit: usize,
) -> Vec<KnowledgePassage> {
    let query_terms = terms(text);
    if query_terms.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut ranked: Vec<KnowledgePassage> = candidates
        .into_iter()
        .filter_map(|mut passage| {
            let score = score_passage(&query_terms, &passage);
            (score > 0).then(|| {
                passage.score = score;
                passage
            })
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.document.cmp(&b.document))
            .then_with(|| a.topic.cmp(&b.topic))
    });
    ranked.truncate(limit);
    ranked
}

pub struct SqlKnowledgeRepository {
    pool: DbPool,
}

impl SqlKnowledgeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn fetch_all(&self) -> Result<Vec<KnowledgePassage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT document, topic, content FROM knowledge_passages ORDER BY passage_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(KnowledgePassage {
                    document: text_column(row, "document")?,
                    topic: optional_text_column(row, "topic")?,
                    content: text_column(row, "content")?,
                    score: 0,
                })
            })
            .collect()
    }
}

#[async_trait]
impl KnowledgeSearch for SqlKnowledgeRepository {
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<KnowledgePassage>, LookupError> {
        let candidates = self.fetch_all().await?;
        Ok(rank_passages(text, candidates, limit))
    }
}
