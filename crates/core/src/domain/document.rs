use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub id: i64,
    pub content: String,
    pub embedding: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentMatch {
    pub id: i64,
    pub content: String,
    pub similarity: f32,
}

/// Cosine similarity of two vectors. Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut left_norm = 0.0_f32;
    let mut right_norm = 0.0_f32;
    for (a, b) in left.iter().zip(right) {
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

/// Ranks documents against a query vector, keeping those strictly above
/// `threshold`, best first, at most `limit` of them.
pub fn rank_documents<'a, I>(
    documents: I,
    query: &[f32],
    threshold: f32,
    limit: usize,
) -> Vec<DocumentMatch>
where
    I: IntoIterator<Item = &'a CatalogDocument>,
{
    let mut matches = documents
        .into_iter()
        .map(|document| DocumentMatch {
            id: document.id,
            content: document.content.clone(),
            similarity: cosine_similarity(&document.embedding, query),
        })
        .filter(|candidate| candidate.similarity > threshold)
        .collect::<Vec<_>>();

    matches.sort_by(|a, b| {
        b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal)
    });
    matches.truncate(limit);
    matches
}
