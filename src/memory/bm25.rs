//! BM25 lexical scoring, blended with cosine similarity in hybrid search
//! (§4.2, `HYBRID_SEARCH_ALPHA`).

use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

/// A small in-memory BM25 index over a candidate set fetched from the
/// vector store. Not a durable full-text index: rebuilt per query from the
/// candidates already returned by the vector search (§4.2 hybrid search
/// narrows by vector similarity first, then re-ranks lexically).
pub struct Bm25Index {
    doc_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f32,
    term_doc_count: HashMap<String, u32>,
}

impl Bm25Index {
    #[must_use]
    pub fn build(documents: &[String]) -> Self {
        let mut doc_freqs = Vec::with_capacity(documents.len());
        let mut doc_lens = Vec::with_capacity(documents.len());
        let mut term_doc_count: HashMap<String, u32> = HashMap::new();

        for doc in documents {
            let tokens = tokenize(doc);
            doc_lens.push(tokens.len());
            let mut freqs = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *term_doc_count.entry(term.clone()).or_insert(0) += 1;
            }
            doc_freqs.push(freqs);
        }

        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f32 / doc_lens.len() as f32
        };

        Self {
            doc_freqs,
            doc_lens,
            avg_doc_len,
            term_doc_count,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let n = self.doc_freqs.len() as f32;
        let df = *self.term_doc_count.get(term).unwrap_or(&0) as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// Raw BM25 score of document `idx` against `query`.
    #[must_use]
    pub fn score(&self, idx: usize, query: &str) -> f32 {
        let Some(freqs) = self.doc_freqs.get(idx) else {
            return 0.0;
        };
        let doc_len = self.doc_lens[idx] as f32;
        let mut score = 0.0;
        for term in tokenize(query) {
            let Some(&f) = freqs.get(&term) else {
                continue;
            };
            let f = f as f32;
            let idf = self.idf(&term);
            let denom = f + K1 * (1.0 - B + B * doc_len / self.avg_doc_len.max(1.0));
            score += idf * (f * (K1 + 1.0)) / denom.max(1e-6);
        }
        score
    }

    /// Scores for every document, normalized to `[0, 1]` by the maximum
    /// observed score (0 if all scores are 0), for blending with cosine
    /// similarity in hybrid search.
    #[must_use]
    pub fn normalized_scores(&self, query: &str) -> Vec<f32> {
        let raw: Vec<f32> = (0..self.doc_freqs.len())
            .map(|i| self.score(i, query))
            .collect();
        let max = raw.iter().cloned().fold(0.0_f32, f32::max);
        if max <= 0.0 {
            return vec![0.0; raw.len()];
        }
        raw.into_iter().map(|s| s / max).collect()
    }
}

/// Blend a cosine similarity and a normalized BM25 score per
/// `HYBRID_SEARCH_ALPHA * cosine + (1 - HYBRID_SEARCH_ALPHA) * bm25`.
#[must_use]
pub fn hybrid_score(cosine: f32, bm25_normalized: f32, alpha: f32) -> f32 {
    alpha * cosine + (1.0 - alpha) * bm25_normalized
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn exact_term_match_scores_higher_than_no_match() {
        let docs = vec![
            "the wine region of bordeaux".to_string(),
            "a completely unrelated topic".to_string(),
        ];
        let index = Bm25Index::build(&docs);
        let scores = index.normalized_scores("bordeaux wine");
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn empty_corpus_scores_zero() {
        let index = Bm25Index::build(&[]);
        assert!(index.normalized_scores("anything").is_empty());
    }

    #[test]
    fn hybrid_score_respects_alpha_weighting() {
        let s = hybrid_score(1.0, 0.0, 0.6);
        assert!((s - 0.6).abs() < 1e-6);
    }
}
