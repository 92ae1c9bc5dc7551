//! Inverted index over ingested document text with TF-IDF ranking.
//!
//! A [`TfIdfIndex`] is immutable once built. [`DocumentIndex`] holds the
//! current index behind an `Arc` and replaces it wholesale on rebuild or
//! merge, so a search always sees either the old or the new postings and
//! never a half-applied update.
//!
//! Scoring:
//!
//! ```text
//! idf(t)      = ln((1 + N) / (1 + df(t))) + 1
//! score(d, q) = Σ_{t ∈ q} tf(t, d) × idf(t)
//! ```
//!
//! Documents sharing no term with the query are excluded. Equal scores are
//! ordered by ingestion time (newest first), then by document id.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::models::{DocumentFormat, DocumentHit, DocumentRecord};
use crate::text::{is_stopword, singular, words};

/// Characters of context returned around the first matched term.
pub const SNIPPET_WINDOW: usize = 80;

/// Words that route a query to the document corpus but say nothing about
/// which documents are wanted.
const ROUTING_WORDS: &[&str] = &[
    "document", "documents", "file", "files", "mention", "mentions", "mentioning", "containing",
    "contains", "contain", "find", "show", "search", "list", "about", "pdf", "docx", "txt",
];

/// Index terms of a piece of text: lowercase singular words, stopwords
/// dropped.
pub fn index_terms(text: &str) -> Vec<String> {
    words(text)
        .into_iter()
        .filter(|w| !is_stopword(w))
        .map(|w| singular(&w))
        .collect()
}

/// Search terms of a natural-language query, deduplicated in query order.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    words(text)
        .into_iter()
        .filter(|w| w.chars().count() > 1 && !is_stopword(w) && !ROUTING_WORDS.contains(&w.as_str()))
        .map(|w| singular(&w))
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    filename: String,
    format: DocumentFormat,
    text: String,
    ingested_at: DateTime<Utc>,
    terms: Vec<String>,
}

/// A document id and its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document_id: String,
    pub score: f64,
}

/// Immutable postings plus the metadata needed to build hits.
#[derive(Debug, Clone, Default)]
pub struct TfIdfIndex {
    /// term → document id → term frequency
    postings: HashMap<String, HashMap<String, u32>>,
    documents: HashMap<String, IndexedDocument>,
}

impl TfIdfIndex {
    pub fn build(docs: &[DocumentRecord]) -> Self {
        let mut index = Self::default();
        for doc in docs {
            index.insert(doc);
        }
        index
    }

    /// A copy of this index with `docs` added. A document whose id is
    /// already indexed replaces the earlier version.
    pub fn with_documents(&self, docs: &[DocumentRecord]) -> Self {
        let mut next = self.clone();
        for doc in docs {
            next.insert(doc);
        }
        next
    }

    fn insert(&mut self, doc: &DocumentRecord) {
        self.remove(&doc.id);
        let terms = index_terms(&doc.text);
        for term in &terms {
            *self
                .postings
                .entry(term.clone())
                .or_default()
                .entry(doc.id.clone())
                .or_insert(0) += 1;
        }
        self.documents.insert(
            doc.id.clone(),
            IndexedDocument {
                filename: doc.filename.clone(),
                format: doc.format,
                text: doc.text.clone(),
                ingested_at: doc.ingested_at,
                terms,
            },
        );
    }

    fn remove(&mut self, id: &str) {
        let Some(old) = self.documents.remove(id) else {
            return;
        };
        for term in old.terms {
            if let Some(posting) = self.postings.get_mut(&term) {
                posting.remove(id);
                if posting.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of documents containing `term`.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, HashMap::len)
    }

    pub fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self.document_frequency(term) as f64;
        ((1.0 + n) / (1.0 + df)).ln() + 1.0
    }

    /// Rank documents for `terms`, best first, at most `top_k` of them.
    pub fn search(&self, terms: &[String], top_k: usize) -> Vec<ScoredDocument> {
        let unique: BTreeSet<&String> = terms.iter().collect();
        let mut scores: HashMap<&str, f64> = HashMap::new();
        for term in unique {
            let Some(posting) = self.postings.get(term.as_str()) else {
                continue;
            };
            let idf = self.idf(term);
            for (doc_id, tf) in posting {
                *scores.entry(doc_id.as_str()).or_insert(0.0) += f64::from(*tf) * idf;
            }
        }

        let mut ranked: Vec<(&str, f64)> = scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    let ta = self.documents.get(a.0).map(|d| d.ingested_at);
                    let tb = self.documents.get(b.0).map(|d| d.ingested_at);
                    tb.cmp(&ta)
                })
                .then_with(|| a.0.cmp(b.0))
        });
        ranked.truncate(top_k);
        ranked
            .into_iter()
            .map(|(id, score)| ScoredDocument {
                document_id: id.to_string(),
                score,
            })
            .collect()
    }

    /// [`Self::search`] plus filename, format and a snippet per document.
    pub fn hits(&self, terms: &[String], top_k: usize) -> Vec<DocumentHit> {
        self.search(terms, top_k)
            .into_iter()
            .filter_map(|scored| {
                let doc = self.documents.get(&scored.document_id)?;
                Some(DocumentHit {
                    snippet: snippet(&doc.text, terms),
                    document_id: scored.document_id,
                    filename: doc.filename.clone(),
                    format: doc.format,
                    score: (scored.score * 10_000.0).round() / 10_000.0,
                    ingested_at: doc.ingested_at,
                })
            })
            .collect()
    }
}

/// About [`SNIPPET_WINDOW`] characters of `text` centred on the first
/// occurrence of any of `terms`, with `...` marking truncation.
pub fn snippet(text: &str, terms: &[String]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let lower: Vec<char> = text.to_lowercase().chars().collect();
    // Lowercasing can change the char count; fall back to the start then.
    let found = if lower.len() == chars.len() {
        terms
            .iter()
            .filter_map(|t| find_chars(&lower, t))
            .min()
    } else {
        None
    };

    let (start, end) = match found {
        Some(at) => (
            at.saturating_sub(SNIPPET_WINDOW / 2),
            (at + SNIPPET_WINDOW / 2).min(chars.len()),
        ),
        None => (0, SNIPPET_WINDOW.min(chars.len())),
    };
    let body: String = chars[start..end].iter().collect();
    let body = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let prefix = if start > 0 { "..." } else { "" };
    let suffix = if end < chars.len() { "..." } else { "" };
    format!("{}{}{}", prefix, body, suffix)
}

fn find_chars(haystack: &[char], needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle.as_slice())
}

/// The live index, swapped atomically on every update.
#[derive(Debug, Default)]
pub struct DocumentIndex {
    current: RwLock<Arc<TfIdfIndex>>,
    /// Serializes rebuild and merge so concurrent updates never lose
    /// documents.
    writer: Mutex<()>,
}

impl DocumentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The index as of now. Holding the snapshot does not block updates.
    pub fn snapshot(&self) -> Arc<TfIdfIndex> {
        self.current.read().clone()
    }

    /// Replace the index with one built from `docs`.
    pub fn rebuild(&self, docs: &[DocumentRecord]) {
        let _guard = self.writer.lock();
        let next = Arc::new(TfIdfIndex::build(docs));
        *self.current.write() = next;
    }

    /// Add `docs` to the index.
    pub fn merge(&self, docs: &[DocumentRecord]) {
        let _guard = self.writer.lock();
        let next = Arc::new(self.snapshot().with_documents(docs));
        *self.current.write() = next;
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn doc(id: &str, text: &str, minute: u32) -> DocumentRecord {
        DocumentRecord {
            id: id.into(),
            filename: format!("{id}.txt"),
            format: DocumentFormat::Txt,
            text: text.into(),
            ingested_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
        }
    }

    fn terms(q: &str) -> Vec<String> {
        query_terms(q)
    }

    #[test]
    fn query_terms_drop_stopwords_and_routing_words() {
        assert_eq!(
            terms("find documents mentioning Kubernetes and Docker"),
            vec!["kubernete", "docker"]
        );
        assert_eq!(terms("resumes with python python"), vec!["resume", "python"]);
    }

    #[test]
    fn idf_is_smoothed() {
        let index = TfIdfIndex::build(&[doc("a", "rust", 0), doc("b", "go", 0)]);
        assert!((index.idf("rust") - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-9);
        // Unknown terms stay finite.
        assert!((index.idf("zig") - (3.0f64.ln() + 1.0)).abs() < 1e-9);
        assert!(TfIdfIndex::default().idf("x").is_finite());
    }

    #[test]
    fn scores_sum_tf_times_idf_and_exclude_non_matches() {
        let index = TfIdfIndex::build(&[
            doc("a", "kubernetes kubernetes docker", 0),
            doc("b", "kubernetes", 0),
            doc("c", "accounting", 0),
        ]);
        let results = index.search(&terms("kubernetes docker"), 10);
        let ids: Vec<&str> = results.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let expected_a = 2.0 * index.idf("kubernete") + index.idf("docker");
        assert!((results[0].score - expected_a).abs() < 1e-9);
    }

    #[test]
    fn ties_break_by_recency_then_id() {
        let index = TfIdfIndex::build(&[
            doc("b", "python", 1),
            doc("a", "python", 1),
            doc("c", "python", 5),
        ]);
        let ids: Vec<String> = index
            .search(&terms("python"), 10)
            .into_iter()
            .map(|r| r.document_id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn search_is_order_stable_and_bounded() {
        let docs: Vec<DocumentRecord> = (0..20)
            .map(|i| doc(&format!("d{i:02}"), "rust tokio", i % 3))
            .collect();
        let index = TfIdfIndex::build(&docs);
        let first = index.search(&terms("rust"), 7);
        assert_eq!(first.len(), 7);
        for _ in 0..5 {
            assert_eq!(index.search(&terms("rust"), 7), first);
        }
    }

    #[test]
    fn merge_replaces_documents_with_the_same_id() {
        let live = DocumentIndex::new();
        live.rebuild(&[doc("a", "java", 0)]);
        let before = live.snapshot();
        live.merge(&[doc("a", "python", 0), doc("b", "python", 0)]);

        assert_eq!(before.search(&terms("java"), 10).len(), 1);
        let now = live.snapshot();
        assert!(now.search(&terms("java"), 10).is_empty());
        assert_eq!(now.search(&terms("python"), 10).len(), 2);
        assert_eq!(live.len(), 2);
    }

    #[test]
    fn snippets_center_on_first_match() {
        let text = format!("{} kubernetes cluster {}", "x".repeat(100), "y".repeat(100));
        let s = snippet(&text, &terms("kubernetes"));
        assert!(s.starts_with("..."), "{s}");
        assert!(s.ends_with("..."), "{s}");
        assert!(s.contains("kubernetes"), "{s}");

        assert_eq!(snippet("short text", &terms("missing")), "short text");
        let hits = TfIdfIndex::build(&[doc("a", "Knows Docker well", 0)]).hits(&terms("docker"), 5);
        assert_eq!(hits[0].snippet, "Knows Docker well");
        assert_eq!(hits[0].filename, "a.txt");
    }
}
