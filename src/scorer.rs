//! ROUGE-1, ROUGE-2 and ROUGE-L F-measures.
//!
//! Tokenization matches the usual ROUGE reference scorer: lowercase, every
//! character outside `[a-z0-9]` becomes a separator, and tokens longer than three
//! characters are stemmed when stemming is on.

use crate::artifact::{Document, SummaryResult};
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub rouge1: f64,
    pub rouge2: f64,
    #[serde(rename = "rougeL")]
    pub rouge_l: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentScore {
    pub id: u64,
    #[serde(flatten)]
    pub score: ScoreEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    pub processed: usize,
    pub skipped_no_candidate: usize,
    pub skipped_no_reference: usize,
    pub scores: ScoreEntry,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_document: Vec<DocumentScore>,
}

/// Which candidates an evaluation run covers.
#[derive(Debug, Clone, Default)]
pub enum EvalFilter {
    #[default]
    All,
    /// First `n` candidates, joined against the first `n` references.
    First(usize),
    Ids(HashSet<u64>),
}

pub struct Scorer {
    stemmer: Option<Stemmer>,
}

impl Scorer {
    pub fn new(use_stemmer: bool) -> Self {
        Self {
            stemmer: use_stemmer.then(|| Stemmer::create(Algorithm::English)),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        lowered
            .split(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
            .filter(|t| !t.is_empty())
            .map(|t| match &self.stemmer {
                Some(stemmer) if t.len() > 3 => stemmer.stem(t).into_owned(),
                _ => t.to_string(),
            })
            .collect()
    }

    pub fn score(&self, reference: &str, candidate: &str) -> ScoreEntry {
        let reference = self.tokenize(reference);
        let candidate = self.tokenize(candidate);
        ScoreEntry {
            rouge1: rouge_n(&reference, &candidate, 1),
            rouge2: rouge_n(&reference, &candidate, 2),
            rouge_l: rouge_l(&reference, &candidate),
        }
    }

    /// Scores `(id, reference, candidate)` triples. Empty candidates and empty
    /// references are counted as skips, never as zero scores. Whitespace-only
    /// text counts as empty on both sides.
    pub fn aggregate<'a, I>(&self, pairs: I) -> AggregateScore
    where
        I: IntoIterator<Item = (u64, Option<&'a str>, &'a str)>,
    {
        let mut agg = AggregateScore::default();
        let mut sums = ScoreEntry::default();

        for (id, reference, candidate) in pairs {
            if candidate.trim().is_empty() {
                agg.skipped_no_candidate += 1;
                continue;
            }
            let Some(reference) = reference.filter(|r| !r.trim().is_empty()) else {
                agg.skipped_no_reference += 1;
                continue;
            };
            let s = self.score(reference, candidate);
            sums.rouge1 += s.rouge1;
            sums.rouge2 += s.rouge2;
            sums.rouge_l += s.rouge_l;
            agg.per_document.push(DocumentScore { id, score: s });
            agg.processed += 1;
        }

        if agg.processed > 0 {
            let n = agg.processed as f64;
            agg.scores = ScoreEntry {
                rouge1: sums.rouge1 / n,
                rouge2: sums.rouge2 / n,
                rouge_l: sums.rouge_l / n,
            };
        }
        agg
    }

    /// Joins candidates with references by `id` and aggregates. Candidates that
    /// carry an error marker count as missing.
    pub fn evaluate(
        &self,
        references: &[Document],
        candidates: &[SummaryResult],
        filter: &EvalFilter,
    ) -> AggregateScore {
        let (references, candidates): (Vec<&Document>, Vec<&SummaryResult>) = match filter {
            EvalFilter::All => (references.iter().collect(), candidates.iter().collect()),
            EvalFilter::First(n) => (
                references.iter().take(*n).collect(),
                candidates.iter().take(*n).collect(),
            ),
            EvalFilter::Ids(ids) => (
                references.iter().filter(|d| ids.contains(&d.id)).collect(),
                candidates.iter().filter(|c| ids.contains(&c.id)).collect(),
            ),
        };

        let by_id: HashMap<u64, &str> = references
            .iter()
            .map(|d| (d.id, d.summary_text.as_str()))
            .collect();

        self.aggregate(candidates.iter().map(|c| {
            let candidate = if c.error.is_some() {
                ""
            } else {
                c.refined_summary_improved.as_str()
            };
            (c.id, by_id.get(&c.id).copied(), candidate)
        }))
    }
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if n == 0 || tokens.len() < n {
        return counts;
    }
    for w in tokens.windows(n) {
        *counts.entry(w).or_insert(0) += 1;
    }
    counts
}

fn f_measure(matches: usize, reference_len: usize, candidate_len: usize) -> f64 {
    if matches == 0 || reference_len == 0 || candidate_len == 0 {
        return 0.0;
    }
    let precision = matches as f64 / candidate_len as f64;
    let recall = matches as f64 / reference_len as f64;
    2.0 * precision * recall / (precision + recall)
}

pub fn rouge_n(reference: &[String], candidate: &[String], n: usize) -> f64 {
    let ref_counts = ngram_counts(reference, n);
    let cand_counts = ngram_counts(candidate, n);
    let matches: usize = cand_counts
        .iter()
        .map(|(gram, &c)| c.min(ref_counts.get(gram).copied().unwrap_or(0)))
        .sum();
    f_measure(
        matches,
        ref_counts.values().sum(),
        cand_counts.values().sum(),
    )
}

pub fn rouge_l(reference: &[String], candidate: &[String]) -> f64 {
    f_measure(lcs_len(reference, candidate), reference.len(), candidate.len())
}

/// Longest common subsequence length, two-row dynamic programming.
fn lcs_len(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}
