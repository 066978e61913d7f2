use serde::{Deserialize, Serialize};

/// Legally salient terms whose sentences must survive summarization.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "mediation",
    "conciliation",
    "FIR",
    "settlement",
    "agreed",
    "section",
    "sections",
    "498A",
    "323",
    "354",
    "504",
    "arbitration",
    "settlement agreement",
    "inherent power",
    "Full Bench",
    "Ram Lal",
    "tribunal",
    "appeal",
    "supreme court",
    "judgment",
    "petition",
];

/// How matching sentences are ordered in the extractor's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordOrder {
    /// Walk the keyword list; for each term take its first uncollected sentence.
    /// The result is not sorted by position in the document.
    #[default]
    KeywordPriority,
    /// Walk the document; take every sentence that mentions any term.
    DocumentOrder,
}

/// Splits after `.`, `!` or `?` when followed by whitespace. Spans are trimmed and
/// empty ones dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_i, next_c)) = chars.peek() {
            if next_c.is_whitespace() {
                push_trimmed(&mut out, &text[start..next_i]);
                start = next_i;
            }
        }
    }
    push_trimmed(&mut out, &text[start..]);
    out
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, span: &'a str) {
    let span = span.trim();
    if !span.is_empty() {
        out.push(span);
    }
}

pub struct KeywordExtractor {
    terms: Vec<String>,
    order: KeywordOrder,
}

impl KeywordExtractor {
    pub fn new<S: AsRef<str>>(terms: &[S], order: KeywordOrder) -> Self {
        Self {
            terms: terms.iter().map(|t| t.as_ref().to_lowercase()).collect(),
            order,
        }
    }

    /// Sentences of `text` mentioning a keyword, deduplicated, at most `limit` of them.
    pub fn extract(&self, text: &str, limit: usize) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        if limit == 0 || self.terms.is_empty() {
            return found;
        }

        let sentences = split_sentences(text);
        let lowered: Vec<String> = sentences.iter().map(|s| s.to_lowercase()).collect();

        match self.order {
            KeywordOrder::KeywordPriority => {
                for term in &self.terms {
                    let hit = lowered
                        .iter()
                        .zip(&sentences)
                        .find(|(l, s)| l.contains(term.as_str()) && !found.iter().any(|f| f == *s));
                    if let Some((_, s)) = hit {
                        found.push(s.to_string());
                        if found.len() >= limit {
                            break;
                        }
                    }
                }
            }
            KeywordOrder::DocumentOrder => {
                for (l, s) in lowered.iter().zip(&sentences) {
                    let mentions = self.terms.iter().any(|t| l.contains(t.as_str()));
                    if mentions && !found.iter().any(|f| f == s) {
                        found.push(s.to_string());
                        if found.len() >= limit {
                            break;
                        }
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let s = split_sentences("First one. Second!  Third? tail");
        assert_eq!(s, vec!["First one.", "Second!", "Third?", "tail"]);
    }

    #[test]
    fn abbreviation_without_space_does_not_split() {
        let s = split_sentences("Section 3.2 applies. Done.");
        assert_eq!(s, vec!["Section 3.2 applies.", "Done."]);
    }

    #[test]
    fn arbitration_then_tribunal() {
        let ex = KeywordExtractor::new(&["arbitration", "tribunal"], KeywordOrder::KeywordPriority);
        let text = "Facts were disputed. Then the matter went to arbitration. The tribunal ruled.";
        assert_eq!(
            ex.extract(text, 5),
            vec!["Then the matter went to arbitration.", "The tribunal ruled."]
        );
    }

    #[test]
    fn keyword_priority_can_reorder_document() {
        let ex = KeywordExtractor::new(&["tribunal", "appeal"], KeywordOrder::KeywordPriority);
        let text = "The appeal was filed. The tribunal ruled.";
        assert_eq!(
            ex.extract(text, 5),
            vec!["The tribunal ruled.", "The appeal was filed."]
        );

        let ex = KeywordExtractor::new(&["tribunal", "appeal"], KeywordOrder::DocumentOrder);
        assert_eq!(
            ex.extract(text, 5),
            vec!["The appeal was filed.", "The tribunal ruled."]
        );
    }

    #[test]
    fn matching_is_case_insensitive_both_ways() {
        let ex = KeywordExtractor::new(&["Full Bench", "FIR"], KeywordOrder::KeywordPriority);
        let text = "Referred to the full bench. An fir was lodged.";
        assert_eq!(ex.extract(text, 5).len(), 2);
    }

    #[test]
    fn respects_limit_and_dedup() {
        let ex = KeywordExtractor::new(&["appeal", "court", "appeal"], KeywordOrder::KeywordPriority);
        let text = "The appeal court sat. The appeal failed. The court rose.";
        let got = ex.extract(text, 2);
        assert_eq!(got, vec!["The appeal court sat.", "The court rose."]);
        assert!(ex.extract(text, 0).is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let ex = KeywordExtractor::new(DEFAULT_KEYWORDS, KeywordOrder::KeywordPriority);
        let text = "The petition under section 482 was allowed. A settlement was agreed. \
                    The appeal is dismissed. No order as to costs.";
        assert_eq!(ex.extract(text, 3), ex.extract(text, 3));
        assert!(ex.extract(text, 3).len() <= 3);
    }
}
