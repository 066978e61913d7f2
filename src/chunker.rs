use crate::{artifact::ChunkSet, artifact::Document, tokenizer::TokenCounter};
use tracing::debug;

/// Greedy, order-preserving bin packing of `items` under a token `budget`.
///
/// Each item is measured on its own, so subword costs at the joins are not
/// counted. An item that alone exceeds the budget still becomes its own bin.
pub fn pack_greedy<'a, I, F>(items: I, budget: usize, mut measure: F) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
    F: FnMut(&str) -> usize,
{
    let mut bins = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0usize;

    for item in items {
        let len = measure(item);
        if current_len + len > budget && !current.is_empty() {
            bins.push(current.join(" "));
            current = vec![item];
            current_len = len;
        } else {
            current.push(item);
            current_len += len;
        }
    }

    if !current.is_empty() {
        bins.push(current.join(" "));
    }
    bins
}

/// Splits `text` into whitespace-word chunks whose token length stays within `max_tokens`.
pub fn chunk(text: &str, max_tokens: usize, tokenizer: &dyn TokenCounter) -> Vec<String> {
    pack_greedy(text.split_whitespace(), max_tokens, |w| {
        tokenizer.token_length(w)
    })
}

pub struct ChunkOutcome {
    pub chunk_sets: Vec<ChunkSet>,
    /// Ids of documents with no text after trimming.
    pub skipped: Vec<u64>,
}

pub fn chunk_corpus(
    documents: &[Document],
    max_tokens: usize,
    tokenizer: &dyn TokenCounter,
) -> ChunkOutcome {
    let mut chunk_sets = Vec::with_capacity(documents.len());
    let mut skipped = Vec::new();

    for doc in documents {
        let text = doc.input_text.trim();
        if text.is_empty() {
            skipped.push(doc.id);
            continue;
        }
        let chunks = chunk(text, max_tokens, tokenizer);
        debug!("document {} -> {} chunks", doc.id, chunks.len());
        chunk_sets.push(ChunkSet { id: doc.id, chunks });
    }

    ChunkOutcome {
        chunk_sets,
        skipped,
    }
}
