use lexsum::{
    artifact::Document,
    chunker::{chunk, chunk_corpus, pack_greedy},
    tokenizer::{TokenCounter, WhitespaceTokenizer},
};

/// Roughly one token per four characters, like a subword vocabulary would.
struct CharQuarters;

impl TokenCounter for CharQuarters {
    fn token_length(&self, text: &str) -> usize {
        text.split_whitespace().map(|w| w.len().div_ceil(4)).sum()
    }

    fn decode(&self, _ids: &[u32]) -> anyhow::Result<String> {
        anyhow::bail!("not supported")
    }
}

const JUDGMENT: &str = "The appellant was convicted under section 498A and section 323 of the \
    Indian Penal Code. On appeal the High Court held that the parties had entered into a \
    settlement agreement before the mediation centre and that the inherent power of the court \
    could be exercised to quash the FIR. The respondents opposed the petition.";

#[test]
fn chunks_stay_within_budget() {
    let tok = CharQuarters;
    for budget in [1, 3, 8, 20, 64] {
        for c in chunk(JUDGMENT, budget, &tok) {
            let words = c.split_whitespace().count();
            // a single word over budget is the only allowed overflow
            assert!(
                words == 1 || tok.token_length(&c) <= budget,
                "budget={budget} chunk={c:?}"
            );
        }
    }
}

#[test]
fn chunks_reconstruct_the_word_sequence() {
    let tok = CharQuarters;
    let words: Vec<&str> = JUDGMENT.split_whitespace().collect();
    for budget in [1, 5, 16, 1000] {
        let chunks = chunk(JUDGMENT, budget, &tok);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        let rebuilt = chunks.join(" ");
        assert_eq!(rebuilt.split_whitespace().collect::<Vec<_>>(), words);
    }
}

#[test]
fn large_budget_yields_one_chunk() {
    let tok = WhitespaceTokenizer::new();
    let chunks = chunk(JUDGMENT, 10_000, &tok);
    assert_eq!(chunks.len(), 1);
}

#[test]
fn whitespace_words_pack_two_at_a_time() {
    let tok = WhitespaceTokenizer::new();
    assert_eq!(chunk("A B C D E", 2, &tok), vec!["A B", "C D", "E"]);
}

#[test]
fn packing_never_opens_an_empty_first_bin() {
    let bins = pack_greedy(["overlong"], 1, |w| w.len());
    assert_eq!(bins, vec!["overlong"]);
}

#[test]
fn corpus_keeps_ids_and_reports_empty_documents() {
    let tok = WhitespaceTokenizer::new();
    let docs = vec![
        Document {
            id: 10,
            input_text: "a b c".into(),
            summary_text: "x".into(),
        },
        Document {
            id: 11,
            input_text: "\n".into(),
            summary_text: "x".into(),
        },
        Document {
            id: 12,
            input_text: "d".into(),
            summary_text: "x".into(),
        },
    ];
    let out = chunk_corpus(&docs, 2, &tok);
    let ids: Vec<u64> = out.chunk_sets.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![10, 12]);
    assert_eq!(out.skipped, vec![11]);
    assert_eq!(out.chunk_sets[0].chunks, vec!["a b", "c"]);
}
