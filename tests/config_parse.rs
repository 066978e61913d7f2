use lexsum::{config::Config, keywords::KeywordOrder};

#[test]
fn parse_example_config() {
    let raw = include_str!("../lexsum.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert!(cfg.global.max_parallel_documents >= 1);
    assert!(!cfg.paths.out_dir.is_empty());
    assert_eq!(cfg.chunking.max_tokens, 512);
    assert_eq!(cfg.keywords.order, KeywordOrder::KeywordPriority);
    assert_eq!(cfg.keywords.terms.len(), 21);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[summarizer]\nbatch_size = 2\n").expect("parse TOML");
    assert_eq!(cfg.summarizer.batch_size, 2);
    assert_eq!(cfg.summarizer.final_min_len, 90);
    assert_eq!(cfg.summarizer.final_sum_max, 300);
    assert_eq!(cfg.generation.backend, "python");
}

#[test]
fn document_order_policy_parses() {
    let cfg: Config =
        toml::from_str("[keywords]\norder = \"document_order\"\nterms = [\"appeal\"]\n")
            .expect("parse TOML");
    assert_eq!(cfg.keywords.order, KeywordOrder::DocumentOrder);
}

#[test]
fn partial_sections_keep_their_other_defaults() {
    let raw = "[generation]\nbackend = \"lead\"\n\n[cleaning]\nremove_legal_headers = true\n\n[logging]\njson = true\n";
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.generation.backend, "lead");
    assert_eq!(cfg.generation.num_beams, 8);
    assert!(cfg.cleaning.remove_legal_headers);
    assert_eq!(cfg.cleaning.text_fields[0], "input_text");
    assert!(cfg.logging.json);
    assert_eq!(cfg.logging.level, "info");
}
