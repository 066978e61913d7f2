use crate::{artifact::Document, config::Config, error::DocumentError};
use anyhow::{Result, anyhow};
use regex::Regex;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

pub struct CleanOutcome {
    pub documents: Vec<Document>,
    pub skipped: Vec<DocumentError>,
}

/// Compiled cleaning rules for one run.
pub struct Cleaner {
    normalize_unicode: bool,
    normalize_punctuation: bool,
    html: Option<Regex>,
    removals: Vec<Regex>,
}

impl Cleaner {
    pub fn new(cfg: &Config) -> Result<Self> {
        let c = &cfg.cleaning;
        let mut patterns: Vec<String> = Vec::new();
        if c.remove_legal_headers {
            patterns.push(r"(?i)^\s*(CIVIL|CRIMINAL|APPEAL|WRIT|PETITION).*?\.\s*".into());
            patterns.push(r"(?i)\bIN THE HIGH COURT OF [A-Z\s]+\.?".into());
        }
        patterns.extend(c.remove_patterns.iter().cloned());

        let removals = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let html = if c.strip_html {
            Some(Regex::new(r"<[^>]+>")?)
        } else {
            None
        };

        Ok(Self {
            normalize_unicode: c.normalize_unicode,
            normalize_punctuation: c.normalize_punctuation,
            html,
            removals,
        })
    }

    pub fn clean_text(&self, raw: &str) -> String {
        let mut s = if self.normalize_unicode {
            raw.nfkc().collect::<String>()
        } else {
            raw.to_string()
        };
        s = s.split_whitespace().collect::<Vec<_>>().join(" ");

        if let Some(html) = &self.html {
            s = html.replace_all(&s, "").into_owned();
        }
        if self.normalize_punctuation {
            s = normalize_punctuation(&s);
        }
        for r in &self.removals {
            s = r.replace_all(&s, "").into_owned();
        }
        crate::util::collapse_whitespace(&s)
    }
}

fn normalize_punctuation(s: &str) -> String {
    s.chars()
        .map(|ch| match ch {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            '\u{2010}' | '\u{2013}' | '\u{2014}' | '\u{2022}' => '-',
            other => other,
        })
        .collect()
}

fn first_string<'a>(record: &'a Value, fields: &[String]) -> Option<&'a str> {
    fields
        .iter()
        .find_map(|f| record.get(f.as_str()).and_then(Value::as_str))
}

/// Turns raw dataset records into `Document`s.
///
/// The input must be a JSON array. Records without a usable text or summary are
/// skipped and reported, never fatal.
pub fn clean_records(cfg: &Config, raw: &Value) -> Result<CleanOutcome> {
    let records = raw
        .as_array()
        .ok_or_else(|| anyhow!("raw dataset must be a JSON array of records"))?;
    let cleaner = Cleaner::new(cfg)?;
    let limit = if cfg.global.limit > 0 {
        cfg.global.limit
    } else {
        records.len()
    };

    let mut documents = Vec::new();
    let mut skipped = Vec::new();

    for (index, record) in records.iter().take(limit).enumerate() {
        let malformed = |reason: &str| DocumentError::MalformedInput {
            index,
            reason: reason.to_string(),
        };
        if !record.is_object() {
            skipped.push(malformed("not an object"));
            continue;
        }
        let id = match record.get("id") {
            None | Some(Value::Null) => index as u64,
            Some(v) => match v.as_u64() {
                Some(id) => id,
                None => {
                    skipped.push(malformed("id is not a non-negative integer"));
                    continue;
                }
            },
        };
        let Some(text) = first_string(record, &cfg.cleaning.text_fields) else {
            skipped.push(malformed("missing text field"));
            continue;
        };
        let Some(summary) = first_string(record, &cfg.cleaning.summary_fields) else {
            skipped.push(malformed("missing summary field"));
            continue;
        };

        let input_text = cleaner.clean_text(text);
        let summary_text = cleaner.clean_text(summary);
        if input_text.is_empty() || summary_text.is_empty() {
            skipped.push(malformed("empty after cleaning"));
            continue;
        }
        documents.push(Document {
            id,
            input_text,
            summary_text,
        });
    }

    Ok(CleanOutcome { documents, skipped })
}
