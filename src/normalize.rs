use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{RawScore, ScoreRecord};

/// Stored sentinel for "assessed, but absent or skipped".
pub const NOT_PERFORMED: &str = "X";

const NOT_PERFORMED_TOKENS: [&str; 4] = ["x", "na", "n/a", "absent"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedScore {
    Numeric(f64),
    NotPerformed,
    Blank,
}

impl ParsedScore {
    /// Numeric view: not-performed and blank both read as `None`.
    pub fn value(self) -> Option<f64> {
        match self {
            ParsedScore::Numeric(v) => Some(v),
            ParsedScore::NotPerformed | ParsedScore::Blank => None,
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            ParsedScore::Numeric(_) => "numeric",
            ParsedScore::NotPerformed => "not_performed",
            ParsedScore::Blank => "blank",
        }
    }
}

pub fn parse_score(raw: &RawScore) -> ParsedScore {
    match raw {
        RawScore::Blank => ParsedScore::Blank,
        RawScore::Number(v) if v.is_finite() => ParsedScore::Numeric(*v),
        RawScore::Number(_) => ParsedScore::Blank,
        RawScore::Text(s) => parse_score_text(s),
    }
}

fn parse_score_text(s: &str) -> ParsedScore {
    let t = s.trim();
    let t = t.strip_suffix('%').unwrap_or(t).trim();
    if t.is_empty() {
        return ParsedScore::Blank;
    }
    let lower = t.to_ascii_lowercase();
    if NOT_PERFORMED_TOKENS.contains(&lower.as_str()) {
        return ParsedScore::NotPerformed;
    }
    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => ParsedScore::Numeric(v),
        _ => ParsedScore::Blank,
    }
}

/// Same clamp/round the stored form uses: `[0, 100]`, half away from zero.
pub fn clamp_percent(v: f64) -> f64 {
    v.clamp(0.0, 100.0).round()
}

/// `'0'..'100'`, `'X'`, or nothing. This is the only score form that gets written back.
pub fn sanitize_for_storage(raw: &RawScore) -> Option<String> {
    match parse_score(raw) {
        ParsedScore::Numeric(v) => Some(format!("{}", clamp_percent(v) as i64)),
        ParsedScore::NotPerformed => Some(NOT_PERFORMED.to_string()),
        ParsedScore::Blank => None,
    }
}

pub fn display_value(raw: &RawScore) -> String {
    match parse_score(raw) {
        ParsedScore::Numeric(v) => format!("{}", v.round() as i64),
        ParsedScore::NotPerformed => NOT_PERFORMED.to_string(),
        ParsedScore::Blank => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatusCode {
    /// To present.
    P,
    /// Practicing.
    W,
    /// Mastered.
    M,
    /// Next-month aim.
    A,
}

impl StatusCode {
    pub const ALL: [StatusCode; 4] = [StatusCode::P, StatusCode::W, StatusCode::M, StatusCode::A];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCode::P => "P",
            StatusCode::W => "W",
            StatusCode::M => "M",
            StatusCode::A => "A",
        }
    }
}

/// Strict status lookup: `None` when the label is not one we know.
pub fn recognize_status(raw: &str) -> Option<StatusCode> {
    let folded: String = raw
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    match folded.as_str() {
        "p" | "present" | "planned" | "todo" | "to present" => Some(StatusCode::P),
        "w" | "practicing" | "working" | "in progress" => Some(StatusCode::W),
        "m" | "mastered" | "done" | "complete" => Some(StatusCode::M),
        "a" | "aim" | "next month aim" | "goal" => Some(StatusCode::A),
        _ => None,
    }
}

/// Unknown and empty labels become `P`. Corrupted rows therefore show up as
/// "to present" rather than disappearing from the board; callers that care
/// use `recognize_status` to tell the two apart.
pub fn normalize_status(raw: &str) -> StatusCode {
    recognize_status(raw).unwrap_or(StatusCode::P)
}

/// Keeps one record per (assessment, skill): the newest `created_at` wins,
/// and on missing or equal timestamps the later record in the slice wins.
/// Output follows the order in which each key was first seen.
pub fn select_effective<'a>(
    records: impl IntoIterator<Item = &'a ScoreRecord>,
) -> Vec<&'a ScoreRecord> {
    let mut slot_by_key: HashMap<(&str, &str), usize> = HashMap::new();
    let mut winners: Vec<&'a ScoreRecord> = Vec::new();

    for rec in records {
        let key = (rec.assessment_id.as_str(), rec.skill_id.as_str());
        match slot_by_key.get(&key) {
            None => {
                slot_by_key.insert(key, winners.len());
                winners.push(rec);
            }
            Some(&slot) => {
                let current = winners[slot];
                let replace = match (current.created_at, rec.created_at) {
                    (Some(cur), Some(new)) => new >= cur,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                if replace {
                    winners[slot] = rec;
                }
            }
        }
    }

    winners
}
