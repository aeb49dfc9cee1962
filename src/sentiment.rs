//! Lexicon based mood scoring.
//!
//! Each token is looked up in a valence lexicon (integer weights in
//! `-5..=5`); a weight is inverted when the token directly follows a
//! negator ("not happy" scores like "unhappy"). The summed score is then
//! bucketed into one of five labels.

use lazy_static::lazy_static;
use serde::{ Deserialize, Serialize };
use std::collections::{ HashMap, HashSet };
use std::fmt;

use crate::models::chat::{ ChatMessage, Role };

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoodLabel {
    #[serde(rename = "very negative")]
    VeryNegative,
    #[serde(rename = "negative")]
    Negative,
    #[serde(rename = "neutral")]
    Neutral,
    #[serde(rename = "positive")]
    Positive,
    #[serde(rename = "very positive")]
    VeryPositive,
}

impl MoodLabel {
    pub fn from_score(score: f64) -> Self {
        if score > 3.0 {
            MoodLabel::VeryPositive
        } else if score > 1.0 {
            MoodLabel::Positive
        } else if score < -3.0 {
            MoodLabel::VeryNegative
        } else if score < -1.0 {
            MoodLabel::Negative
        } else {
            MoodLabel::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodLabel::VeryNegative => "very negative",
            MoodLabel::Negative => "negative",
            MoodLabel::Neutral => "neutral",
            MoodLabel::Positive => "positive",
            MoodLabel::VeryPositive => "very positive",
        }
    }
}

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mood {
    pub score: f64,
    pub label: MoodLabel,
}

lazy_static! {
    static ref LEXICON: HashMap<&'static str, i32> = {
        let entries: &[(&str, i32)] = &[
            ("abandon", -2), ("abandoned", -2), ("abuse", -3), ("abused", -3),
            ("afraid", -2), ("agony", -3), ("alone", -2), ("amazing", 4),
            ("anger", -3), ("angry", -3), ("anguish", -3), ("annoyed", -2),
            ("anxiety", -2), ("anxious", -2), ("appreciate", 2), ("ashamed", -2),
            ("awesome", 4), ("awful", -3), ("bad", -3), ("beautiful", 3),
            ("best", 3), ("better", 2), ("bitter", -2), ("bored", -2),
            ("broken", -1), ("calm", 2), ("care", 2), ("cared", 2),
            ("cheerful", 2), ("comfortable", 2), ("confident", 2), ("confused", -2),
            ("cried", -2), ("cry", -1), ("crying", -2), ("dead", -3),
            ("depressed", -2), ("depression", -2), ("desperate", -3), ("despair", -3),
            ("devastated", -2), ("die", -3), ("disappointed", -2), ("disappointing", -2),
            ("distressed", -2), ("dread", -2), ("empty", -1), ("enjoy", 2),
            ("enjoyed", 2), ("excellent", 3), ("excited", 3), ("exhausted", -2),
            ("fail", -2), ("failed", -2), ("failure", -2), ("fantastic", 4),
            ("fear", -2), ("fine", 2), ("frightened", -2), ("frustrated", -2),
            ("frustrating", -2), ("fun", 4), ("glad", 3), ("good", 3),
            ("grateful", 3), ("great", 3), ("grief", -2), ("grieving", -2),
            ("guilt", -3), ("guilty", -3), ("happy", 3), ("hate", -3),
            ("hated", -3), ("heartbroken", -3), ("helpful", 2), ("helpless", -2),
            ("hope", 2), ("hopeful", 2), ("hopeless", -2), ("horrible", -3),
            ("hurt", -2), ("hurting", -2), ("inspired", 2), ("isolated", -1),
            ("jealous", -2), ("joy", 3), ("joyful", 3), ("kill", -3),
            ("kind", 2), ("laugh", 1), ("like", 2), ("lonely", -2),
            ("loss", -3), ("lost", -3), ("love", 3), ("loved", 3),
            ("lovely", 3), ("miserable", -3), ("miss", -2), ("nervous", -2),
            ("nice", 3), ("numb", -1), ("ok", 2), ("okay", 2),
            ("overwhelmed", -2), ("pain", -2), ("painful", -2), ("panic", -3),
            ("peaceful", 2), ("pleased", 3), ("proud", 2), ("rejected", -1),
            ("relaxed", 2), ("relief", 1), ("relieved", 2), ("sad", -2),
            ("sadness", -2), ("safe", 1), ("scared", -2), ("shame", -2),
            ("smile", 2), ("sorrow", -2), ("strong", 2), ("stress", -1),
            ("stressed", -2), ("struggle", -2), ("struggling", -2), ("suicidal", -2),
            ("suicide", -2), ("support", 2), ("supported", 2), ("terrible", -3),
            ("terrified", -3), ("thank", 2), ("thanks", 2), ("tired", -2),
            ("trapped", -2), ("unhappy", -2), ("upset", -2), ("useless", -2),
            ("wonderful", 4), ("worried", -3), ("worry", -3), ("worse", -3),
            ("worst", -3), ("worthless", -2), ("wrong", -2),
        ];
        entries.iter().copied().collect()
    };

    static ref NEGATORS: HashSet<&'static str> = [
        "not", "no", "never", "don't", "dont", "doesn't", "didn't", "isn't",
        "aren't", "wasn't", "weren't", "can't", "cannot", "won't", "wouldn't",
        "haven't", "hasn't",
    ]
        .into_iter()
        .collect();
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('\u{2019}', "'")
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(|t| t.trim_matches('\'').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Signed valence of `text`. Pure and deterministic.
pub fn score_text(text: &str) -> f64 {
    let tokens = tokenize(text);
    let mut total = 0i32;
    for (i, token) in tokens.iter().enumerate() {
        if let Some(weight) = LEXICON.get(token.as_str()) {
            let negated = i > 0 && NEGATORS.contains(tokens[i - 1].as_str());
            total += if negated { -weight } else { *weight };
        }
    }
    total as f64
}

pub fn analyze(text: &str) -> Mood {
    let score = score_text(text);
    Mood { score, label: MoodLabel::from_score(score) }
}

/// Moods of the first and the most recent user message. A side is `None`
/// when there is no user message or its content is blank.
pub fn mood_trend(conversation: &[ChatMessage]) -> (Option<Mood>, Option<Mood>) {
    let mut user_messages = conversation.iter().filter(|m| m.role == Role::User);
    let first = user_messages.next();
    let last = conversation.iter().rev().find(|m| m.role == Role::User);

    let mood_of = |m: Option<&ChatMessage>| {
        m.filter(|m| !m.content.trim().is_empty()).map(|m| analyze(&m.content))
    };
    (mood_of(first), mood_of(last))
}
