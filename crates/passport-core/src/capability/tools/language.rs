//! `detect_language`: deterministic script and stop-word heuristic.
//!
//! The dominant Unicode script picks the language family; Arabic-script
//! text is split into Arabic / Farsi / Urdu by letters unique to each, and
//! Latin-script text is scored against short stop-word lists. Text with no
//! letters, or Latin text matching no list, is reported as `und`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capability::TypedToolHandler;
use crate::error::PassportError;
use crate::locale::UNDETERMINED;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectLanguageInput {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LanguageCandidate {
    pub lang: String,
    pub prob: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Two-letter code of the most likely language, or `und`.
    pub lang: String,
    pub confidence: f64,
    /// Up to five candidates, most likely first.
    pub alternates: Vec<LanguageCandidate>,
}

impl Detection {
    pub fn undetermined() -> Self {
        Self {
            lang: UNDETERMINED.to_string(),
            confidence: 0.0,
            alternates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Script {
    Latin,
    Greek,
    Cyrillic,
    Hebrew,
    Arabic,
    Devanagari,
    Bengali,
    Thai,
    Hangul,
    Kana,
    Han,
}

fn script_of(c: char) -> Option<Script> {
    match c as u32 {
        0x0041..=0x005A | 0x0061..=0x007A | 0x00C0..=0x024F => Some(Script::Latin),
        0x0370..=0x03FF => Some(Script::Greek),
        0x0400..=0x04FF => Some(Script::Cyrillic),
        0x0590..=0x05FF => Some(Script::Hebrew),
        0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF => {
            Some(Script::Arabic)
        }
        0x0900..=0x097F => Some(Script::Devanagari),
        0x0980..=0x09FF => Some(Script::Bengali),
        0x0E00..=0x0E7F => Some(Script::Thai),
        0x1100..=0x11FF | 0x3130..=0x318F | 0xAC00..=0xD7AF => Some(Script::Hangul),
        0x3040..=0x30FF => Some(Script::Kana),
        0x3400..=0x4DBF | 0x4E00..=0x9FFF => Some(Script::Han),
        _ => None,
    }
}

// ٹ ڈ ڑ ں ھ ے
const URDU_LETTERS: &[char] = &['\u{0679}', '\u{0688}', '\u{0691}', '\u{06BA}', '\u{06BE}', '\u{06D2}'];
// پ چ ژ گ ک ی
const FARSI_LETTERS: &[char] = &['\u{067E}', '\u{0686}', '\u{0698}', '\u{06AF}', '\u{06A9}', '\u{06CC}'];
// і ї є ґ
const UKRAINIAN_LETTERS: &[char] = &['\u{0456}', '\u{0457}', '\u{0454}', '\u{0491}'];

const STOP_WORDS: &[(&str, &[&str])] = &[
    ("en", &["the", "and", "of", "to", "in", "is", "with", "for", "patient", "was", "has", "on", "he", "she", "no"]),
    ("es", &["el", "la", "de", "que", "y", "en", "los", "con", "por", "las", "del", "paciente", "una", "se", "es"]),
    ("fr", &["le", "la", "les", "de", "et", "des", "est", "une", "avec", "pour", "du", "dans", "il", "au", "pas"]),
    ("de", &["der", "die", "und", "das", "ist", "mit", "den", "von", "nicht", "ein", "eine", "im", "zu", "bei", "patientin"]),
    ("pt", &["o", "a", "que", "e", "do", "da", "em", "com", "os", "uma", "não", "para", "dos", "foi", "paciente"]),
    ("it", &["il", "di", "che", "e", "per", "con", "della", "paziente", "un", "non", "sono", "gli", "nel", "ha", "del"]),
    ("tr", &["ve", "bir", "bu", "ile", "için", "hasta", "olarak", "var", "çok", "daha", "olan", "ama", "gibi", "de", "da"]),
    ("id", &["dan", "yang", "di", "dengan", "untuk", "pasien", "ini", "itu", "tidak", "dari", "ke", "pada", "adalah", "juga", "akan"]),
];

fn count_of(text: &str, letters: &[char]) -> usize {
    text.chars().filter(|c| letters.contains(c)).count()
}

/// Candidate languages for the letters of one script, with weights summing
/// to 1 (or empty when a Latin text has no recognisable stop words).
fn script_languages(
    script: Script,
    text: &str,
    counts: &BTreeMap<Script, usize>,
) -> Vec<(&'static str, f64)> {
    let lang = match script {
        Script::Latin => return latin_languages(text),
        Script::Arabic => {
            if count_of(text, URDU_LETTERS) > 0 {
                "ur"
            } else if count_of(text, FARSI_LETTERS) > 0 {
                "fa"
            } else {
                "ar"
            }
        }
        Script::Cyrillic => {
            if count_of(text, UKRAINIAN_LETTERS) > 0 {
                "uk"
            } else {
                "ru"
            }
        }
        Script::Han if counts.contains_key(&Script::Kana) => "ja",
        Script::Han => "zh",
        Script::Kana => "ja",
        Script::Greek => "el",
        Script::Hebrew => "he",
        Script::Devanagari => "hi",
        Script::Bengali => "bn",
        Script::Thai => "th",
        Script::Hangul => "ko",
    };
    vec![(lang, 1.0)]
}

/// Share of stop-word hits per Latin-script language; empty when nothing
/// matches.
fn latin_languages(text: &str) -> Vec<(&'static str, f64)> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .collect();

    let hits: Vec<(&'static str, usize)> = STOP_WORDS
        .iter()
        .map(|(lang, list)| (*lang, words.iter().filter(|w| list.contains(*w)).count()))
        .filter(|(_, n)| *n > 0)
        .collect();

    let total: usize = hits.iter().map(|(_, n)| n).sum();
    if total == 0 {
        return Vec::new();
    }
    hits.into_iter()
        .map(|(lang, n)| (lang, n as f64 / total as f64))
        .collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn detect(text: &str) -> Detection {
    let mut counts: BTreeMap<Script, usize> = BTreeMap::new();
    let mut total = 0usize;
    for script in text.chars().filter(|c| c.is_alphabetic()).filter_map(script_of) {
        *counts.entry(script).or_default() += 1;
        total += 1;
    }
    if total == 0 {
        return Detection::undetermined();
    }

    let mut scores: BTreeMap<&'static str, f64> = BTreeMap::new();
    for (script, count) in &counts {
        let share = *count as f64 / total as f64;
        for (lang, weight) in script_languages(*script, text, &counts) {
            *scores.entry(lang).or_default() += share * weight;
        }
    }

    let mut ranked: Vec<LanguageCandidate> = scores
        .into_iter()
        .map(|(lang, prob)| LanguageCandidate {
            lang: lang.to_string(),
            prob: round3(prob),
        })
        .collect();
    // BTreeMap order breaks ties alphabetically; the sort is stable.
    ranked.sort_by(|a, b| b.prob.total_cmp(&a.prob));
    ranked.truncate(5);

    match ranked.first() {
        Some(top) => Detection {
            lang: top.lang.clone(),
            confidence: top.prob,
            alternates: ranked.clone(),
        },
        None => Detection::undetermined(),
    }
}

pub struct LanguageDetector;

#[async_trait]
impl TypedToolHandler for LanguageDetector {
    type Input = DetectLanguageInput;
    type Output = Detection;

    const NAME: &'static str = "detect_language";
    const DESCRIPTION: &'static str = "Detect the language of a text. Returns 'und' when it cannot be determined.";

    async fn handle(&self, input: DetectLanguageInput) -> Result<Detection, PassportError> {
        Ok(detect(input.text.trim()))
    }
}
