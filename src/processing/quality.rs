//! Heuristic text quality scoring.
//!
//! The scorer reduces a page of text to three sub-metrics in `[0, 1]`:
//!
//! - **completeness**: word count against an expected baseline, plus whether the text ends
//!   on a finished sentence rather than a dangling fragment or cut word;
//! - **coherence**: formatting consistency, penalizing irregular casing inside words,
//!   irregular whitespace runs and indentation, and abrupt register changes between lines;
//! - **noise level**: the share of characters that are neither letters nor standard
//!   punctuation.
//!
//! The aggregate is a weighted mean of `completeness`, `coherence`, and `1 - noise_level`.
//! Scoring is pure: identical input always yields identical output.

use serde::{Deserialize, Serialize};

use super::types::{ConfigurationError, ExtractionResult, MergedResult, QualityMetrics};

const CASING_PENALTY_WEIGHT: f64 = 0.35;
const WHITESPACE_PENALTY_WEIGHT: f64 = 0.35;
const REGISTER_PENALTY_WEIGHT: f64 = 0.30;

/// Relative weights of the sub-metrics in the aggregate score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    /// Weight of the completeness sub-metric.
    pub completeness: f64,
    /// Weight of the coherence sub-metric.
    pub coherence: f64,
    /// Weight of `1 - noise_level`.
    pub cleanliness: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            completeness: 0.4,
            coherence: 0.3,
            cleanliness: 0.3,
        }
    }
}

/// Scorer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Sub-metric weights.
    pub weights: QualityWeights,
    /// Word count at which the length component of completeness saturates.
    pub expected_words: usize,
    /// Trailing fragments with at least this many words count as truncation.
    pub min_fragment_words: usize,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            expected_words: 100,
            min_fragment_words: 3,
        }
    }
}

/// Anything the scorer can read text from.
pub trait Scorable {
    /// Text to score.
    fn text(&self) -> &str;
}

impl Scorable for ExtractionResult {
    fn text(&self) -> &str {
        &self.text_content
    }
}

impl Scorable for MergedResult {
    fn text(&self) -> &str {
        &self.text_content
    }
}

impl Scorable for str {
    fn text(&self) -> &str {
        self
    }
}

/// Deterministic quality scorer.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    /// Build a scorer, rejecting negative weights or a zero weight sum.
    pub fn new(config: QualityConfig) -> Result<Self, ConfigurationError> {
        let QualityWeights {
            completeness,
            coherence,
            cleanliness,
        } = config.weights;
        let weights = [completeness, coherence, cleanliness];
        let valid = weights.iter().all(|w| w.is_finite() && *w >= 0.0)
            && weights.iter().sum::<f64>() > 0.0;
        if !valid {
            return Err(ConfigurationError::InvalidWeights);
        }
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Aggregate score in `[0, 1]`.
    pub fn score<T: Scorable + ?Sized>(&self, result: &T) -> f64 {
        self.score_detailed(result).score
    }

    /// Sub-metric breakdown and aggregate.
    pub fn score_detailed<T: Scorable + ?Sized>(&self, result: &T) -> QualityMetrics {
        self.score_text(result.text())
    }

    /// Score raw text.
    pub fn score_text(&self, text: &str) -> QualityMetrics {
        if text.trim().is_empty() {
            return QualityMetrics::empty();
        }

        let word_count = text.split_whitespace().count();
        let completeness = self.completeness(text, word_count);
        let coherence = coherence(text);
        let noise_level = noise_level(text);

        let QualityWeights {
            completeness: wc,
            coherence: wh,
            cleanliness: wn,
        } = self.config.weights;
        let total = wc + wh + wn;
        let score = (wc * completeness + wh * coherence + wn * (1.0 - noise_level)) / total;

        QualityMetrics {
            completeness,
            coherence,
            noise_level,
            word_count,
            score: score.clamp(0.0, 1.0),
        }
    }

    fn completeness(&self, text: &str, word_count: usize) -> f64 {
        let length = (word_count as f64 / self.config.expected_words.max(1) as f64).min(1.0);
        let termination = termination_score(text, self.config.min_fragment_words);
        (0.5 * length + 0.5 * termination).clamp(0.0, 1.0)
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | ']' | '»' | '”' | '’')
}

/// 1.0 for a finished sentence, 0.5 for an ellipsis or short tail, 0.0 for a truncation.
fn termination_score(text: &str, min_fragment_words: usize) -> f64 {
    let trimmed = text.trim_end().trim_end_matches(is_closing);
    if trimmed.ends_with("...") || trimmed.ends_with('…') {
        return 0.5;
    }
    if trimmed.ends_with('-') {
        return 0.0;
    }
    if trimmed.ends_with(is_terminal) {
        return 1.0;
    }

    let fragment = match trimmed.rfind(is_terminal) {
        Some(index) => &trimmed[index + 1..],
        None => trimmed,
    };
    if fragment.split_whitespace().count() >= min_fragment_words {
        0.0
    } else {
        0.5
    }
}

fn coherence(text: &str) -> f64 {
    let casing = casing_irregularity(text);
    let whitespace = whitespace_irregularity(text);
    let register = register_changes(text);
    let penalty = CASING_PENALTY_WEIGHT * casing
        + WHITESPACE_PENALTY_WEIGHT * whitespace
        + REGISTER_PENALTY_WEIGHT * register;
    (1.0 - penalty).clamp(0.0, 1.0)
}

/// Share of alphabetic words whose casing is neither lower, Capitalized, nor UPPER.
fn casing_irregularity(text: &str) -> f64 {
    let mut words = 0usize;
    let mut irregular = 0usize;
    for word in text.split_whitespace() {
        let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() < 2 {
            continue;
        }
        words += 1;
        let tail_upper = letters[1..].iter().filter(|c| c.is_uppercase()).count();
        let tail_lower = letters[1..].iter().filter(|c| c.is_lowercase()).count();
        let mixed_tail = tail_upper > 0 && tail_lower > 0;
        let lower_then_upper = letters[0].is_lowercase() && tail_upper > 0;
        if mixed_tail || lower_then_upper {
            irregular += 1;
        }
    }
    if words == 0 {
        return 0.0;
    }
    (irregular as f64 / words as f64 * 2.0).min(1.0)
}

/// Inner whitespace runs plus off-modal indentation, relative to gaps and lines.
fn whitespace_irregularity(text: &str) -> f64 {
    let lines: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return 0.0;
    }

    let mut gaps = 0usize;
    let mut runs = 0usize;
    let mut indents = Vec::with_capacity(lines.len());
    for line in &lines {
        let body = line.trim();
        indents.push(line.len() - line.trim_start().len());
        let mut run = 0usize;
        for c in body.chars() {
            if c == ' ' || c == '\t' {
                run += 1;
            } else {
                if run > 0 {
                    gaps += 1;
                    runs += usize::from(run > 1);
                }
                run = 0;
            }
        }
    }

    let modal_indent = modal(&indents);
    let off_indent = indents
        .iter()
        .filter(|indent| **indent != modal_indent)
        .count();

    let denominator = (gaps + lines.len()) as f64;
    ((runs + off_indent) as f64 / denominator * 2.0).min(1.0)
}

fn modal(values: &[usize]) -> usize {
    let mut counts: Vec<(usize, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(candidate, _)| candidate == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((*value, 1)),
        }
    }
    // Ties resolve to the smallest indentation.
    counts
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then_with(|| vb.cmp(va)))
        .map(|(value, _)| value)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Register {
    Shouting,
    Sentence,
    Lowercase,
}

fn register_of(line: &str) -> Option<Register> {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 3 {
        return None;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    if upper as f64 / letters.len() as f64 >= 0.6 {
        return Some(Register::Shouting);
    }
    if letters[0].is_lowercase() {
        Some(Register::Lowercase)
    } else {
        Some(Register::Sentence)
    }
}

/// Fraction of consecutive line pairs whose register differs.
fn register_changes(text: &str) -> f64 {
    let registers: Vec<Register> = text.lines().filter_map(register_of).collect();
    if registers.len() < 2 {
        return 0.0;
    }
    let changes = registers
        .windows(2)
        .filter(|pair| pair[0] != pair[1])
        .count();
    changes as f64 / (registers.len() - 1) as f64
}

fn is_standard_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"' | '-' | '(' | ')' | '…' | '’' | '“' | '”'
    )
}

/// Share of non-whitespace characters that are neither alphabetic nor standard punctuation.
fn noise_level(text: &str) -> f64 {
    let mut total = 0usize;
    let mut noisy = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if !(c.is_alphabetic() || is_standard_punctuation(c)) {
            noisy += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        noisy as f64 / total as f64
    }
}
