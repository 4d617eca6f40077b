//! Native text-layer extraction for form-feed paginated UTF-8 documents.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Document, PAGE_SEPARATOR, Processor, ProcessorFailure};
use crate::processing::{ExtractionResult, Metadata, ProcessorType};

/// Penalty factors for the native confidence heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeTextConfig {
    /// Pages shorter than this many characters are penalized.
    pub min_text_length: usize,
    /// Multiplier applied to short pages.
    pub short_text_penalty: f64,
    /// Pages with fewer words than this are penalized.
    pub min_word_count: usize,
    /// Multiplier applied to pages with few words.
    pub few_words_penalty: f64,
    /// Minimum share of alphabetic characters before a penalty applies.
    pub min_alpha_ratio: f64,
    /// Multiplier applied to symbol-heavy pages.
    pub low_alpha_penalty: f64,
    /// Floor for non-empty pages.
    pub min_confidence: f64,
}

impl Default for NativeTextConfig {
    fn default() -> Self {
        Self {
            min_text_length: 50,
            short_text_penalty: 0.5,
            min_word_count: 10,
            few_words_penalty: 0.7,
            min_alpha_ratio: 0.5,
            low_alpha_penalty: 0.8,
            min_confidence: 0.1,
        }
    }
}

/// Reads the embedded text layer of a document.
#[derive(Debug, Clone)]
pub struct NativeTextProcessor {
    name: String,
    config: NativeTextConfig,
}

impl Default for NativeTextProcessor {
    fn default() -> Self {
        Self::new(NativeTextConfig::default())
    }
}

impl NativeTextProcessor {
    /// Create a processor with the given heuristic.
    pub fn new(config: NativeTextConfig) -> Self {
        Self {
            name: "text_extractor".to_string(),
            config,
        }
    }

    /// Score how trustworthy an embedded text layer looks.
    pub fn confidence(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return 0.0;
        }
        let config = &self.config;
        let mut score = 1.0;

        let characters = text.chars().count();
        if characters < config.min_text_length {
            score *= config.short_text_penalty;
        }
        if text.split_whitespace().count() < config.min_word_count {
            score *= config.few_words_penalty;
        }
        let alphabetic = text.chars().filter(|c| c.is_alphabetic()).count();
        if (alphabetic as f64 / characters as f64) < config.min_alpha_ratio {
            score *= config.low_alpha_penalty;
        }

        score.clamp(config.min_confidence, 1.0)
    }
}

#[async_trait]
impl Processor for NativeTextProcessor {
    fn kind(&self) -> ProcessorType {
        ProcessorType::TextExtraction
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        document: &Document,
        page_number: u32,
    ) -> Result<ExtractionResult, ProcessorFailure> {
        let text = std::str::from_utf8(&document.bytes)
            .map_err(|err| ProcessorFailure::Decode(err.to_string()))?;
        let page = text
            .split(PAGE_SEPARATOR)
            .nth(page_number as usize)
            .filter(|_| page_number < document.page_count)
            .ok_or(ProcessorFailure::MissingPage(page_number))?;

        let confidence = self.confidence(page);
        let mut metadata = Metadata::new();
        metadata.insert("text_length".into(), json!(page.chars().count()));
        metadata.insert("word_count".into(), json!(page.split_whitespace().count()));
        metadata.insert("extraction_method".into(), json!("native_text"));

        tracing::debug!(
            document = %document.id,
            page = page_number,
            confidence,
            "Extracted native text"
        );

        let result = ExtractionResult::new(self.kind(), page_number, page, confidence);
        Ok(result.with_metadata(metadata))
    }
}
