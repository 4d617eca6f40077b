//! Per-page reconciliation of results reported by several processors.
//!
//! Merging runs in a fixed sequence:
//!
//! 1. results for other pages are dropped (and logged);
//! 2. a lone result passes through untouched;
//! 3. the confidence gate removes sources below `min_confidence`;
//! 4. surviving texts are clustered into segments of near-duplicates, visited in
//!    descending confidence;
//! 5. segments are ordered spatially when every segment carries boxes, otherwise by
//!    processor priority, and joined with a blank line;
//! 6. bounding boxes and metadata are reconciled across every contributing source.
//!
//! The merger holds no state between calls, so merging the same input twice yields the
//! same output.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::boxes::{reading_order, reconcile_boxes};
use super::quality::QualityScorer;
use super::similarity::{is_near_duplicate, normalize_whitespace};
use super::types::{
    BoundingBox, ConfigurationError, ExtractionResult, MalformedResult, MergeError,
    MergeStrategy, MergedResult, Metadata, ProcessorType, RawExtraction, clamp_confidence,
    ensure_unit_interval,
};

const SEGMENT_SEPARATOR: &str = "\n\n";

/// Tunable merge heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergerConfig {
    /// Sources scoring below this are excluded from multi-source merges.
    pub min_confidence: f64,
    /// Similarity at or above which two texts are considered the same content.
    pub similarity_threshold: f64,
    /// IoU at or above which boxes from different sources are merged.
    pub overlap_threshold: f64,
    /// Share of the gate score taken from the quality scorer instead of confidence.
    pub quality_weight: f64,
    /// Dissimilar texts shorter than this (after normalization) are treated as noise.
    pub min_complementary_chars: usize,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            similarity_threshold: 0.85,
            overlap_threshold: 0.5,
            quality_weight: 0.0,
            min_complementary_chars: 3,
        }
    }
}

impl MergerConfig {
    /// Reject thresholds outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        ensure_unit_interval("min_confidence", self.min_confidence)?;
        ensure_unit_interval("similarity_threshold", self.similarity_threshold)?;
        ensure_unit_interval("overlap_threshold", self.overlap_threshold)?;
        ensure_unit_interval("quality_weight", self.quality_weight)?;
        Ok(())
    }
}

/// Stateless reconciler for per-page extraction results.
#[derive(Debug, Clone)]
pub struct Merger {
    config: MergerConfig,
    scorer: QualityScorer,
}

/// Pages merged by [`Merger::merge_all`], with the pages that could not be merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeBatch {
    /// One result per merged page, ascending by page number.
    pub merged: Vec<MergedResult>,
    /// Pages without a merged result, keyed by page number.
    pub failures: BTreeMap<u32, MergeError>,
}

#[derive(Debug)]
struct Segment {
    /// Indices into the ranked source list; the first member is the best read.
    members: Vec<usize>,
    text: String,
    confidence: f64,
    priority: u8,
}

impl Segment {
    fn open(index: usize, result: &ExtractionResult) -> Self {
        Self {
            members: vec![index],
            text: result.text_content.clone(),
            confidence: result.confidence_score,
            priority: result.processor_type.priority(),
        }
    }
}

impl Merger {
    /// Build a merger after validating its configuration.
    pub fn new(config: MergerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            config,
            scorer: QualityScorer::default(),
        })
    }

    /// Use `scorer` when blending quality into the confidence gate.
    pub fn with_quality_scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    /// Validate an untrusted payload for `page_number`.
    pub fn ingest(
        raw: RawExtraction,
        page_number: u32,
        fallback_type: ProcessorType,
    ) -> Result<ExtractionResult, MalformedResult> {
        raw.validate(page_number, fallback_type)
    }

    /// Merge every page in `pages`; pages with an empty list are reported as failures.
    pub fn merge_all(&self, pages: &BTreeMap<u32, Vec<ExtractionResult>>) -> MergeBatch {
        let mut batch = MergeBatch::default();
        for (page_number, results) in pages {
            match self.merge_page(*page_number, results) {
                Ok(merged) => batch.merged.push(merged),
                Err(error) => {
                    batch.failures.insert(*page_number, error);
                }
            }
        }
        batch
    }

    /// Reconcile the results reported for one page.
    pub fn merge_page(
        &self,
        page_number: u32,
        results: &[ExtractionResult],
    ) -> Result<MergedResult, MergeError> {
        let on_page: Vec<ExtractionResult> = results
            .iter()
            .filter(|result| {
                let matches = result.page_number == page_number;
                if !matches {
                    tracing::warn!(
                        page = page_number,
                        reported_page = result.page_number,
                        processor = %result.processor_type,
                        "Dropping result reported for another page"
                    );
                }
                matches
            })
            .map(|result| {
                let mut result = result.clone();
                result.confidence_score = clamp_confidence(result.confidence_score);
                result
            })
            .collect();
        let considered = on_page.len();

        match on_page.as_slice() {
            [] => {
                return Err(MergeError::NoViableSource {
                    page_number,
                    considered: 0,
                    excluded: 0,
                });
            }
            [only] => return Ok(MergedResult::from_single(only.clone())),
            _ => {}
        }

        let mut viable: Vec<(usize, &ExtractionResult)> = on_page
            .iter()
            .enumerate()
            .filter(|(_, result)| self.gate_score(result) >= self.config.min_confidence)
            .collect();
        let excluded = considered - viable.len();
        if viable.is_empty() {
            tracing::debug!(
                page = page_number,
                considered,
                "Every source fell below the confidence gate"
            );
            return Err(MergeError::NoViableSource {
                page_number,
                considered,
                excluded,
            });
        }

        if viable
            .iter()
            .any(|(_, result)| !result.text_content.trim().is_empty())
        {
            viable.retain(|(_, result)| !result.text_content.trim().is_empty());
        }

        viable.sort_by(|(left_index, left), (right_index, right)| {
            rank(left, right).then(left_index.cmp(right_index))
        });
        let ranked: Vec<&ExtractionResult> =
            viable.into_iter().map(|(_, result)| result).collect();

        if let [only] = ranked.as_slice() {
            return Ok(MergedResult::from_single((*only).clone()));
        }

        let (segments, noise) = self.cluster(&ranked);
        let merged = self.assemble(page_number, &ranked, segments, &noise);
        tracing::debug!(
            page = page_number,
            considered,
            excluded,
            strategy = ?merged.strategy,
            confidence = merged.confidence_score,
            "Merged page"
        );
        Ok(merged)
    }

    fn gate_score(&self, result: &ExtractionResult) -> f64 {
        let weight = self.config.quality_weight;
        if weight <= 0.0 {
            return result.confidence_score;
        }
        (1.0 - weight) * result.confidence_score + weight * self.scorer.score(result)
    }

    /// Group ranked texts into segments of near-duplicates.
    ///
    /// The best read of non-trivial length seeds the first segment, so a tiny text can only
    /// seed when every text is tiny. Other tiny texts that match no segment are noise.
    fn cluster(&self, ranked: &[&ExtractionResult]) -> (Vec<Segment>, Vec<usize>) {
        let trivial = |result: &ExtractionResult| {
            normalize_whitespace(&result.text_content).chars().count()
                < self.config.min_complementary_chars
        };
        let seed = ranked
            .iter()
            .position(|result| !trivial(*result))
            .unwrap_or(0);

        let mut segments = vec![Segment::open(seed, ranked[seed])];
        let mut noise = Vec::new();
        for (index, &result) in ranked.iter().enumerate() {
            if index == seed {
                continue;
            }
            let joined = segments.iter_mut().find(|segment| {
                is_near_duplicate(
                    &segment.text,
                    &result.text_content,
                    self.config.similarity_threshold,
                )
            });
            if let Some(segment) = joined {
                segment.members.push(index);
                segment.confidence = segment.confidence.max(result.confidence_score);
                segment.priority = segment.priority.min(result.processor_type.priority());
            } else if trivial(result) {
                noise.push(index);
            } else {
                segments.push(Segment::open(index, result));
            }
        }

        (segments, noise)
    }

    fn assemble(
        &self,
        page_number: u32,
        ranked: &[&ExtractionResult],
        mut segments: Vec<Segment>,
        noise: &[usize],
    ) -> MergedResult {
        let strategy = if segments.len() == 1 {
            MergeStrategy::NearDuplicate
        } else {
            MergeStrategy::Complementary
        };

        // The seed segment holds the lowest member index of any segment.
        let primary = segments
            .iter()
            .map(|segment| segment.members[0])
            .min()
            .unwrap_or(0);

        let anchors: Vec<Option<BoundingBox>> = segments
            .iter()
            .map(|segment| segment_anchor(ranked, segment))
            .collect();
        if anchors.iter().all(Option::is_some) {
            let mut keyed: Vec<(Option<BoundingBox>, Segment)> =
                anchors.into_iter().zip(segments).collect();
            keyed.sort_by(|(left, _), (right, _)| match (left, right) {
                (Some(left), Some(right)) => reading_order(left, right),
                _ => Ordering::Equal,
            });
            segments = keyed.into_iter().map(|(_, segment)| segment).collect();
        } else {
            segments.sort_by_key(|segment| segment.priority);
        }

        let confidence_score = match strategy {
            MergeStrategy::Complementary => length_weighted_confidence(&segments),
            _ => segments
                .iter()
                .map(|segment| segment.confidence)
                .fold(0.0, f64::max),
        };
        let text_content = segments
            .iter()
            .map(|segment| segment.text.as_str())
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR);

        // Every contributor, noise included, in ranked order.
        let mut contributors: Vec<usize> = segments
            .iter()
            .flat_map(|segment| segment.members.iter().copied())
            .chain(noise.iter().copied())
            .collect();
        contributors.sort_unstable();

        let box_sources: Vec<&[BoundingBox]> = contributors
            .iter()
            .filter_map(|index| ranked[*index].bounding_boxes.as_deref())
            .collect();
        let bounding_boxes = if box_sources.is_empty() {
            None
        } else {
            Some(reconcile_boxes(&box_sources, self.config.overlap_threshold))
        };

        let merged_metadata = union_metadata(contributors.iter().map(|index| ranked[*index]));

        MergedResult {
            processor_type: ranked[primary].processor_type,
            page_number,
            text_content,
            confidence_score,
            merged_metadata,
            bounding_boxes,
            source_count: contributors.len(),
            sources: contributors
                .iter()
                .map(|index| ranked[*index].processor_type)
                .collect(),
            strategy,
        }
    }
}

/// Highest confidence first, then processor priority.
fn rank(left: &ExtractionResult, right: &ExtractionResult) -> Ordering {
    right
        .confidence_score
        .total_cmp(&left.confidence_score)
        .then_with(|| {
            left.processor_type
                .priority()
                .cmp(&right.processor_type.priority())
        })
}

/// Top-most, then left-most box of any member of the segment.
fn segment_anchor(ranked: &[&ExtractionResult], segment: &Segment) -> Option<BoundingBox> {
    segment
        .members
        .iter()
        .filter_map(|index| ranked[*index].bounding_boxes.as_deref())
        .flatten()
        .copied()
        .min_by(reading_order)
}

fn length_weighted_confidence(segments: &[Segment]) -> f64 {
    let mut weighted = 0.0;
    let mut total = 0usize;
    for segment in segments {
        let length = segment.text.chars().count();
        weighted += segment.confidence * length as f64;
        total += length;
    }
    if total == 0 {
        segments
            .iter()
            .map(|segment| segment.confidence)
            .fold(0.0, f64::max)
    } else {
        (weighted / total as f64).clamp(0.0, 1.0)
    }
}

/// Union of metadata, earlier sources winning; losing values move to `key@processor_type`.
fn union_metadata<'a>(sources: impl Iterator<Item = &'a ExtractionResult>) -> Metadata {
    let mut merged = Metadata::new();
    for source in sources {
        for (key, value) in &source.metadata {
            match merged.get(key) {
                None => {
                    merged.insert(key.clone(), value.clone());
                }
                Some(existing) if existing == value => {}
                Some(_) => {
                    let alternate = format!("{key}@{}", source.processor_type);
                    let mut candidate = alternate.clone();
                    let mut suffix = 2;
                    loop {
                        match merged.get(&candidate) {
                            None => {
                                merged.insert(candidate, value.clone());
                                break;
                            }
                            Some(existing) if existing == value => break,
                            Some(_) => {
                                candidate = format!("{alternate}#{suffix}");
                                suffix += 1;
                            }
                        }
                    }
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::quality::{QualityConfig, QualityWeights};
    use serde_json::json;

    fn merger() -> Merger {
        Merger::new(MergerConfig::default()).expect("default config is valid")
    }

    fn result(kind: ProcessorType, text: &str, confidence: f64) -> ExtractionResult {
        ExtractionResult::new(kind, 1, text, confidence)
    }

    #[test]
    fn single_source_is_identity() {
        let mut metadata = Metadata::new();
        metadata.insert("engine".into(), json!("tesseract"));
        let only = result(ProcessorType::Ocr, "  raw   text ", 0.2)
            .with_metadata(metadata.clone())
            .with_bounding_boxes(vec![BoundingBox::new(1.0, 2.0, 3.0, 4.0)]);

        let merged = merger().merge_page(1, &[only.clone()]).expect("merged");
        assert_eq!(merged.text_content, only.text_content);
        assert_eq!(merged.confidence_score, 0.2);
        assert_eq!(merged.merged_metadata, metadata);
        assert_eq!(merged.bounding_boxes, only.bounding_boxes);
        assert_eq!(merged.source_count, 1);
        assert_eq!(merged.strategy, MergeStrategy::SingleSource);
    }

    #[test]
    fn zero_sources_yield_no_result() {
        let error = merger().merge_page(4, &[]).unwrap_err();
        assert_eq!(
            error,
            MergeError::NoViableSource {
                page_number: 4,
                considered: 0,
                excluded: 0
            }
        );
    }

    #[test]
    fn ocr_slip_keeps_best_text_and_max_confidence() {
        let results = [
            result(
                ProcessorType::TextExtraction,
                "This is a test document.",
                0.9,
            ),
            result(ProcessorType::Ocr, "This is a test docment.", 0.7),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "This is a test document.");
        assert_eq!(merged.confidence_score, 0.9);
        assert_eq!(merged.strategy, MergeStrategy::NearDuplicate);
        assert_eq!(merged.source_count, 2);
    }

    #[test]
    fn overlapping_boxes_collapse_to_one() {
        let results = [
            result(ProcessorType::TextExtraction, "Boxed text", 0.9)
                .with_bounding_boxes(vec![BoundingBox::new(10.0, 10.0, 100.0, 50.0)]),
            result(ProcessorType::Ocr, "Boxed text", 0.8)
                .with_bounding_boxes(vec![BoundingBox::new(12.0, 11.0, 98.0, 48.0)]),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        let boxes = merged.bounding_boxes.expect("boxes");
        assert_eq!(boxes.len(), 1);
        assert!((10.0..=12.0).contains(&boxes[0].x));
    }

    #[test]
    fn all_sources_below_gate_fail_the_page() {
        let results = [
            result(ProcessorType::Ocr, "blurry", 0.3),
            result(ProcessorType::LayoutAnalysis, "blurrier", 0.2),
        ];
        let error = merger().merge_page(1, &results).unwrap_err();
        assert_eq!(
            error,
            MergeError::NoViableSource {
                page_number: 1,
                considered: 2,
                excluded: 2
            }
        );
    }

    #[test]
    fn gate_survivor_passes_through() {
        let results = [
            result(ProcessorType::Ocr, "kept text", 0.95),
            result(ProcessorType::LayoutAnalysis, "dropped", 0.1),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "kept text");
        assert_eq!(merged.source_count, 1);
    }

    #[test]
    fn complementary_text_follows_priority_without_boxes() {
        let results = [
            result(ProcessorType::Ocr, "First part of text.", 0.9),
            result(ProcessorType::TextExtraction, "Second part of text.", 0.8),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.strategy, MergeStrategy::Complementary);
        assert_eq!(
            merged.text_content,
            "Second part of text.\n\nFirst part of text."
        );
        let expected = (0.9 * 19.0 + 0.8 * 20.0) / 39.0;
        assert!((merged.confidence_score - expected).abs() < 1e-9);
        assert_eq!(merged.processor_type, ProcessorType::Ocr);
    }

    #[test]
    fn complementary_text_follows_reading_order_with_boxes() {
        let results = [
            result(ProcessorType::Ocr, "Header text here", 0.9)
                .with_bounding_boxes(vec![BoundingBox::new(0.0, 10.0, 200.0, 20.0)]),
            result(ProcessorType::TextExtraction, "Footer content line", 0.8)
                .with_bounding_boxes(vec![BoundingBox::new(0.0, 500.0, 200.0, 20.0)]),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(
            merged.text_content,
            "Header text here\n\nFooter content line"
        );
        assert_eq!(merged.bounding_boxes.map(|boxes| boxes.len()), Some(2));
    }

    #[test]
    fn empty_text_is_dropped_when_another_source_has_text() {
        let results = [
            result(ProcessorType::TextExtraction, "   ", 0.99),
            result(ProcessorType::Ocr, "Recovered by OCR.", 0.8),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "Recovered by OCR.");
        assert_eq!(merged.processor_type, ProcessorType::Ocr);
    }

    #[test]
    fn tiny_dissimilar_text_is_noise() {
        let results = [
            result(
                ProcessorType::TextExtraction,
                "A real paragraph of text.",
                0.9,
            ),
            result(ProcessorType::Ocr, "~", 0.8),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "A real paragraph of text.");
        assert_eq!(merged.strategy, MergeStrategy::NearDuplicate);
        assert_eq!(merged.source_count, 2);
    }

    #[test]
    fn tiny_text_ranked_first_does_not_seed_a_segment() {
        let results = [
            result(ProcessorType::Ocr, "~", 0.95),
            result(
                ProcessorType::TextExtraction,
                "A real paragraph of text.",
                0.9,
            ),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "A real paragraph of text.");
        assert_eq!(merged.strategy, MergeStrategy::NearDuplicate);
        assert_eq!(merged.confidence_score, 0.9);
        assert_eq!(merged.processor_type, ProcessorType::TextExtraction);
        assert_eq!(merged.source_count, 2);
    }

    #[test]
    fn all_tiny_texts_still_merge() {
        let results = [
            result(ProcessorType::TextExtraction, "ok", 0.9),
            result(ProcessorType::Ocr, "~", 0.8),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "ok");
        assert_eq!(merged.processor_type, ProcessorType::TextExtraction);
    }

    fn unclamped(kind: ProcessorType, text: &str, confidence: f64) -> ExtractionResult {
        ExtractionResult {
            processor_type: kind,
            page_number: 1,
            text_content: text.to_string(),
            confidence_score: confidence,
            metadata: Metadata::new(),
            bounding_boxes: None,
        }
    }

    #[test]
    fn out_of_range_confidence_is_clamped_on_entry() {
        let single = [unclamped(ProcessorType::Ocr, "Readable text.", 1.7)];
        let merged = merger().merge_page(1, &single).expect("merged");
        assert_eq!(merged.confidence_score, 1.0);

        let not_a_number = [unclamped(ProcessorType::Ocr, "Readable text.", f64::NAN)];
        let merged = merger().merge_page(1, &not_a_number).expect("merged");
        assert_eq!(merged.confidence_score, 0.0);
    }

    #[test]
    fn nan_confidence_counts_as_zero_in_the_gate() {
        let results = [
            unclamped(ProcessorType::TextExtraction, "Readable text.", 1.7),
            unclamped(ProcessorType::Ocr, "Other words entirely.", f64::NAN),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "Readable text.");
        assert_eq!(merged.confidence_score, 1.0);
        assert_eq!(merged.source_count, 1);
    }

    #[test]
    fn metadata_conflicts_keep_provenance() {
        let with = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(key, value)| (key.to_string(), json!(value)))
                .collect::<Metadata>()
        };
        let results = [
            result(ProcessorType::TextExtraction, "Same words here.", 0.9)
                .with_metadata(with(&[("engine", "native"), ("language", "en")])),
            result(ProcessorType::Ocr, "Same words here.", 0.85)
                .with_metadata(with(&[("engine", "tesseract"), ("language", "en")])),
            result(ProcessorType::Ocr, "Same words here", 0.8)
                .with_metadata(with(&[("engine", "easyocr")])),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        let metadata = merged.merged_metadata;
        assert_eq!(metadata["engine"], json!("native"));
        assert_eq!(metadata["engine@ocr"], json!("tesseract"));
        assert_eq!(metadata["engine@ocr#2"], json!("easyocr"));
        assert_eq!(metadata["language"], json!("en"));
        assert!(!metadata.contains_key("language@ocr"));
    }

    #[test]
    fn results_for_other_pages_are_ignored() {
        let results = [
            result(ProcessorType::TextExtraction, "Page one text.", 0.9),
            ExtractionResult::new(ProcessorType::Ocr, 2, "Page two text.", 0.9),
        ];
        let merged = merger().merge_page(1, &results).expect("merged");
        assert_eq!(merged.strategy, MergeStrategy::SingleSource);
        assert_eq!(merged.text_content, "Page one text.");
    }

    #[test]
    fn merging_is_deterministic() {
        let results = vec![
            result(ProcessorType::LayoutAnalysis, "Left column words.", 0.8),
            result(ProcessorType::Ocr, "Right column other words.", 0.8),
            result(ProcessorType::TextExtraction, "Left column words", 0.75),
        ];
        let mut pages = BTreeMap::new();
        pages.insert(1, results);
        let first = merger().merge_all(&pages);
        let second = merger().merge_all(&pages);
        assert_eq!(first, second);
        assert_eq!(first.merged.len(), 1);
    }

    #[test]
    fn quality_blend_can_rescue_or_exclude_sources() {
        let config = MergerConfig {
            quality_weight: 1.0,
            min_confidence: 0.5,
            ..MergerConfig::default()
        };
        let scorer = QualityScorer::new(QualityConfig {
            weights: QualityWeights {
                completeness: 0.0,
                coherence: 0.0,
                cleanliness: 1.0,
            },
            ..QualityConfig::default()
        })
        .expect("valid weights");
        let merger = Merger::new(config)
            .expect("valid")
            .with_quality_scorer(scorer);
        let results = [
            result(ProcessorType::Ocr, "Clean readable sentence.", 0.1),
            result(ProcessorType::LayoutAnalysis, "#$% 123 @@@ 456", 0.99),
        ];
        let merged = merger.merge_page(1, &results).expect("merged");
        assert_eq!(merged.text_content, "Clean readable sentence.");
        assert_eq!(merged.confidence_score, 0.1);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        let config = MergerConfig {
            similarity_threshold: 1.5,
            ..MergerConfig::default()
        };
        assert!(matches!(
            Merger::new(config),
            Err(ConfigurationError::ThresholdOutOfRange {
                name: "similarity_threshold",
                ..
            })
        ));
    }

    #[test]
    fn ingest_rejects_mismatched_pages() {
        let raw = RawExtraction {
            page_number: Some(3),
            text_content: Some("x".into()),
            ..RawExtraction::default()
        };
        assert_eq!(
            Merger::ingest(raw, 1, ProcessorType::Ocr),
            Err(MalformedResult::PageMismatch {
                expected: 1,
                actual: 3
            })
        );
    }
}
