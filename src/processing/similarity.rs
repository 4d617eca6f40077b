//! Text normalization and similarity helpers shared by the merger and chunker.

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a character survives chunk normalization.
///
/// Letters, digits, underscore, and standard sentence punctuation are kept.
pub(crate) fn is_allowed_char(c: char) -> bool {
    c.is_alphanumeric()
        || matches!(
            c,
            '_' | '.' | ',' | ';' | ':' | '!' | '?' | '\'' | '"' | '-' | '(' | ')'
        )
}

/// Split text into normalized words, stripping disallowed characters from each word.
///
/// Words that consist solely of disallowed characters are dropped, so the returned
/// sequence is exactly what the chunker counts and emits.
pub fn normalized_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|word| {
            let cleaned: String = word.chars().filter(|c| is_allowed_char(*c)).collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(cleaned)
            }
        })
        .collect()
}

/// Levenshtein distance over Unicode scalar values, using two rolling rows.
pub fn edit_distance(left: &str, right: &str) -> usize {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }

    let mut previous: Vec<usize> = (0..=right.len()).collect();
    let mut current = vec![0usize; right.len() + 1];

    for (i, lc) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, rc) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != rc);
            let deletion = previous[j + 1] + 1;
            let insertion = current[j] + 1;
            current[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[right.len()]
}

/// Similarity in `[0, 1]`: `1 - edit_distance / max_len` over whitespace-normalized text.
///
/// Two empty strings are identical (`1.0`).
pub fn similarity(left: &str, right: &str) -> f64 {
    let left = normalize_whitespace(left);
    let right = normalize_whitespace(right);
    normalized_similarity(&left, &right)
}

fn normalized_similarity(left: &str, right: &str) -> f64 {
    let left_len = left.chars().count();
    let right_len = right.chars().count();
    let longest = left_len.max(right_len);
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(left, right) as f64 / longest as f64
}

/// Whether two texts are the same content modulo minor character noise.
///
/// Texts match when one is a strict superstring of the other after whitespace
/// normalization, or when their similarity reaches `threshold`. The length ratio bounds
/// the best achievable similarity, so clearly divergent texts skip the quadratic
/// distance computation.
pub fn is_near_duplicate(left: &str, right: &str, threshold: f64) -> bool {
    let left = normalize_whitespace(left);
    let right = normalize_whitespace(right);
    if left.is_empty() || right.is_empty() {
        return left.is_empty() && right.is_empty();
    }
    if left == right || left.contains(right.as_str()) || right.contains(left.as_str()) {
        return true;
    }

    let left_len = left.chars().count();
    let right_len = right.chars().count();
    let upper_bound = left_len.min(right_len) as f64 / left_len.max(right_len) as f64;
    if upper_bound < threshold {
        return false;
    }

    normalized_similarity(&left, &right) >= threshold
}
