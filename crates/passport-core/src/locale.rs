//! Language-code helpers.
//!
//! OCR engines take three-letter codes (`ara`, `eng`), detectors return
//! two-letter ones (`ar`, `en`). Comparisons go through [`primary_language`].

/// Code reported when a language cannot be determined.
pub const UNDETERMINED: &str = "und";

const THREE_TO_TWO: &[(&str, &str)] = &[
    ("ara", "ar"),
    ("ben", "bn"),
    ("chi", "zh"),
    ("chi_sim", "zh"),
    ("chi_tra", "zh"),
    ("deu", "de"),
    ("ell", "el"),
    ("eng", "en"),
    ("fas", "fa"),
    ("fil", "tl"),
    ("fra", "fr"),
    ("fre", "fr"),
    ("ger", "de"),
    ("heb", "he"),
    ("hin", "hi"),
    ("ind", "id"),
    ("ita", "it"),
    ("jpn", "ja"),
    ("kor", "ko"),
    ("msa", "ms"),
    ("per", "fa"),
    ("por", "pt"),
    ("rus", "ru"),
    ("spa", "es"),
    ("swa", "sw"),
    ("tha", "th"),
    ("tur", "tr"),
    ("ukr", "uk"),
    ("urd", "ur"),
    ("zho", "zh"),
];

/// Primary language subtag, lowercased, with common three-letter codes
/// folded to their two-letter form. `en-US` → `en`, `ara` → `ar`.
pub fn primary_language(code: &str) -> String {
    let lowered = code.trim().to_ascii_lowercase();
    if let Some((_, two)) = THREE_TO_TWO.iter().find(|(three, _)| *three == lowered) {
        return two.to_string();
    }
    let primary = lowered
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_string();
    THREE_TO_TWO
        .iter()
        .find(|(three, _)| *three == primary)
        .map(|(_, two)| two.to_string())
        .unwrap_or(primary)
}

pub fn is_undetermined(code: &str) -> bool {
    let trimmed = code.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNDETERMINED)
}

/// True when both codes name the same primary language.
pub fn same_language(a: &str, b: &str) -> bool {
    primary_language(a) == primary_language(b)
}
