//! Category detection and the human-readable parts of a recommendation.

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("pottery", &["pottery", "clay", "ceramic", "terracotta", " pot", "pot "]),
    ("embroidery", &["embroidery", "embroidered", "stitch", "needlework", "zardozi"]),
    ("jewelry", &["jewelry", "jewellery", "necklace", "earring", "bangle"]),
    ("textile", &["textile", "fabric", "cloth", "saree", "dupatta", "weaving"]),
    ("woodwork", &["wood", "carving", "carved"]),
    ("metalwork", &["metal", "brass", "copper", "silver", "gold", "filigree"]),
    ("painting", &["painting", "painted", "warli", "madhubani", "pattachitra"]),
    ("leather", &["leather", "hide"]),
];

/// First category whose keywords appear in the description, in catalogue order.
pub fn detect_category(description: &str) -> Option<&'static str> {
    let text = format!(" {} ", description.to_lowercase());
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(name, _)| *name)
}

pub fn success_probability(weighted_score: f64) -> f64 {
    (50.0 + weighted_score * 4.5).clamp(50.0, 95.0)
}

pub fn justification(heritage: f64, complexity: f64, market: f64) -> String {
    let mut parts = vec!["Suggested price based on:"];

    match heritage {
        h if h >= 7.0 => parts.push("High cultural/heritage significance."),
        h if h >= 4.0 => parts.push("Moderate cultural/heritage significance."),
        _ => {}
    }
    match complexity {
        c if c >= 7.0 => parts.push("High craft complexity and time investment."),
        c if c >= 4.0 => parts.push("Moderate craft complexity."),
        _ => {}
    }
    match market {
        m if m >= 7.0 => parts.push("High current market demand."),
        m if m >= 4.0 => parts.push("Moderate market demand."),
        _ => {}
    }

    if parts.len() == 1 {
        parts.push("Baseline artisan value.");
    }
    parts.join(" ")
}
