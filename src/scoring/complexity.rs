use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::UpstreamError;
use crate::scoring::traits::ScoringModel;

/// Rationale tag the rubric reserves for a legitimate zero score.
pub const NO_SIGNALS_MARKER: &str = "NO_COMPLEXITY_SIGNALS";

pub const RUBRIC: &str = r#"You assess the technical complexity of a handmade Indian craft item.

Score from 0 to 10 using these factors:
1. Technical skill: simple (basic pottery, plain weaving) 1-3; moderate (painted pottery, embroidery) 4-6; advanced (filigree, inlay, meenakari) 7-10.
2. Time investment: a few hours +0, one or two days +1, weeks +2.
3. Detail and intricacy: basic patterns +0, moderate detail +1, highly intricate +2.
4. Special techniques: standard +0, traditional specialised +1, rare or difficult +2.

Reply with exactly two lines and nothing else:
SCORE: <number between 0 and 10>
RATIONALE: <comma-separated short tags naming the signals you used>

If the description contains no complexity signals at all, reply:
SCORE: 0
RATIONALE: NO_COMPLEXITY_SIGNALS"#;

/// Technique lexicon for the heuristic path. Each group counts once.
const TECHNIQUE_GROUPS: &[(&str, &[&str])] = &[
    ("hand-painted", &["hand painted", "hand-painted", "handpainted", "hand_painted"]),
    ("embroidery", &["embroidery", "embroidered"]),
    ("hand-stitched", &["hand stitched", "hand-stitched"]),
    ("filigree", &["filigree"]),
    ("inlay", &["inlay"]),
    ("damascene", &["damascene"]),
    ("meenakari", &["meenakari", "minakari"]),
    ("zardozi", &["zardozi"]),
    ("chikankari", &["chikankari"]),
    ("block-print", &["block print"]),
    ("tie-dye", &["tie dye", "tie-dye", "bandhani"]),
    ("kalamkari", &["kalamkari"]),
    ("warli", &["warli"]),
    ("madhubani", &["madhubani"]),
    ("pattachitra", &["pattachitra"]),
    ("carving", &["carved", "carving"]),
    ("intricate", &["intricate", "elaborate"]),
    ("detailed", &["detailed"]),
    ("multi-layered", &["multi-layered", "multi layered"]),
    ("multi-colored", &["multi-colored", "multicolored", "multi-coloured"]),
    ("geometric", &["geometric"]),
    ("peacock", &["peacock"]),
    ("lotus", &["lotus"]),
];

/// What came back from the scoring model, after parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    Parsed { score: f64, rationale: Vec<String> },
    Malformed { raw: String },
}

impl ModelReply {
    /// Expects a `SCORE:` line and an optional `RATIONALE:` line. A zero
    /// score only parses when the rationale carries `NO_SIGNALS_MARKER`.
    pub fn parse(raw: &str) -> Self {
        let malformed = || ModelReply::Malformed { raw: raw.to_string() };

        let mut score = None;
        let mut rationale = Vec::new();
        for line in raw.lines().map(str::trim) {
            if let Some(value) = strip_label(line, "score:") {
                let value = value.split('/').next().unwrap_or_default().trim();
                score = value.parse::<f64>().ok();
            } else if let Some(tags) = strip_label(line, "rationale:") {
                rationale = tags
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect();
            }
        }

        let Some(score) = score else {
            return malformed();
        };
        if !score.is_finite() || !(0.0..=10.0).contains(&score) {
            return malformed();
        }
        if score == 0.0 && !rationale.iter().any(|t| t.eq_ignore_ascii_case(NO_SIGNALS_MARKER)) {
            return malformed();
        }

        ModelReply::Parsed { score, rationale }
    }
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    head.eq_ignore_ascii_case(label).then(|| &line[label.len()..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexitySource {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplexityScore {
    pub value: f64,
    pub source: ComplexitySource,
    pub rationale: Vec<String>,
}

/// Count of distinct technique groups in `description`, scaled and capped at 10.
pub fn heuristic_score(description: &str, points_per_technique: f64) -> ComplexityScore {
    let text = description.to_lowercase();
    let matched: Vec<String> = TECHNIQUE_GROUPS
        .iter()
        .filter(|(_, variants)| variants.iter().any(|v| text.contains(v)))
        .map(|(name, _)| name.to_string())
        .collect();

    let value = (matched.len() as f64 * points_per_technique).clamp(0.0, 10.0);
    ComplexityScore {
        value,
        source: ComplexitySource::Heuristic,
        rationale: matched,
    }
}

pub struct ComplexityAssessor {
    model: Arc<dyn ScoringModel>,
    timeout: Duration,
    points_per_technique: f64,
}

impl ComplexityAssessor {
    pub fn new(model: Arc<dyn ScoringModel>, timeout: Duration, points_per_technique: f64) -> Self {
        Self {
            model,
            timeout,
            points_per_technique,
        }
    }

    async fn ask_model(&self, description: &str) -> ModelReply {
        let prompt = format!("Craft description:\n{description}");
        let call = self.model.complete(RUBRIC, &prompt);

        let reply = match tokio::time::timeout(self.timeout, call).await {
            Ok(reply) => reply,
            Err(_) => Err(UpstreamError::Timeout(self.timeout)),
        };

        match reply {
            Ok(text) => ModelReply::parse(&text),
            Err(err) => {
                warn!(model = self.model.name(), error = %err, "complexity model call failed");
                ModelReply::Malformed { raw: err.to_string() }
            }
        }
    }

    /// Model score when the reply parses; keyword heuristic otherwise.
    pub async fn score(&self, description: &str) -> ComplexityScore {
        match self.ask_model(description).await {
            ModelReply::Parsed { score, rationale } => {
                info!(score, ?rationale, "complexity scored by model");
                ComplexityScore {
                    value: score,
                    source: ComplexitySource::Model,
                    rationale,
                }
            }
            ModelReply::Malformed { raw } => {
                let fallback = heuristic_score(description, self.points_per_technique);
                debug!(
                    raw = %raw.chars().take(120).collect::<String>(),
                    value = fallback.value,
                    "unusable model reply, using heuristic complexity"
                );
                fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedModel {
        reply: Result<String, UpstreamError>,
        latency: Duration,
    }

    impl CannedModel {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                latency: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ScoringModel for CannedModel {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, UpstreamError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.reply.clone()
        }
    }

    fn assessor(model: CannedModel, timeout: Duration) -> ComplexityAssessor {
        ComplexityAssessor::new(Arc::new(model), timeout, 1.25)
    }

    #[test]
    fn parses_score_and_rationale() {
        let reply = ModelReply::parse("SCORE: 7.5\nRATIONALE: filigree, weeks of work");
        assert_eq!(
            reply,
            ModelReply::Parsed {
                score: 7.5,
                rationale: vec!["filigree".into(), "weeks of work".into()],
            }
        );

        let lenient = ModelReply::parse("  score: 8/10 \n");
        assert_eq!(lenient, ModelReply::Parsed { score: 8.0, rationale: vec![] });
    }

    #[test]
    fn rejects_unusable_replies() {
        for raw in [
            "",
            "about seven",
            "7.5",
            "SCORE: high",
            "SCORE: 11",
            "SCORE: -1",
            "SCORE: NaN",
            "SCORE: 0\nRATIONALE: simple",
            "SCORE: 0",
        ] {
            assert!(
                matches!(ModelReply::parse(raw), ModelReply::Malformed { .. }),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn zero_needs_the_no_signals_marker() {
        let reply = ModelReply::parse("SCORE: 0\nRATIONALE: NO_COMPLEXITY_SIGNALS");
        assert!(matches!(reply, ModelReply::Parsed { score, .. } if score == 0.0));
    }

    #[test]
    fn heuristic_counts_distinct_groups() {
        let score = heuristic_score(
            "Hand-painted blue pot, hand painted peacock and lotus with intricate detailed rim",
            1.25,
        );
        assert_eq!(score.source, ComplexitySource::Heuristic);
        assert_eq!(score.rationale, vec!["hand-painted", "intricate", "detailed", "peacock", "lotus"]);
        assert_eq!(score.value, 6.25);

        assert_eq!(heuristic_score("plain bowl", 1.25).value, 0.0);
    }

    #[test]
    fn heuristic_caps_at_ten() {
        let busy = "filigree inlay damascene meenakari zardozi chikankari kalamkari warli madhubani";
        assert_eq!(heuristic_score(busy, 1.25).value, 10.0);
    }

    #[tokio::test]
    async fn model_score_is_primary() {
        let scorer = assessor(CannedModel::replying("SCORE: 7\nRATIONALE: inlay"), Duration::from_secs(1));
        let score = scorer.score("silver inlay box").await;
        assert_eq!(score.value, 7.0);
        assert_eq!(score.source, ComplexitySource::Model);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back() {
        let scorer = assessor(CannedModel::replying("I'd say fairly complex!"), Duration::from_secs(1));
        let score = scorer.score("intricate filigree earrings").await;
        assert_eq!(score.source, ComplexitySource::Heuristic);
        assert_eq!(score.value, 2.5);
    }

    #[tokio::test]
    async fn timeout_falls_back() {
        let slow = CannedModel {
            reply: Ok("SCORE: 9".into()),
            latency: Duration::from_secs(5),
        };
        let scorer = assessor(slow, Duration::from_millis(10));
        let score = scorer.score("intricate filigree earrings").await;
        assert_eq!(score.source, ComplexitySource::Heuristic);
    }

    #[tokio::test]
    async fn transport_error_falls_back() {
        let broken = CannedModel {
            reply: Err(UpstreamError::transport("connection refused")),
            latency: Duration::ZERO,
        };
        let scorer = assessor(broken, Duration::from_secs(1));
        assert_eq!(scorer.score("warli wall art").await.source, ComplexitySource::Heuristic);
    }
}
