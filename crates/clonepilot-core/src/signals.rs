//! Signal Extractor — heuristic progress from free-form page text.
//!
//! A page snapshot is the `textContent` of every block element, in document
//! order. Rules are tried in sequence and the first one that recognises
//! something wins; there is no aggregation across matches.

use serde::{Deserialize, Serialize};

use crate::browser::Locator;

lazy_static::lazy_static! {
    static ref PERCENT_RE: regex::Regex = regex::Regex::new(r"(\d+)%").expect("valid regex");
}

/// Longest milestone message forwarded to the caller, in characters.
pub const MILESTONE_MAX_CHARS: usize = 100;

/// What one poll of the page revealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSignal {
    /// Trimmed text of the element the signal came from.
    pub text: String,
    /// `None` when only a milestone phrase was recognised.
    pub percent: Option<u8>,
}

impl ProgressSignal {
    /// Caller-facing message: `"<text> (<n>%)"` or just the text.
    pub fn message(&self) -> String {
        match self.percent {
            Some(p) => format!("{} ({}%)", self.text, p),
            None => self.text.clone(),
        }
    }
}

/// One extraction strategy.
pub trait SignalRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, blocks: &[String]) -> Option<ProgressSignal>;
}

/// First block containing `\d+%`.
pub struct PercentRule;

impl SignalRule for PercentRule {
    fn name(&self) -> &'static str {
        "percent"
    }

    fn extract(&self, blocks: &[String]) -> Option<ProgressSignal> {
        blocks.iter().find_map(|block| {
            let caps = PERCENT_RE.captures(block)?;
            let raw: u64 = caps.get(1)?.as_str().parse().unwrap_or(u64::MAX);
            Some(ProgressSignal {
                text: block.trim().to_string(),
                percent: Some(raw.min(100) as u8),
            })
        })
    }
}

/// First block containing any of a fixed set of phrases.
pub struct MilestoneRule {
    phrases: Vec<String>,
}

impl MilestoneRule {
    pub fn new(phrases: Vec<String>) -> Self {
        Self { phrases }
    }
}

impl SignalRule for MilestoneRule {
    fn name(&self) -> &'static str {
        "milestone"
    }

    fn extract(&self, blocks: &[String]) -> Option<ProgressSignal> {
        blocks.iter().find_map(|block| {
            self.phrases
                .iter()
                .any(|phrase| block.contains(phrase.as_str()))
                .then(|| ProgressSignal {
                    text: block.trim().chars().take(MILESTONE_MAX_CHARS).collect(),
                    percent: None,
                })
        })
    }
}

/// Ordered list of [`SignalRule`]s.
pub struct SignalExtractor {
    rules: Vec<Box<dyn SignalRule>>,
}

impl SignalExtractor {
    pub fn new(rules: Vec<Box<dyn SignalRule>>) -> Self {
        Self { rules }
    }

    /// Percentage first, then the given milestone phrases.
    pub fn with_milestones(phrases: Vec<String>) -> Self {
        Self::new(vec![
            Box::new(PercentRule),
            Box::new(MilestoneRule::new(phrases)),
        ])
    }

    pub fn push_rule(&mut self, rule: Box<dyn SignalRule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// `None` means "no signal": nothing is emitted for this poll.
    pub fn extract(&self, blocks: &[String]) -> Option<ProgressSignal> {
        self.rules.iter().find_map(|rule| rule.extract(blocks))
    }
}

/// Texts that mark specific points of the remote workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    pub edits_in_progress: String,
    pub content_loading: String,
    pub published_badge: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            edits_in_progress: "Making edits...".to_string(),
            content_loading: "Loading...".to_string(),
            published_badge: "LIVE!".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    EditsInProgress,
    ContentLoading,
    PublishedBadge,
}

impl Markers {
    pub fn text(&self, marker: Marker) -> &str {
        match marker {
            Marker::EditsInProgress => &self.edits_in_progress,
            Marker::ContentLoading => &self.content_loading,
            Marker::PublishedBadge => &self.published_badge,
        }
    }

    pub fn locator(&self, marker: Marker) -> Locator {
        Locator::text(self.text(marker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    fn extractor() -> SignalExtractor {
        SignalExtractor::with_milestones(vec![
            "Creating visual direction".to_string(),
            "Scanning page elements".to_string(),
        ])
    }

    #[test]
    fn test_percent_wins_and_first_match_is_used() {
        let snapshot = blocks(&[
            "Header",
            "  Scanning page elements: 31%  ",
            "Creating visual direction",
            "Other 99%",
        ]);
        let signal = extractor().extract(&snapshot).unwrap();
        assert_eq!(signal.percent, Some(31));
        assert_eq!(signal.text, "Scanning page elements: 31%");
        assert_eq!(signal.message(), "Scanning page elements: 31% (31%)");
    }

    #[test]
    fn test_milestone_without_percent() {
        let snapshot = blocks(&["Welcome", " Creating visual direction for your site "]);
        let signal = extractor().extract(&snapshot).unwrap();
        assert_eq!(signal.percent, None);
        assert_eq!(signal.message(), "Creating visual direction for your site");
    }

    #[test]
    fn test_milestone_text_is_capped() {
        let long = format!("Scanning page elements {}", "x".repeat(300));
        let signal = extractor().extract(&blocks(&[&long])).unwrap();
        assert_eq!(signal.text.chars().count(), MILESTONE_MAX_CHARS);
    }

    #[test]
    fn test_no_signal() {
        assert_eq!(extractor().extract(&blocks(&["Nothing here", ""])), None);
        assert_eq!(extractor().extract(&[]), None);
    }

    #[test]
    fn test_percent_is_clamped() {
        let signal = PercentRule.extract(&blocks(&["Done 250%"])).unwrap();
        assert_eq!(signal.percent, Some(100));
    }

    #[test]
    fn test_custom_rule_runs_after_builtins() {
        struct Always;
        impl SignalRule for Always {
            fn name(&self) -> &'static str {
                "always"
            }
            fn extract(&self, _: &[String]) -> Option<ProgressSignal> {
                Some(ProgressSignal {
                    text: "fallback".to_string(),
                    percent: None,
                })
            }
        }

        let mut extractor = extractor();
        extractor.push_rule(Box::new(Always));
        assert_eq!(extractor.rule_names(), vec!["percent", "milestone", "always"]);
        assert_eq!(extractor.extract(&blocks(&["plain"])).unwrap().text, "fallback");
        assert_eq!(extractor.extract(&blocks(&["at 5%"])).unwrap().percent, Some(5));
    }

    #[test]
    fn test_markers() {
        let markers = Markers::default();
        assert_eq!(markers.text(Marker::PublishedBadge), "LIVE!");
        assert_eq!(
            markers.locator(Marker::ContentLoading),
            Locator::text("Loading...")
        );
    }
}
