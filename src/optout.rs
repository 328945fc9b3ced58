use crate::config::{MarkerPolicy, OptOutConfig};
use crate::domain::CandidateFact;
use regex::Regex;

/// Detects a subject-declared enrichment refusal marker in public free text.
///
/// Whole-word matching treats the marker as a standalone token so that a bio
/// like "#optoutdoors" does not count as a refusal; substring matching is the
/// laxer policy for operators who prefer it.
pub struct OptOutScanner {
    marker: String,
    policy: MarkerPolicy,
    word_pattern: Option<Regex>,
}

impl OptOutScanner {
    pub fn new(config: &OptOutConfig) -> Self {
        let marker = config.marker.to_lowercase();
        let word_pattern = match config.policy {
            MarkerPolicy::WholeWord => {
                // \b does not sit next to '#', so use explicit boundaries;
                // adjacent punctuation still counts as standalone
                let pattern = format!(
                    r"(?i)(^|[\s.,;:!?(]){}($|[\s.,;:!?)])",
                    regex::escape(&marker)
                );
                Regex::new(&pattern).ok()
            }
            MarkerPolicy::Substring => None,
        };
        Self {
            marker,
            policy: config.policy,
            word_pattern,
        }
    }

    /// Whether the text carries the opt-out marker under the active policy.
    pub fn scan(&self, text: &str) -> bool {
        match self.policy {
            MarkerPolicy::Substring => text.to_lowercase().contains(&self.marker),
            MarkerPolicy::WholeWord => self
                .word_pattern
                .as_ref()
                .map(|re| re.is_match(text))
                .unwrap_or(false),
        }
    }

    /// Whether any free-text signal attached to this candidate opts out.
    pub fn candidate_opts_out(&self, fact: &CandidateFact) -> bool {
        fact.identity
            .bio
            .as_deref()
            .map(|bio| self.scan(bio))
            .unwrap_or(false)
    }
}
