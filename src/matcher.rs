use crate::config::MatcherConfig;
use crate::domain::{normalize_text, CandidateFact, ResolutionRequest, ScoredCandidate};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Decides whether each candidate fact's originating document is actually
/// about the queried subject, and assigns a confidence score per fact.
///
/// Four bounded signals contribute to the score: name similarity, email
/// domain to candidate domain match, photo corroboration, and cross-source
/// corroboration. The sum saturates at 1.0. A provider-reported confidence
/// acts as a floor for facts derived deterministically from the hint itself
/// (an avatar hashed from the email, a whois answer for the queried domain),
/// which carry no name signal of their own.
pub struct IdentityMatcher {
    config: MatcherConfig,
}

impl IdentityMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn score_all(
        &self,
        request: &ResolutionRequest,
        facts: Vec<CandidateFact>,
    ) -> Vec<ScoredCandidate> {
        // Corroboration index: (field, normalized value) -> distinct providers
        let mut assertions: HashMap<(String, String), BTreeSet<String>> = HashMap::new();
        for fact in &facts {
            assertions
                .entry((fact.field.to_string(), normalize_text(&fact.value)))
                .or_default()
                .insert(fact.provider.clone());
        }

        // Photo evidence index: image URLs and the providers that surfaced them
        let mut image_sources: HashMap<String, HashSet<String>> = HashMap::new();
        for fact in &facts {
            if let Some(url) = &fact.identity.image_url {
                image_sources
                    .entry(url.clone())
                    .or_default()
                    .insert(fact.provider.clone());
            }
        }

        facts
            .into_iter()
            .map(|fact| {
                let corroborators = assertions
                    .get(&(fact.field.to_string(), normalize_text(&fact.value)))
                    .cloned()
                    .unwrap_or_default();
                let score = self.score(request, &fact, &corroborators, &image_sources);
                let same_subject = score >= self.config.accept_threshold;
                if !same_subject {
                    debug!(
                        provider = %fact.provider,
                        field = %fact.field,
                        score,
                        "Rejected candidate below accept threshold"
                    );
                }
                ScoredCandidate {
                    fact,
                    score,
                    same_subject,
                    corroborators,
                }
            })
            .collect()
    }

    fn score(
        &self,
        request: &ResolutionRequest,
        fact: &CandidateFact,
        corroborators: &BTreeSet<String>,
        image_sources: &HashMap<String, HashSet<String>>,
    ) -> f64 {
        let mut score = 0.0;

        if let (Some(hint_name), Some(candidate_name)) =
            (request.subject.full_name(), fact.identity.name.as_deref())
        {
            score += self.config.name_weight * name_similarity(hint_name, candidate_name);
        }

        if let (Some(subject_domain), Some(candidate_domain)) =
            (request.subject.domain(), fact.identity.domain.as_deref())
        {
            if subject_domain.eq_ignore_ascii_case(candidate_domain) {
                score += self.config.domain_weight;
            }
        }

        // Photo corroboration: the candidate's portrait also surfaced from
        // at least one independent provider for this subject
        if let Some(image_url) = &fact.identity.image_url {
            let independent = image_sources
                .get(image_url)
                .map(|sources| sources.iter().any(|s| s != &fact.provider))
                .unwrap_or(false);
            if independent {
                score += self.config.photo_weight;
            }
        }

        if corroborators.len() >= 2 {
            score += self.config.corroboration_weight;
        }

        // Deterministically derived facts carry their own floor
        if let Some(reported) = fact.reported_confidence {
            score = score.max(reported.clamp(0.0, 1.0));
        }

        score.min(1.0)
    }
}

/// Token-set similarity between two names; exact normalized equality is 1.0.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let tokens_a: HashSet<&str> = a.split_whitespace().collect();
    let tokens_b: HashSet<&str> = b.split_whitespace().collect();
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}
