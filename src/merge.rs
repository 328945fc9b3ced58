use crate::config::MergeConfig;
use crate::domain::{FieldName, Profile, ResolutionRequest, ScoredCandidate};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

/// Ordering policy between two accepted candidates competing for one field.
/// `Greater` means `a` wins. Replaceable so test suites can substitute
/// deterministic orderings.
pub trait TieBreak: Send + Sync {
    fn compare(&self, a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering;
}

/// Default policy: higher score, then more distinct corroborating sources,
/// then most recently observed. Provider id is the final discriminator so the
/// ordering is total and merges stay deterministic.
pub struct DefaultTieBreak;

impl TieBreak for DefaultTieBreak {
    fn compare(&self, a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.corroborators.len().cmp(&b.corroborators.len()))
            .then_with(|| a.fact.observed_at.cmp(&b.fact.observed_at))
            .then_with(|| b.fact.provider.cmp(&a.fact.provider))
    }
}

/// Combines scored candidates into one output profile, field by field.
pub struct ProfileMerger {
    config: MergeConfig,
    tie_break: Box<dyn TieBreak>,
}

impl ProfileMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config,
            tie_break: Box::new(DefaultTieBreak),
        }
    }

    pub fn with_tie_break(config: MergeConfig, tie_break: Box<dyn TieBreak>) -> Self {
        Self { config, tie_break }
    }

    /// Select the winning candidate per requested field. Rejected candidates
    /// are dropped entirely, never surfaced as low-confidence noise; fields
    /// with no accepted candidate are omitted from the profile.
    pub fn merge(
        &self,
        request: &ResolutionRequest,
        candidates: &[ScoredCandidate],
    ) -> Profile {
        let mut profile = Profile::empty(request.subject.clone());

        let mut per_field: BTreeMap<FieldName, Vec<&ScoredCandidate>> = BTreeMap::new();
        for candidate in candidates {
            if !candidate.same_subject {
                continue;
            }
            if !request.fields.contains(&candidate.fact.field) {
                continue;
            }
            if candidate.fact.field == FieldName::Company
                && !self.company_domain_bound(request, candidate)
            {
                debug!(
                    provider = %candidate.fact.provider,
                    value = %candidate.fact.value,
                    "Dropping company candidate from a non-matching domain"
                );
                continue;
            }
            per_field.entry(candidate.fact.field).or_default().push(candidate);
        }

        for (field, mut contenders) in per_field {
            contenders.sort_by(|a, b| self.tie_break.compare(b, a));
            let winner = contenders[0];
            if winner.score < self.config.min_confidence {
                continue;
            }
            let corroborated_by: Vec<String> = winner
                .corroborators
                .iter()
                .filter(|p| *p != &winner.fact.provider)
                .cloned()
                .collect();
            profile.fields.insert(
                field,
                crate::domain::FieldValue {
                    value: winner.fact.value.clone(),
                    confidence: winner.score,
                    source: winner.fact.provider.clone(),
                    corroborated_by,
                },
            );
        }

        profile
    }

    /// The company field is strictly domain-bound: only candidates whose own
    /// domain matches the queried domain are eligible, regardless of score.
    fn company_domain_bound(
        &self,
        request: &ResolutionRequest,
        candidate: &ScoredCandidate,
    ) -> bool {
        match (request.subject.domain(), candidate.fact.identity.domain.as_deref()) {
            (Some(subject_domain), Some(candidate_domain)) => {
                subject_domain.eq_ignore_ascii_case(candidate_domain)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CandidateFact, IdentitySignals, ResolutionRequest};
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn request() -> ResolutionRequest {
        ResolutionRequest::for_person("jane@initech.com", "Jane Doe")
    }

    fn scored(
        provider: &str,
        field: FieldName,
        value: &str,
        score: f64,
        corroborators: &[&str],
    ) -> ScoredCandidate {
        let mut set: BTreeSet<String> = corroborators.iter().map(|s| s.to_string()).collect();
        set.insert(provider.to_string());
        ScoredCandidate {
            fact: CandidateFact::new(provider, field, value).with_identity(IdentitySignals {
                domain: Some("initech.com".to_string()),
                ..Default::default()
            }),
            score,
            same_subject: true,
            corroborators: set,
        }
    }

    fn merger() -> ProfileMerger {
        ProfileMerger::new(MergeConfig::default())
    }

    #[test]
    fn higher_score_wins() {
        let candidates = vec![
            scored("search", FieldName::JobTitle, "Manager", 0.65, &[]),
            scored("vision", FieldName::JobTitle, "Engineer", 0.85, &[]),
        ];
        let profile = merger().merge(&request(), &candidates);
        assert_eq!(profile.fields[&FieldName::JobTitle].value, "Engineer");
    }

    #[test]
    fn corroboration_breaks_score_ties() {
        let candidates = vec![
            scored("search", FieldName::JobTitle, "Manager", 0.8, &[]),
            scored("vision", FieldName::JobTitle, "Engineer", 0.8, &["search2"]),
        ];
        let profile = merger().merge(&request(), &candidates);
        let field = &profile.fields[&FieldName::JobTitle];
        assert_eq!(field.value, "Engineer");
        assert_eq!(field.corroborated_by, vec!["search2".to_string()]);
    }

    #[test]
    fn recency_breaks_remaining_ties() {
        let mut older = scored("search", FieldName::JobTitle, "Manager", 0.8, &[]);
        older.fact.observed_at = Utc::now() - Duration::hours(1);
        let newer = scored("vision", FieldName::JobTitle, "Engineer", 0.8, &[]);
        let profile = merger().merge(&request(), &[older, newer]);
        assert_eq!(profile.fields[&FieldName::JobTitle].value, "Engineer");
    }

    #[test]
    fn rejected_candidates_never_surface() {
        let mut rejected = scored("search", FieldName::JobTitle, "Engineer", 0.3, &[]);
        rejected.same_subject = false;
        let profile = merger().merge(&request(), &[rejected]);
        assert!(profile.fields.is_empty());
    }

    #[test]
    fn company_requires_matching_domain_even_with_top_score() {
        let mut foreign = scored("search", FieldName::Company, "Globex", 0.99, &[]);
        foreign.fact.identity.domain = Some("globex.com".to_string());
        let local = scored("whois", FieldName::Company, "Initech", 0.7, &[]);
        let profile = merger().merge(&request(), &[foreign, local]);
        assert_eq!(profile.fields[&FieldName::Company].value, "Initech");
    }

    #[test]
    fn merge_is_deterministic_across_input_orderings() {
        let a = scored("search", FieldName::JobTitle, "Engineer", 0.8, &[]);
        let b = scored("vision", FieldName::JobTitle, "Manager", 0.8, &[]);
        let forward = merger().merge(&request(), &[a.clone(), b.clone()]);
        let reversed = merger().merge(&request(), &[b, a]);
        assert_eq!(
            forward.fields[&FieldName::JobTitle],
            reversed.fields[&FieldName::JobTitle]
        );
    }

    #[test]
    fn unrequested_fields_are_ignored() {
        let narrow = ResolutionRequest::new(
            crate::domain::SubjectHint::person("jane@initech.com", "Jane Doe"),
            [FieldName::JobTitle].into_iter().collect(),
        );
        let candidates = vec![
            scored("search", FieldName::JobTitle, "Engineer", 0.8, &[]),
            scored("search", FieldName::Location, "Seattle", 0.8, &[]),
        ];
        let profile = merger().merge(&narrow, &candidates);
        assert!(profile.fields.contains_key(&FieldName::JobTitle));
        assert!(!profile.fields.contains_key(&FieldName::Location));
    }
}
