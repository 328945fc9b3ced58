use crate::cache::ProfileCache;
use crate::config::Config;
use crate::domain::{CandidateFact, Profile, ResolutionRequest, SubjectHint};
use crate::error::{ProviderError, ResolveError, Result};
use crate::matcher::IdentityMatcher;
use crate::merge::ProfileMerger;
use crate::optout::OptOutScanner;
use crate::providers::{build_providers, ProviderAdapter};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Coordinates one resolution end to end: cache check, concurrent provider
/// fan-out with bounded retries, opt-out filtering, scoring, merging, and the
/// write-through back to the cache.
///
/// Cancellation: the fan-out runs in a `JoinSet`, so dropping a resolution
/// future aborts outstanding provider calls without recording failures or
/// charging further retries against their quotas.
pub struct Resolver {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    matcher: IdentityMatcher,
    merger: ProfileMerger,
    scanner: OptOutScanner,
    cache: ProfileCache,
    request_timeout: Duration,
    retry_attempts: u32,
    retry_base: Duration,
    retry_cap: Duration,
    person_ttl: Duration,
    company_ttl: Duration,
}

impl Resolver {
    pub fn new(config: &Config) -> Self {
        let providers = build_providers(&config.providers);
        Self::with_providers(config, providers)
    }

    /// Construction seam for tests: inject mock adapters instead of the
    /// configured set.
    pub fn with_providers(config: &Config, providers: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        Self {
            providers,
            matcher: IdentityMatcher::new(config.matcher.clone()),
            merger: ProfileMerger::new(config.merge.clone()),
            scanner: OptOutScanner::new(&config.optout),
            cache: ProfileCache::new(),
            request_timeout: Duration::from_secs(config.resolver.request_timeout_secs),
            retry_attempts: config.resolver.retry_attempts,
            retry_base: Duration::from_millis(config.resolver.retry_base_ms),
            retry_cap: Duration::from_millis(config.resolver.retry_cap_ms),
            person_ttl: Duration::from_secs(config.cache.person_ttl_secs),
            company_ttl: Duration::from_secs(config.cache.company_ttl_secs),
        }
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn resolve(&self, request: ResolutionRequest) -> Result<Profile> {
        request.subject.validate()?;

        let cache_key = request.cache_key();
        if let Some(profile) = self.cache.get(&cache_key) {
            debug!("Cache hit, skipping provider dispatch");
            return Ok(profile);
        }

        info!(
            subject = %request.subject.normalized_key(),
            providers = self.providers.len(),
            "Dispatching resolution to providers"
        );
        let (facts, any_succeeded) = self.dispatch(&request).await;
        if !any_succeeded {
            counter!("resolutions_failed_total").increment(1);
            return Err(ResolveError::AllProvidersFailed);
        }

        // A subject-declared refusal on any candidate ends the resolution;
        // this outcome is distinct from "nothing found"
        if facts.iter().any(|f| self.scanner.candidate_opts_out(f)) {
            warn!(subject = %request.subject.normalized_key(), "Subject has opted out");
            counter!("resolutions_opted_out_total").increment(1);
            let profile = Profile::opted_out(request.subject.clone());
            self.cache
                .put(&cache_key, profile.clone(), self.ttl_for(&request.subject));
            return Ok(profile);
        }

        let scored = self.matcher.score_all(&request, facts);
        let profile = self.merger.merge(&request, &scored);
        info!(
            fields = profile.fields.len(),
            "Resolution complete, writing profile through to cache"
        );
        self.cache
            .put(&cache_key, profile.clone(), self.ttl_for(&request.subject));
        Ok(profile)
    }

    /// Fan out to all applicable adapters concurrently under the request
    /// timeout. Returns the gathered facts and whether at least one adapter
    /// succeeded. Only adapters that apply to the subject count: a company
    /// request must not look successful just because person-only adapters
    /// declined it without searching anything.
    async fn dispatch(&self, request: &ResolutionRequest) -> (Vec<CandidateFact>, bool) {
        let mut join_set = JoinSet::new();
        for provider in &self.providers {
            if !provider.applies_to(request) {
                debug!(
                    provider = provider.provider_id(),
                    "Adapter does not apply to this subject, skipping"
                );
                continue;
            }
            let provider = Arc::clone(provider);
            let request = request.clone();
            let timeout = self.request_timeout;
            let attempts = self.retry_attempts;
            let base = self.retry_base;
            let cap = self.retry_cap;
            join_set.spawn(async move {
                let id = provider.provider_id();
                let outcome = tokio::time::timeout(
                    timeout,
                    query_with_retry(provider, &request, attempts, base, cap),
                )
                .await
                .unwrap_or_else(|_| {
                    Err(ProviderError::Transient(format!(
                        "{id} timed out after {timeout:?}"
                    )))
                });
                (id, outcome)
            });
        }

        let mut facts = Vec::new();
        let mut any_succeeded = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((id, Ok(provider_facts))) => {
                    debug!(provider = id, count = provider_facts.len(), "Provider answered");
                    any_succeeded = true;
                    facts.extend(provider_facts);
                }
                Ok((id, Err(e))) => {
                    // one provider failing never aborts the others
                    warn!(provider = id, error = %e, "Provider failed, continuing without it");
                    counter!("provider_failures_total", "provider" => id.to_string())
                        .increment(1);
                }
                Err(e) => warn!(error = %e, "Provider task panicked"),
            }
        }
        (facts, any_succeeded)
    }

    fn ttl_for(&self, subject: &SubjectHint) -> Duration {
        match subject {
            SubjectHint::Person { .. } => self.person_ttl,
            SubjectHint::Company { .. } => self.company_ttl,
        }
    }
}

/// Retry transient failures with capped exponential backoff; permanent
/// failures propagate immediately.
async fn query_with_retry(
    provider: Arc<dyn ProviderAdapter>,
    request: &ResolutionRequest,
    attempts: u32,
    base: Duration,
    cap: Duration,
) -> std::result::Result<Vec<CandidateFact>, ProviderError> {
    let mut attempt = 0;
    loop {
        match provider.query(request).await {
            Ok(facts) => return Ok(facts),
            Err(e) if e.is_transient() && attempt < attempts => {
                let backoff = base
                    .checked_mul(1 << attempt.min(16))
                    .map(|d| d.min(cap))
                    .unwrap_or(cap);
                debug!(
                    provider = provider.provider_id(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient provider failure, backing off before retry"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
