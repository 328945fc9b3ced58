pub mod avatar;
pub mod company;
pub mod name_split;
pub mod quota;
pub mod reverse_image;
pub mod web_search;
pub mod whois;

use crate::config::ProvidersConfig;
use crate::domain::{CandidateFact, ResolutionRequest};
use crate::error::ProviderError;
use async_trait::async_trait;
use metrics::counter;
use std::sync::Arc;
use tracing::info;

pub use quota::RateBudget;

/// Uniform interface over one external OSINT source. Adapters turn a
/// provider-specific response into candidate facts; they never decide whether
/// those facts belong to the subject (that is the matcher's job).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique identifier for this provider, recorded as fact provenance.
    fn provider_id(&self) -> &'static str;

    /// Whether this source can serve the given request at all. Adapters that
    /// only cover one subject kind or a subset of fields override this; the
    /// orchestrator skips inapplicable adapters entirely, so a declined
    /// request is never mistaken for a successful empty answer.
    fn applies_to(&self, _request: &ResolutionRequest) -> bool {
        true
    }

    /// Query the external source for the given request. An empty vec means
    /// the source was searched and had nothing to say, which is not an error.
    async fn query(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<CandidateFact>, ProviderError>;
}

/// Every outbound call may consume provider-side billing quota, so it is
/// logged and counted rather than silently issued.
pub fn audit_outbound_call(provider: &str, request: &ResolutionRequest) {
    info!(
        provider,
        request_id = %request.id,
        subject = %request.subject.normalized_key(),
        "Issuing outbound provider call"
    );
    counter!("provider_calls_total", "provider" => provider.to_string()).increment(1);
}

/// Build the configured adapter set. Providers form a closed set selected at
/// startup; there is no runtime discovery.
pub fn build_providers(config: &ProvidersConfig) -> Vec<Arc<dyn ProviderAdapter>> {
    let client = reqwest::Client::new();
    let mut providers: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    if config.profile_search.enabled {
        providers.push(Arc::new(web_search::ProfileSearchProvider::new(
            client.clone(),
            &config.profile_search,
        )));
    }
    if config.reverse_image.enabled {
        providers.push(Arc::new(reverse_image::ReverseImageProvider::new(
            client.clone(),
            &config.reverse_image,
        )));
    }
    if config.whois.enabled {
        providers.push(Arc::new(whois::WhoisProvider::new(
            client.clone(),
            &config.whois,
        )));
    }
    if config.company.enabled {
        providers.push(Arc::new(company::CompanyLookupProvider::new(
            client.clone(),
            &config.company,
        )));
    }
    if config.avatar.enabled {
        providers.push(Arc::new(avatar::AvatarProvider::new(
            client.clone(),
            &config.avatar,
        )));
    }
    if config.name_split.enabled {
        providers.push(Arc::new(name_split::NameSplitProvider::new()));
    }

    providers
}
