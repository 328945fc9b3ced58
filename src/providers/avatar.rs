use crate::config::ProviderConfig;
use crate::domain::{CandidateFact, FieldName, IdentitySignals, ResolutionRequest};
use crate::error::ProviderError;
use crate::providers::{audit_outbound_call, ProviderAdapter, RateBudget};
use async_trait::async_trait;
use tracing::{debug, instrument};

pub const PROVIDER_ID: &str = "avatar";

const DEFAULT_BASE_URL: &str = "https://www.gravatar.com";

// 400x400 is the de facto profile picture size across networks, which keeps
// the URL comparable with image evidence from other providers
const AVATAR_SIZE: u32 = 400;

/// Deterministic avatar URL for an email address, hashed per the Gravatar
/// convention and verified with a `d=404` probe.
pub fn avatar_url(base_url: &str, email: &str) -> String {
    let digest = md5::compute(email.trim().to_lowercase().as_bytes());
    format!("{base_url}/avatar/{digest:x}?d=404&s={AVATAR_SIZE}")
}

/// Public-profile-picture adapter. The fact is derived from the queried email
/// itself, so it carries a high reported confidence rather than relying on
/// name signals it does not have.
pub struct AvatarProvider {
    client: reqwest::Client,
    budget: RateBudget,
    base_url: String,
}

impl AvatarProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            budget: RateBudget::new(
                PROVIDER_ID,
                config.requests_per_min,
                config.requests_per_day,
            ),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for AvatarProvider {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    // only persons have an email to hash
    fn applies_to(&self, request: &ResolutionRequest) -> bool {
        request.subject.email().is_some() && request.fields.contains(&FieldName::Image)
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn query(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<CandidateFact>, ProviderError> {
        let email = match request.subject.email() {
            Some(email) => email,
            None => return Ok(Vec::new()),
        };

        self.budget.try_acquire()?;
        audit_outbound_call(PROVIDER_ID, request);

        let url = avatar_url(&self.base_url, email);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!("No avatar registered for this email");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let message = format!("avatar probe returned {status}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ProviderError::Transient(message)
            } else {
                ProviderError::Permanent(message)
            });
        }

        let mut fact = CandidateFact::new(PROVIDER_ID, FieldName::Image, url.clone())
            .with_evidence(url.clone())
            .with_identity(IdentitySignals {
                domain: request.subject.domain().map(|d| d.to_string()),
                image_url: Some(url),
                ..Default::default()
            });
        fact.reported_confidence = Some(0.9);
        Ok(vec![fact])
    }
}
