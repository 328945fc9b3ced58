use crate::config::ProviderConfig;
use crate::domain::{CandidateFact, FieldName, IdentitySignals, ResolutionRequest};
use crate::error::ProviderError;
use crate::providers::avatar::avatar_url;
use crate::providers::{audit_outbound_call, ProviderAdapter, RateBudget};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, instrument};

pub const PROVIDER_ID: &str = "reverse_image";

const DEFAULT_BASE_URL: &str = "https://vision.googleapis.com";
const AVATAR_BASE_URL: &str = "https://www.gravatar.com";
const MAX_RESULTS: u32 = 20;

/// Generic social-profile URL shape.
/// Hypotheses: TLD is at most 10 characters; the subdomain is www, mobile, a
/// two-char country code, or absent; some networks put a user-path segment
/// (in, people, add) before the handle, which may carry an @ prefix.
static SOCIAL_PROFILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https://((?P<subdomain>www|mobile|\w{2})\.)?(?P<network>\w+)\.(?P<tld>\w{2,10})(/(in|people|add))?/@?(?P<handle>\w+)$",
    )
    .unwrap()
});

/// Reverse-image search over the subject's avatar: pages embedding the very
/// same portrait are mined for social profile URLs.
pub struct ReverseImageProvider {
    client: reqwest::Client,
    budget: RateBudget,
    base_url: String,
    api_key: Option<String>,
}

impl ReverseImageProvider {
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
            api_key: config.api_key.clone(),
        }
    }

    fn facts_from_detection(
        &self,
        request: &ResolutionRequest,
        probed_image: &str,
        detection: &Value,
    ) -> Vec<CandidateFact> {
        let hint_name = request.subject.full_name().unwrap_or_default();
        let pages = detection["pagesWithMatchingImages"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut facts = Vec::new();
        for page in &pages {
            // partial matches are thumbnails and lookalikes, skip them
            let fully_matching = page["fullMatchingImages"]
                .as_array()
                .map(|a| !a.is_empty())
                .unwrap_or(false);
            if !fully_matching {
                continue;
            }
            let url = match page["url"].as_str() {
                Some(url) => url,
                None => continue,
            };
            let title = page["pageTitle"].as_str().unwrap_or_default();
            if !title_matches_name(hint_name, title) {
                debug!(url, title, "Page title does not carry the subject's name");
                continue;
            }
            if !SOCIAL_PROFILE_RE.is_match(url) {
                debug!(url, "Matching page is not a social profile");
                continue;
            }

            let mut fact = CandidateFact::new(PROVIDER_ID, FieldName::SameAs, url)
                .with_evidence(url)
                .with_identity(IdentitySignals {
                    name: Some(title.to_string()),
                    domain: request.subject.domain().map(|d| d.to_string()),
                    image_url: Some(probed_image.to_string()),
                    bio: Some(title.to_string()),
                });
            // same portrait plus the subject's name on the page is strong
            // joint evidence
            fact.reported_confidence = Some(0.75);
            facts.push(fact);
        }
        facts
    }
}

/// Every token of the queried name must appear in the page title.
fn title_matches_name(name: &str, title: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let title = crate::domain::normalize_text(title);
    crate::domain::normalize_text(name)
        .split_whitespace()
        .all(|token| title.split_whitespace().any(|t| t == token))
}

#[async_trait]
impl ProviderAdapter for ReverseImageProvider {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    // there is no portrait to pivot on for a company
    fn applies_to(&self, request: &ResolutionRequest) -> bool {
        request.subject.email().is_some() && request.fields.contains(&FieldName::SameAs)
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
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Permanent("reverse_image: missing api key".to_string())
        })?;

        self.budget.try_acquire()?;
        audit_outbound_call(PROVIDER_ID, request);

        let image = avatar_url(AVATAR_BASE_URL, email);
        let url = format!("{}/v1/images:annotate?key={}", self.base_url, api_key);
        let body = json!({
            "requests": [{
                "image": { "source": { "imageUri": image } },
                "features": [{ "type": "WEB_DETECTION", "maxResults": MAX_RESULTS }]
            }]
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("web detection returned {status}");
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                ProviderError::Transient(message)
            } else {
                ProviderError::Permanent(message)
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let detection = &body["responses"][0]["webDetection"];
        if detection.is_null() {
            debug!("No web detection results for avatar");
            return Ok(Vec::new());
        }

        Ok(self.facts_from_detection(request, &image, detection))
    }
}
