use crate::config::ProviderConfig;
use crate::domain::{CandidateFact, FieldName, IdentitySignals, ResolutionRequest};
use crate::error::ProviderError;
use crate::providers::{audit_outbound_call, ProviderAdapter, RateBudget};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, instrument};

pub const PROVIDER_ID: &str = "profile_search";

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1/siterestrict";

/// Profile URLs carry a two-letter country-code subdomain (xx.linkedin.com).
static PROFILE_COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^https://(\w{2})\.linkedin\.com/in/").unwrap());

/// Searches a programmable web-search engine restricted to a public-profile
/// site, keyed by the subject's email address. Public profile page titles
/// follow the `Full Name - Title - Company | LinkedIn` convention, which is
/// parsed into individual facts.
pub struct ProfileSearchProvider {
    client: reqwest::Client,
    budget: RateBudget,
    base_url: String,
    api_key: Option<String>,
    engine_id: Option<String>,
}

impl ProfileSearchProvider {
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
            engine_id: config.engine_id.clone(),
        }
    }

    fn facts_from_result(
        &self,
        request: &ResolutionRequest,
        item: &Value,
    ) -> Vec<CandidateFact> {
        let hint_name = match request.subject.full_name() {
            Some(name) => name,
            None => return Vec::new(),
        };

        let title = item["title"].as_str().unwrap_or_default();
        let parsed = match ProfileTitle::parse(title) {
            Some(parsed) => parsed,
            None => {
                debug!(title, "Result title does not follow the profile convention");
                return Vec::new();
            }
        };

        // The mined full name must match the queried name; anything else is a
        // different person surfaced by the index
        if crate::domain::normalize_text(&parsed.name)
            != crate::domain::normalize_text(hint_name)
        {
            debug!(
                mined = %parsed.name,
                queried = %hint_name,
                "Mined full name does not match the queried name"
            );
            return Vec::new();
        }

        let link = item["link"].as_str();
        let metatags = &item["pagemap"]["metatags"][0];
        let image = metatags["og:image"].as_str();
        let snippet = item["snippet"].as_str();

        // The result was retrieved by querying the subject's own email, so
        // the email domain is evidence tied to this document
        let identity = IdentitySignals {
            name: Some(parsed.name.clone()),
            domain: request.subject.domain().map(|d| d.to_string()),
            image_url: image.map(|u| u.to_string()),
            bio: snippet.map(|s| s.to_string()),
        };

        let mut facts = Vec::new();
        let mut push = |field: FieldName, value: &str| {
            let mut fact = CandidateFact::new(PROVIDER_ID, field, value)
                .with_identity(identity.clone());
            if let Some(url) = link {
                fact = fact.with_evidence(url);
            }
            facts.push(fact);
        };

        push(FieldName::Name, &parsed.name);
        if let Some(given) = metatags["profile:first_name"].as_str() {
            push(FieldName::GivenName, given);
        }
        if let Some(family) = metatags["profile:last_name"].as_str() {
            push(FieldName::FamilyName, family);
        }
        if let Some(job_title) = &parsed.job_title {
            push(FieldName::JobTitle, job_title);
        }
        if let Some(company) = &parsed.company {
            push(FieldName::Company, company);
        }
        if let Some(image) = image {
            push(FieldName::Image, image);
        }
        if let Some(url) = link {
            push(FieldName::Url, url);
            if let Some(country) = PROFILE_COUNTRY_RE
                .captures(url)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_uppercase())
            {
                push(FieldName::Location, &country);
            }
        }

        facts
    }
}

#[async_trait]
impl ProviderAdapter for ProfileSearchProvider {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    // search-by-name-email has nothing to offer company subjects
    fn applies_to(&self, request: &ResolutionRequest) -> bool {
        request.subject.email().is_some()
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
            ProviderError::Permanent("profile_search: missing api key".to_string())
        })?;
        let engine_id = self.engine_id.as_deref().ok_or_else(|| {
            ProviderError::Permanent("profile_search: missing engine id".to_string())
        })?;

        self.budget.try_acquire()?;
        audit_outbound_call(PROVIDER_ID, request);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("key", api_key),
                ("cx", engine_id),
                ("num", "1"),
                ("q", email),
            ])
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("profile_search returned {status}");
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

        match body["items"].as_array().and_then(|items| items.first()) {
            Some(item) => Ok(self.facts_from_result(request, item)),
            None => {
                debug!("No search results for subject");
                Ok(Vec::new())
            }
        }
    }
}

/// Parsed form of the `Full Name - Title - Company | LinkedIn` convention.
struct ProfileTitle {
    name: String,
    job_title: Option<String>,
    company: Option<String>,
}

impl ProfileTitle {
    fn parse(title: &str) -> Option<Self> {
        let head = title.split('|').next()?.trim();
        if head.is_empty() {
            return None;
        }
        let mut parts = head.split(" - ").map(str::trim);
        let name = parts.next()?.to_string();
        let job_title = parts.next().map(|s| s.to_string());
        // the index sometimes truncates the company with a '...' suffix
        let company = parts
            .next()
            .map(|s| s.trim_end_matches("...").trim().to_string());
        Some(Self {
            name,
            job_title,
            company,
        })
    }
}
