use crate::config::ProviderConfig;
use crate::domain::{CandidateFact, FieldName, IdentitySignals, ResolutionRequest, SubjectHint};
use crate::error::ProviderError;
use crate::providers::{audit_outbound_call, ProviderAdapter, RateBudget};
use async_trait::async_trait;
use tracing::{debug, instrument};

pub const PROVIDER_ID: &str = "company_lookup";

/// Company website lookup for domain subjects: verifies that the domain
/// serves a site and probes the conventional favicon location for a logo.
pub struct CompanyLookupProvider {
    client: reqwest::Client,
    budget: RateBudget,
}

impl CompanyLookupProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            budget: RateBudget::new(
                PROVIDER_ID,
                config.requests_per_min,
                config.requests_per_day,
            ),
        }
    }
}

#[async_trait]
impl ProviderAdapter for CompanyLookupProvider {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    // person-facing fields never come from a company website probe
    fn applies_to(&self, request: &ResolutionRequest) -> bool {
        matches!(request.subject, SubjectHint::Company { .. })
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn query(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<CandidateFact>, ProviderError> {
        let domain = match &request.subject {
            SubjectHint::Company { domain } => domain.clone(),
            SubjectHint::Person { .. } => return Ok(Vec::new()),
        };

        self.budget.try_acquire()?;
        audit_outbound_call(PROVIDER_ID, request);

        let identity = IdentitySignals {
            domain: Some(domain.clone()),
            ..Default::default()
        };
        let mut facts = Vec::new();

        let site_url = format!("https://{domain}");
        let response = self
            .client
            .get(&site_url)
            .send()
            .await
            .map_err(ProviderError::from_http)?;
        if response.status().is_success() {
            let mut fact = CandidateFact::new(PROVIDER_ID, FieldName::Url, site_url.clone())
                .with_evidence(site_url.clone())
                .with_identity(identity.clone());
            fact.reported_confidence = Some(0.8);
            facts.push(fact);
        } else {
            debug!(domain, status = %response.status(), "Domain does not serve a site");
            return Ok(facts);
        }

        if request.fields.contains(&FieldName::Image) {
            let favicon_url = format!("{site_url}/favicon.ico");
            match self.client.get(&favicon_url).send().await {
                Ok(response) if response.status().is_success() => {
                    let is_icon = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(|ct| ct.starts_with("image/"))
                        .unwrap_or(false);
                    if is_icon {
                        let mut fact =
                            CandidateFact::new(PROVIDER_ID, FieldName::Image, favicon_url.clone())
                                .with_evidence(favicon_url)
                                .with_identity(identity);
                        fact.reported_confidence = Some(0.8);
                        facts.push(fact);
                    }
                }
                Ok(_) => debug!(domain, "No favicon at the conventional location"),
                // the site answered already, a favicon failure is not fatal
                Err(e) => debug!(domain, error = %e, "Favicon probe failed"),
            }
        }

        Ok(facts)
    }
}
