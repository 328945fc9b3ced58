use crate::config::ProviderConfig;
use crate::domain::{CandidateFact, FieldName, IdentitySignals, ResolutionRequest};
use crate::error::ProviderError;
use crate::providers::{audit_outbound_call, ProviderAdapter, RateBudget};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

pub const PROVIDER_ID: &str = "whois";

const DEFAULT_BASE_URL: &str = "https://rdap.org";

/// Registrant strings used by registrars to mask the real holder. A masked
/// registrant is not a company fact.
const PRIVACY_MASKS: &[&str] = &[
    "Statutory Masking Enabled",
    "Privacy service provided by Withheld for Privacy ehf",
    "Data Protected",
    "Whois Privacy Service",
    "Redacted for Privacy Purposes",
    "REDACTED FOR PRIVACY",
    "Redacted for Privacy",
    "Not Disclosed",
    "Domains By Proxy, LLC",
    "Contact Privacy Inc. Customer",
    "Withheld for Privacy Purposes",
];

/// Registration-data lookup over RDAP. The registrant organization of the
/// subject's domain becomes a company candidate.
pub struct WhoisProvider {
    client: reqwest::Client,
    budget: RateBudget,
    base_url: String,
}

impl WhoisProvider {
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

/// Pull the registrant name out of an RDAP domain response.
fn registrant_name(body: &Value) -> Option<String> {
    let entities = body["entities"].as_array()?;
    for entity in entities {
        let is_registrant = entity["roles"]
            .as_array()
            .map(|roles| roles.iter().any(|r| r.as_str() == Some("registrant")))
            .unwrap_or(false);
        if !is_registrant {
            continue;
        }
        let properties = match entity["vcardArray"][1].as_array() {
            Some(properties) => properties,
            None => continue,
        };
        // prefer the organization entry, fall back to the formatted name
        for wanted in ["org", "fn"] {
            for property in properties {
                if property[0].as_str() == Some(wanted) {
                    if let Some(value) = property[3].as_str() {
                        if !value.trim().is_empty() {
                            return Some(value.trim().to_string());
                        }
                    }
                }
            }
        }
    }
    None
}

fn is_privacy_masked(registrant: &str) -> bool {
    PRIVACY_MASKS
        .iter()
        .any(|mask| mask.eq_ignore_ascii_case(registrant))
}

#[async_trait]
impl ProviderAdapter for WhoisProvider {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn applies_to(&self, request: &ResolutionRequest) -> bool {
        request.subject.domain().is_some() && request.fields.contains(&FieldName::Company)
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn query(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<CandidateFact>, ProviderError> {
        let domain = match request.subject.domain() {
            Some(domain) => domain.to_string(),
            None => return Ok(Vec::new()),
        };

        self.budget.try_acquire()?;
        audit_outbound_call(PROVIDER_ID, request);

        let url = format!("{}/domain/{}", self.base_url, domain);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if status.as_u16() == 404 {
            debug!(domain, "No registration data for domain");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let message = format!("rdap lookup returned {status}");
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

        let registrant = match registrant_name(&body) {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        if is_privacy_masked(&registrant) {
            debug!(domain, registrant, "Registrant is privacy-masked");
            return Ok(Vec::new());
        }

        let mut fact = CandidateFact::new(PROVIDER_ID, FieldName::Company, registrant)
            .with_evidence(url)
            .with_identity(IdentitySignals {
                domain: Some(domain),
                ..Default::default()
            });
        fact.reported_confidence = Some(0.8);
        Ok(vec![fact])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rdap_body(registrant: &str) -> Value {
        json!({
            "entities": [{
                "roles": ["registrant"],
                "vcardArray": ["vcard", [
                    ["version", {}, "text", "4.0"],
                    ["fn", {}, "text", registrant],
                    ["org", {}, "text", registrant]
                ]]
            }]
        })
    }

    #[test]
    fn extracts_the_registrant_organization() {
        assert_eq!(
            registrant_name(&rdap_body("Initech Inc.")),
            Some("Initech Inc.".to_string())
        );
    }

    #[test]
    fn missing_registrant_role_yields_none() {
        let body = json!({"entities": [{"roles": ["abuse"], "vcardArray": ["vcard", []]}]});
        assert_eq!(registrant_name(&body), None);
    }

    #[test]
    fn privacy_masked_registrants_are_filtered() {
        assert!(is_privacy_masked("REDACTED FOR PRIVACY"));
        assert!(is_privacy_masked("redacted for privacy"));
        assert!(!is_privacy_masked("Initech Inc."));
    }
}
