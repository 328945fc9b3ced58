use crate::error::ResolveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// The sparse identity hint a caller wants enriched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectHint {
    Person { email: String, full_name: String },
    Company { domain: String },
}

impl SubjectHint {
    pub fn person(email: &str, full_name: &str) -> Self {
        SubjectHint::Person {
            email: email.trim().to_lowercase(),
            full_name: full_name.trim().to_string(),
        }
    }

    pub fn company(domain: &str) -> Self {
        SubjectHint::Company {
            domain: domain.trim().to_lowercase(),
        }
    }

    /// The domain the subject is bound to: the email domain for persons,
    /// the queried domain for companies.
    pub fn domain(&self) -> Option<&str> {
        match self {
            SubjectHint::Person { email, .. } => email.split('@').nth(1),
            SubjectHint::Company { domain } => Some(domain.as_str()),
        }
    }

    pub fn full_name(&self) -> Option<&str> {
        match self {
            SubjectHint::Person { full_name, .. } => Some(full_name.as_str()),
            SubjectHint::Company { .. } => None,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            SubjectHint::Person { email, .. } => Some(email.as_str()),
            SubjectHint::Company { .. } => None,
        }
    }

    /// Stable key component for caching: lowercased and trimmed so that
    /// equivalent hints collapse to one entry.
    pub fn normalized_key(&self) -> String {
        match self {
            SubjectHint::Person { email, full_name } => {
                format!("person:{}:{}", email, normalize_text(full_name))
            }
            SubjectHint::Company { domain } => format!("company:{domain}"),
        }
    }

    /// Reject malformed hints before any provider is dispatched.
    pub fn validate(&self) -> Result<(), ResolveError> {
        match self {
            SubjectHint::Person { email, full_name } => {
                let mut parts = email.splitn(2, '@');
                let local = parts.next().unwrap_or("");
                let domain = parts.next().unwrap_or("");
                if local.is_empty() || domain.is_empty() || !domain.contains('.') {
                    return Err(ResolveError::Validation(format!(
                        "invalid email address: {email}"
                    )));
                }
                if full_name.trim().is_empty() {
                    return Err(ResolveError::Validation(
                        "full name must not be empty".to_string(),
                    ));
                }
            }
            SubjectHint::Company { domain } => {
                if domain.is_empty() || !domain.contains('.') || domain.contains('@') {
                    return Err(ResolveError::Validation(format!(
                        "invalid domain: {domain}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Closed set of enrichable profile fields.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Name,
    GivenName,
    FamilyName,
    JobTitle,
    Company,
    Image,
    Url,
    Location,
    SameAs,
}

impl FieldName {
    pub fn person_fields() -> BTreeSet<FieldName> {
        use FieldName::*;
        [Name, GivenName, FamilyName, JobTitle, Company, Image, Url, Location, SameAs]
            .into_iter()
            .collect()
    }

    pub fn company_fields() -> BTreeSet<FieldName> {
        use FieldName::*;
        [Company, Image, Url].into_iter().collect()
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldName::Name => "name",
            FieldName::GivenName => "given_name",
            FieldName::FamilyName => "family_name",
            FieldName::JobTitle => "job_title",
            FieldName::Company => "company",
            FieldName::Image => "image",
            FieldName::Url => "url",
            FieldName::Location => "location",
            FieldName::SameAs => "same_as",
        };
        write!(f, "{s}")
    }
}

/// One enrichment request. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub id: Uuid,
    pub subject: SubjectHint,
    pub fields: BTreeSet<FieldName>,
}

impl ResolutionRequest {
    pub fn new(subject: SubjectHint, fields: BTreeSet<FieldName>) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            fields,
        }
    }

    pub fn for_person(email: &str, full_name: &str) -> Self {
        Self::new(SubjectHint::person(email, full_name), FieldName::person_fields())
    }

    pub fn for_company(domain: &str) -> Self {
        Self::new(SubjectHint::company(domain), FieldName::company_fields())
    }

    /// Cache key: normalized subject plus the requested field-set signature.
    pub fn cache_key(&self) -> String {
        let mut signature = String::new();
        for field in &self.fields {
            signature.push_str(&field.to_string());
            signature.push(',');
        }
        format!("{}|{}", self.subject.normalized_key(), signature)
    }
}

/// Identity signals attached to the document a fact was extracted from,
/// used by the matcher to judge whether that document is about the subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentitySignals {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub image_url: Option<String>,
    pub bio: Option<String>,
}

/// One unverified assertion about a field, sourced from one provider.
/// Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFact {
    pub provider: String,
    pub field: FieldName,
    pub value: String,
    pub evidence_url: Option<String>,
    pub reported_confidence: Option<f64>,
    pub identity: IdentitySignals,
    pub observed_at: DateTime<Utc>,
}

impl CandidateFact {
    pub fn new(provider: &str, field: FieldName, value: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            field,
            value: value.into(),
            evidence_url: None,
            reported_confidence: None,
            identity: IdentitySignals::default(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, url: impl Into<String>) -> Self {
        self.evidence_url = Some(url.into());
        self
    }

    pub fn with_identity(mut self, identity: IdentitySignals) -> Self {
        self.identity = identity;
        self
    }
}

/// A candidate fact plus the matcher's verdict. Transient working state,
/// scoped to a single resolution and discarded after merge.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub fact: CandidateFact,
    pub score: f64,
    pub same_subject: bool,
    /// Distinct providers asserting the same field/value, this one included.
    pub corroborators: BTreeSet<String>,
}

/// A merged field with its confidence and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub confidence: f64,
    /// Provider id the winning value came from.
    pub source: String,
    /// Other providers that independently asserted the same value.
    pub corroborated_by: Vec<String>,
}

/// The verified output profile. Fields absent from the map are unknown,
/// which is distinct from an explicit empty value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub subject: SubjectHint,
    pub fields: BTreeMap<FieldName, FieldValue>,
    pub opted_out: bool,
    pub resolved_at: DateTime<Utc>,
}

impl Profile {
    pub fn empty(subject: SubjectHint) -> Self {
        Self {
            subject,
            fields: BTreeMap::new(),
            opted_out: false,
            resolved_at: Utc::now(),
        }
    }

    /// A profile for a subject who declined enrichment: the flag is the only
    /// information carried.
    pub fn opted_out(subject: SubjectHint) -> Self {
        Self {
            subject,
            fields: BTreeMap::new(),
            opted_out: true,
            resolved_at: Utc::now(),
        }
    }
}

/// Lowercase, trim, and collapse separators so equivalent names compare equal.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for c in text.trim().chars() {
        let c = match c {
            '-' | '_' | '.' | ',' => ' ',
            other => other,
        };
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_key_collapses_case_and_spacing() {
        let a = SubjectHint::person("Jane@Initech.com", "  Jane  Doe ");
        let b = SubjectHint::person("jane@initech.com", "Jane Doe");
        assert_eq!(a.normalized_key(), b.normalized_key());
    }

    #[test]
    fn person_domain_comes_from_email() {
        let hint = SubjectHint::person("jane@initech.com", "Jane Doe");
        assert_eq!(hint.domain(), Some("initech.com"));
    }

    #[test]
    fn validation_rejects_malformed_hints() {
        assert!(SubjectHint::person("not-an-email", "Jane Doe").validate().is_err());
        assert!(SubjectHint::person("jane@initech.com", " ").validate().is_err());
        assert!(SubjectHint::company("initech").validate().is_err());
        assert!(SubjectHint::company("initech.com").validate().is_ok());
    }

    #[test]
    fn cache_key_depends_on_field_set() {
        let full = ResolutionRequest::for_person("jane@initech.com", "Jane Doe");
        let narrow = ResolutionRequest::new(
            SubjectHint::person("jane@initech.com", "Jane Doe"),
            [FieldName::JobTitle].into_iter().collect(),
        );
        assert_ne!(full.cache_key(), narrow.cache_key());
    }

    #[test]
    fn normalize_text_strips_punctuation_variants() {
        assert_eq!(normalize_text("Jane-Doe"), "jane doe");
        assert_eq!(normalize_text("  JANE   DOE  "), "jane doe");
    }
}
