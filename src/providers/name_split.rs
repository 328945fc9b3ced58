use crate::domain::{CandidateFact, FieldName, IdentitySignals, ResolutionRequest};
use crate::error::ProviderError;
use crate::providers::ProviderAdapter;
use async_trait::async_trait;
use tracing::{debug, instrument};

pub const PROVIDER_ID: &str = "name_split";

/// Particles that start a family name (First Name Van Family Name).
const FAMILY_NAME_PARTICLES: &[&str] = &[
    "a", "ab", "af", "ap", "abu", "al", "at", "bar", "ben", "bin", "bint", "da",
    "de", "degli", "del", "della", "der", "di", "dos", "du", "el", "fitz",
    "ibn", "la", "le", "mac", "mc", "o", "te", "ter", "van", "von", "zu",
];

/// Leading courtesy titles that carry no name information.
const CIVILITY: &[&str] = &["m", "mme", "mlle", "mr", "mrs", "ms"];

/// Mailbox display names that belong to a function, not a person.
const ROLE_NAMES: &[&str] = &[
    "contact",
    "communication",
    "events",
    "forum",
    "meeting",
    "secretariat",
    "secretario",
    "service",
    "service client",
    "support",
    "wordpress",
];

/// Honorific abbreviations, expanded into the job title they imply.
const HONORIFICS: &[(&str, &str)] = &[
    ("dr", "Doctor"),
    ("phd", "Doctor"),
    ("ing", "Engineer"),
    ("eng", "Engineer"),
    ("engr", "Engineer"),
    ("pr", "Professor"),
    ("prof", "Professor"),
];

/// Prefixes that bind a person's name to a business (mail "From" display).
const BUSINESS_SEPARATOR: &[&str] = &["from", "van", "von", "de", "d"];

#[derive(Debug, PartialEq, Eq)]
pub struct SplitName {
    pub given: String,
    pub family: Option<String>,
    pub job_title: Option<String>,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase alphanumeric skeleton, for comparing names against domain labels.
fn condense(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether the text is really the organization behind the domain rather than
/// a person: "Acme" or "acme.com" in a mailbox at acme.com names the company.
fn is_company_label(text: &str, domain: &str) -> bool {
    let mut text = text.trim();
    for sep in BUSINESS_SEPARATOR {
        if let Some(head) = text.get(..sep.len()) {
            if head.eq_ignore_ascii_case(sep) && text.len() > sep.len() {
                text = &text[sep.len()..];
                break;
            }
        }
    }
    let condensed = condense(text);
    if condensed.is_empty() {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    let registrable = if labels.len() >= 2 {
        labels[labels.len() - 2]
    } else {
        domain
    };
    condensed == condense(registrable) || condensed == condense(domain)
}

fn is_all_uppercase(word: &str) -> bool {
    let mut has_alpha = false;
    for c in word.chars().filter(|c| c.is_alphabetic()) {
        has_alpha = true;
        if !c.is_uppercase() {
            return false;
        }
    }
    has_alpha
}

fn honorific_title(word: &str) -> Option<&'static str> {
    let key = word.trim_end_matches('.').to_lowercase();
    HONORIFICS
        .iter()
        .find(|(abbr, _)| *abbr == key)
        .map(|(_, title)| *title)
}

/// A part survives only if it looks like a name: at least one letter, not a
/// courtesy title, not a role mailbox, not the company behind the domain.
fn acceptable_part(part: &str, domain: Option<&str>) -> bool {
    if !part.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    let lowered = part.trim_end_matches('.').to_lowercase();
    if CIVILITY.contains(&lowered.as_str()) || ROLE_NAMES.contains(&lowered.as_str()) {
        return false;
    }
    if let Some(domain) = domain {
        if is_company_label(part, domain) {
            return false;
        }
    }
    true
}

/// Split a full name into a given and family name.
///
/// Handles the common shapes of mailbox display names: "Given Family",
/// reversed "FAMILY Given", comma format "Family, Given", courtesy titles,
/// honorific prefixes and credential suffixes, and family-name particles.
/// Returns None when the text names a role or the company rather than a
/// person; precision matters more than recall here.
pub fn split_full_name(full_name: &str, domain: Option<&str>) -> Option<SplitName> {
    let collapsed = collapse_whitespace(full_name);
    // too short to guess anything from
    if collapsed.chars().count() < 4 {
        return None;
    }
    if !collapsed.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    if ROLE_NAMES.contains(&collapsed.to_lowercase().as_str()) {
        return None;
    }
    if let Some(domain) = domain {
        if is_company_label(&collapsed, domain) {
            return None;
        }
    }

    // Family, Given
    let comma_parts: Vec<&str> = collapsed.split(',').map(str::trim).collect();
    if comma_parts.len() == 2
        && !comma_parts[0].is_empty()
        && !comma_parts[1].is_empty()
        && comma_parts[0].chars().next().is_some_and(|c| c.is_uppercase())
    {
        return finish(
            comma_parts[1].to_string(),
            Some(comma_parts[0].to_string()),
            None,
            domain,
        );
    }

    let mut words: Vec<&str> = collapsed.split(' ').collect();
    let mut job_title: Option<String> = None;

    if words.len() > 1 {
        let head = words[0].trim_end_matches('.').to_lowercase();
        if CIVILITY.contains(&head.as_str()) {
            words.remove(0);
        }
    }
    // Dr. Given Family
    if words.len() > 1 {
        if let Some(title) = honorific_title(words[0]) {
            job_title = Some(title.to_string());
            words.remove(0);
        }
    }
    // Given Family PhD
    if words.len() > 1 {
        if let Some(title) = honorific_title(words[words.len() - 1]) {
            job_title.get_or_insert_with(|| title.to_string());
            words.pop();
        }
    }

    let (given, family) = match words.len() {
        0 => return None,
        1 => (words[0].to_string(), None),
        2 => {
            // FAMILY Given is the reversed convention
            if is_all_uppercase(words[0]) && !is_all_uppercase(words[1]) {
                (words[1].to_string(), Some(words[0].to_string()))
            } else {
                (words[0].to_string(), Some(words[1].to_string()))
            }
        }
        _ => split_words(&words),
    };

    finish(given, family, job_title, domain)
}

/// Three or more words: an all-uppercase run at either end is the family
/// name; otherwise a particle marks where the family name starts.
fn split_words(words: &[&str]) -> (String, Option<String>) {
    let first_upper = is_all_uppercase(words[0]);
    let last_upper = is_all_uppercase(words[words.len() - 1]);

    if first_upper != last_upper {
        if last_upper {
            if let Some(i) = words.iter().position(|w| is_all_uppercase(w)) {
                return (words[..i].join(" "), Some(words[i..].join(" ")));
            }
        } else if let Some(i) = words.iter().position(|w| !is_all_uppercase(w)) {
            return (words[i..].join(" "), Some(words[..i].join(" ")));
        }
    }

    for i in 1..words.len() - 1 {
        if FAMILY_NAME_PARTICLES.contains(&words[i].to_lowercase().as_str()) {
            return (words[..i].join(" "), Some(words[i..].join(" ")));
        }
    }

    // no structural signal, only the given name is safe to assert
    (words[0].to_string(), None)
}

fn finish(
    given: String,
    family: Option<String>,
    job_title: Option<String>,
    domain: Option<&str>,
) -> Option<SplitName> {
    if !acceptable_part(&given, domain) {
        return None;
    }
    let family = family.filter(|f| acceptable_part(f, domain));
    Some(SplitName {
        given,
        family,
        job_title,
    })
}

/// Derives given and family names from the queried full name itself.
/// Deterministic and purely local: no outbound call, no quota to charge.
pub struct NameSplitProvider;

impl NameSplitProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NameSplitProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderAdapter for NameSplitProvider {
    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn applies_to(&self, request: &ResolutionRequest) -> bool {
        request.subject.full_name().is_some()
            && [FieldName::GivenName, FieldName::FamilyName, FieldName::JobTitle]
                .iter()
                .any(|f| request.fields.contains(f))
    }

    #[instrument(skip(self, request), fields(request_id = %request.id))]
    async fn query(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Vec<CandidateFact>, ProviderError> {
        let full_name = match request.subject.full_name() {
            Some(name) => name,
            None => return Ok(Vec::new()),
        };
        let domain = request.subject.domain();
        let split = match split_full_name(full_name, domain) {
            Some(split) => split,
            None => {
                debug!(full_name, "Full name does not split into person names");
                return Ok(Vec::new());
            }
        };

        let identity = IdentitySignals {
            name: Some(full_name.to_string()),
            domain: domain.map(|d| d.to_string()),
            ..Default::default()
        };
        let mut facts = Vec::new();
        let mut push = |field: FieldName, value: &str| {
            let mut fact =
                CandidateFact::new(PROVIDER_ID, field, value).with_identity(identity.clone());
            // derived from the caller's own hint, not third-party evidence
            fact.reported_confidence = Some(0.7);
            facts.push(fact);
        };

        if request.fields.contains(&FieldName::GivenName) {
            push(FieldName::GivenName, &split.given);
        }
        if let Some(family) = &split.family {
            if request.fields.contains(&FieldName::FamilyName) {
                push(FieldName::FamilyName, family);
            }
        }
        if let Some(job_title) = &split.job_title {
            if request.fields.contains(&FieldName::JobTitle) {
                push(FieldName::JobTitle, job_title);
            }
        }
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(name: &str) -> Option<SplitName> {
        split_full_name(name, Some("example.com"))
    }

    #[test]
    fn splits_the_plain_given_family_shape() {
        let s = split("John Doe").unwrap();
        assert_eq!(s.given, "John");
        assert_eq!(s.family.as_deref(), Some("Doe"));
        assert_eq!(s.job_title, None);
    }

    #[test]
    fn reversed_uppercase_family_is_put_back_in_order() {
        let s = split("DOE John").unwrap();
        assert_eq!(s.given, "John");
        assert_eq!(s.family.as_deref(), Some("DOE"));

        let s = split("VAN DAMME Jean Claude").unwrap();
        assert_eq!(s.given, "Jean Claude");
        assert_eq!(s.family.as_deref(), Some("VAN DAMME"));
    }

    #[test]
    fn comma_format_carries_the_family_name_first() {
        let s = split("Smith, John").unwrap();
        assert_eq!(s.given, "John");
        assert_eq!(s.family.as_deref(), Some("Smith"));
    }

    #[test]
    fn honorifics_become_the_job_title() {
        let s = split("Dr. Jane Smith").unwrap();
        assert_eq!(s.given, "Jane");
        assert_eq!(s.family.as_deref(), Some("Smith"));
        assert_eq!(s.job_title.as_deref(), Some("Doctor"));

        let s = split("John Doe PhD").unwrap();
        assert_eq!(s.given, "John");
        assert_eq!(s.family.as_deref(), Some("Doe"));
        assert_eq!(s.job_title.as_deref(), Some("Doctor"));
    }

    #[test]
    fn civility_prefixes_are_stripped() {
        let s = split("Mr John Doe").unwrap();
        assert_eq!(s.given, "John");
        assert_eq!(s.family.as_deref(), Some("Doe"));
    }

    #[test]
    fn particles_mark_the_family_name() {
        let s = split("Ludwig van Beethoven").unwrap();
        assert_eq!(s.given, "Ludwig");
        assert_eq!(s.family.as_deref(), Some("van Beethoven"));

        let s = split("van der Waals").unwrap();
        assert_eq!(s.given, "van");
        assert_eq!(s.family.as_deref(), Some("der Waals"));
    }

    #[test]
    fn single_word_yields_only_a_given_name() {
        let s = split("John").unwrap();
        assert_eq!(s.given, "John");
        assert_eq!(s.family, None);
    }

    #[test]
    fn roles_companies_and_noise_are_rejected() {
        assert_eq!(split("Contact"), None);
        assert_eq!(split("Service Client"), None);
        assert_eq!(split("Support"), None);
        assert_eq!(split("Example Company"), None);
        assert_eq!(split_full_name("Acme", Some("acme.com")), None);
        assert_eq!(split("J"), None);
        assert_eq!(split("123"), None);
        assert_eq!(split("   "), None);
    }

    #[test]
    fn company_detection_condenses_name_and_domain() {
        assert!(is_company_label("Acme", "acme.com"));
        assert!(is_company_label("acme.com", "acme.com"));
        assert!(is_company_label("from Acme", "acme.com"));
        assert!(!is_company_label("John Doe", "acme.com"));
    }
}
