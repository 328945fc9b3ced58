use async_trait::async_trait;
use prospector::config::{Config, ProviderConfig};
use prospector::domain::{
    CandidateFact, FieldName, IdentitySignals, ResolutionRequest,
};
use prospector::error::{ProviderError, ResolveError};
use prospector::orchestrator::Resolver;
use prospector::providers::avatar::AvatarProvider;
use prospector::providers::name_split::NameSplitProvider;
use prospector::providers::ProviderAdapter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
enum Behavior {
    Facts(Vec<CandidateFact>),
    Transient,
    Permanent,
    Hang,
}

struct MockProvider {
    id: &'static str,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl MockProvider {
    fn new(id: &'static str, behavior: Behavior) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = Arc::new(Self {
            id,
            behavior,
            calls: Arc::clone(&calls),
        });
        (provider, calls)
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn provider_id(&self) -> &'static str {
        self.id
    }

    async fn query(
        &self,
        _request: &ResolutionRequest,
    ) -> Result<Vec<CandidateFact>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Facts(facts) => Ok(facts.clone()),
            Behavior::Transient => Err(ProviderError::Transient("503".to_string())),
            Behavior::Permanent => Err(ProviderError::Permanent("bad key".to_string())),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(Vec::new())
            }
        }
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.resolver.request_timeout_secs = 1;
    config.resolver.retry_attempts = 0;
    config.resolver.retry_base_ms = 1;
    config
}

fn jane_request() -> ResolutionRequest {
    ResolutionRequest::for_person("jane@initech.com", "Jane Doe")
}

fn jane_fact(provider: &str, field: FieldName, value: &str) -> CandidateFact {
    CandidateFact::new(provider, field, value).with_identity(IdentitySignals {
        name: Some("Jane Doe".to_string()),
        domain: Some("initech.com".to_string()),
        ..Default::default()
    })
}

fn jane_fact_with_bio(provider: &str, bio: &str) -> CandidateFact {
    let mut fact = jane_fact(provider, FieldName::Name, "Jane Doe");
    fact.identity.bio = Some(bio.to_string());
    fact
}

#[tokio::test]
async fn opt_out_marker_suppresses_all_personal_fields() {
    let (search, _) = MockProvider::new(
        "search",
        Behavior::Facts(vec![
            jane_fact("search", FieldName::JobTitle, "Engineer"),
            jane_fact_with_bio("search", "Engineer at Initech. #OPTOUT please."),
        ]),
    );
    let (whois, _) = MockProvider::new(
        "whois",
        Behavior::Facts(vec![jane_fact("whois", FieldName::Company, "Initech")]),
    );

    let resolver = Resolver::with_providers(&test_config(), vec![search, whois]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    assert!(profile.opted_out);
    assert!(profile.fields.is_empty());
}

#[tokio::test]
async fn opted_out_is_distinct_from_nothing_found() {
    let (empty, _) = MockProvider::new("search", Behavior::Facts(vec![]));
    let resolver = Resolver::with_providers(&test_config(), vec![empty]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    assert!(!profile.opted_out);
    assert!(profile.fields.is_empty());
}

#[tokio::test]
async fn second_call_within_ttl_is_served_from_cache() {
    let (search, calls) = MockProvider::new(
        "search",
        Behavior::Facts(vec![jane_fact("search", FieldName::JobTitle, "Engineer")]),
    );
    let resolver = Resolver::with_providers(&test_config(), vec![search]);

    let first = resolver.resolve(jane_request()).await.unwrap();
    let second = resolver.resolve(jane_request()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[tokio::test]
async fn expired_ttl_invokes_adapters_again() {
    let (search, calls) = MockProvider::new(
        "search",
        Behavior::Facts(vec![jane_fact("search", FieldName::JobTitle, "Engineer")]),
    );
    let mut config = test_config();
    config.cache.person_ttl_secs = 0;
    let resolver = Resolver::with_providers(&config, vec![search]);

    resolver.resolve(jane_request()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    resolver.resolve(jane_request()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn corroborated_value_beats_a_lone_contrary_assertion() {
    let (a, _) = MockProvider::new(
        "source_a",
        Behavior::Facts(vec![jane_fact("source_a", FieldName::JobTitle, "Engineer")]),
    );
    let (b, _) = MockProvider::new(
        "source_b",
        Behavior::Facts(vec![jane_fact("source_b", FieldName::JobTitle, "Engineer")]),
    );
    let (c, _) = MockProvider::new(
        "source_c",
        Behavior::Facts(vec![jane_fact("source_c", FieldName::JobTitle, "Manager")]),
    );

    let resolver = Resolver::with_providers(&test_config(), vec![a, b, c]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    let job_title = &profile.fields[&FieldName::JobTitle];
    assert_eq!(job_title.value, "Engineer");
    // confidence reflects dual corroboration: name + domain + corroboration
    assert!(job_title.confidence > 0.8);
    assert_eq!(job_title.corroborated_by.len(), 1);
}

#[tokio::test]
async fn inapplicable_adapters_do_not_mask_total_failure() {
    // the avatar adapter declines company subjects without searching, so it
    // must not count as a success when every applicable adapter fails
    let avatar: Arc<dyn ProviderAdapter> = Arc::new(AvatarProvider::new(
        reqwest::Client::new(),
        &ProviderConfig::default(),
    ));
    let (registry, _) = MockProvider::new("registry", Behavior::Transient);
    let (site, _) = MockProvider::new("site", Behavior::Transient);

    let resolver = Resolver::with_providers(&test_config(), vec![avatar, registry, site]);
    let request = ResolutionRequest::for_company("initech.com");
    let err = resolver.resolve(request).await.unwrap_err();

    assert!(matches!(err, ResolveError::AllProvidersFailed));
}

#[tokio::test]
async fn all_transient_failures_end_in_all_providers_failed() {
    let (a, _) = MockProvider::new("a", Behavior::Transient);
    let (b, _) = MockProvider::new("b", Behavior::Transient);
    let (c, _) = MockProvider::new("c", Behavior::Transient);

    let resolver = Resolver::with_providers(&test_config(), vec![a, b, c]);
    let err = resolver.resolve(jane_request()).await.unwrap_err();
    assert!(matches!(err, ResolveError::AllProvidersFailed));
}

#[tokio::test]
async fn straggler_is_dropped_and_the_rest_produce_a_profile() {
    let (search, _) = MockProvider::new(
        "search",
        Behavior::Facts(vec![jane_fact("search", FieldName::JobTitle, "Engineer")]),
    );
    let (whois, _) = MockProvider::new(
        "whois",
        Behavior::Facts(vec![jane_fact("whois", FieldName::Company, "Initech")]),
    );
    let (slow, _) = MockProvider::new("slow", Behavior::Hang);

    let resolver = Resolver::with_providers(&test_config(), vec![search, whois, slow]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    assert_eq!(profile.fields[&FieldName::JobTitle].value, "Engineer");
    assert_eq!(profile.fields[&FieldName::Company].value, "Initech");
    // nothing from the straggler made it in
    assert!(profile
        .fields
        .values()
        .all(|field| field.source != "slow"));
}

#[tokio::test]
async fn permanent_failure_does_not_abort_other_providers() {
    let (broken, broken_calls) = MockProvider::new("broken", Behavior::Permanent);
    let (search, _) = MockProvider::new(
        "search",
        Behavior::Facts(vec![jane_fact("search", FieldName::JobTitle, "Engineer")]),
    );

    let mut config = test_config();
    config.resolver.retry_attempts = 3;
    let resolver = Resolver::with_providers(&config, vec![broken, search]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    assert_eq!(profile.fields[&FieldName::JobTitle].value, "Engineer");
    // permanent errors are never retried
    assert_eq!(broken_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_failures_are_retried_with_bounded_attempts() {
    let (flaky, flaky_calls) = MockProvider::new("flaky", Behavior::Transient);
    let (search, _) = MockProvider::new(
        "search",
        Behavior::Facts(vec![jane_fact("search", FieldName::JobTitle, "Engineer")]),
    );

    let mut config = test_config();
    config.resolver.retry_attempts = 2;
    let resolver = Resolver::with_providers(&config, vec![flaky, search]);
    resolver.resolve(jane_request()).await.unwrap();

    // initial call plus two retries
    assert_eq!(flaky_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn company_field_never_comes_from_a_foreign_domain() {
    let mut foreign = jane_fact("search", FieldName::Company, "Globex");
    foreign.identity.domain = Some("globex.com".to_string());
    // highest possible vote of confidence from the source itself
    foreign.reported_confidence = Some(1.0);

    let (search, _) = MockProvider::new("search", Behavior::Facts(vec![foreign]));
    let (whois, _) = MockProvider::new(
        "whois",
        Behavior::Facts(vec![jane_fact("whois", FieldName::Company, "Initech")]),
    );

    let resolver = Resolver::with_providers(&test_config(), vec![search, whois]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    assert_eq!(profile.fields[&FieldName::Company].value, "Initech");
}

#[tokio::test]
async fn malformed_hints_are_rejected_before_dispatch() {
    let (search, calls) = MockProvider::new("search", Behavior::Facts(vec![]));
    let resolver = Resolver::with_providers(&test_config(), vec![search]);

    let request = ResolutionRequest::for_person("not-an-email", "Jane Doe");
    let err = resolver.resolve(request).await.unwrap_err();

    assert!(matches!(err, ResolveError::Validation(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn given_and_family_names_resolve_without_the_search_provider() {
    let splitter: Arc<dyn ProviderAdapter> = Arc::new(NameSplitProvider::new());
    let resolver = Resolver::with_providers(&test_config(), vec![splitter]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    assert_eq!(profile.fields[&FieldName::GivenName].value, "Jane");
    assert_eq!(profile.fields[&FieldName::FamilyName].value, "Doe");
    assert_eq!(profile.fields[&FieldName::GivenName].source, "name_split");
}

#[tokio::test]
async fn provenance_records_the_winning_source() {
    let (search, _) = MockProvider::new(
        "search",
        Behavior::Facts(vec![jane_fact("search", FieldName::JobTitle, "Engineer")]),
    );
    let resolver = Resolver::with_providers(&test_config(), vec![search]);
    let profile = resolver.resolve(jane_request()).await.unwrap();

    assert_eq!(profile.fields[&FieldName::JobTitle].source, "search");
}
