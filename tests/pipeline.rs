//! End-to-end pipeline behaviour with in-process collaborators

use answer_engine::config::{ProviderConfig, ProviderPolicy, Settings};
use answer_engine::error::{ErrorKind, Result, SearchError};
use answer_engine::providers::{ProviderRegistry, SearchProvider};
use answer_engine::query::Query;
use answer_engine::ranking::Embedder;
use answer_engine::results::SourceRecord;
use answer_engine::scheduler::RunContext;
use answer_engine::search::{SearchPipeline, SearchRequest};
use answer_engine::synthesis::{CompletionClient, CompletionRequest};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

enum Behavior {
    Titles(Vec<&'static str>),
    Fail,
    Hang,
}

struct StubProvider {
    name: &'static str,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl StubProvider {
    fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StubProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(&self, _query: &Query, _ctx: &RunContext) -> Result<Vec<SourceRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Titles(titles) => Ok(titles
                .iter()
                .enumerate()
                .map(|(i, title)| {
                    SourceRecord::new(format!("https://{}.example.com/{i}", self.name), *title, self.name)
                        .with_snippet(format!("{title} reported by {}", self.name))
                })
                .collect()),
            Behavior::Fail => Err(SearchError::Unavailable("connection refused".into())),
            Behavior::Hang => futures::future::pending().await,
        }
    }
}

struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _texts: &[String], _ctx: &RunContext) -> Result<Vec<Vec<f32>>> {
        Err(SearchError::EmbeddingUnavailable("service down".into()))
    }
}

/// Deterministic vectors that give every candidate a different score
struct ShapeEmbedder;

#[async_trait]
impl Embedder for ShapeEmbedder {
    fn name(&self) -> &str {
        "shape"
    }

    async fn embed(&self, texts: &[String], _ctx: &RunContext) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, t.split_whitespace().count() as f32, 1.0])
            .collect())
    }
}

struct Scripted(&'static str);

#[async_trait]
impl CompletionClient for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest, _ctx: &RunContext) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct Silent;

#[async_trait]
impl CompletionClient for Silent {
    fn name(&self) -> &str {
        "silent"
    }

    async fn complete(&self, _request: &CompletionRequest, _ctx: &RunContext) -> Result<String> {
        futures::future::pending().await
    }
}

fn registry(providers: Vec<Arc<StubProvider>>) -> ProviderRegistry {
    ProviderRegistry::from_providers(
        providers
            .into_iter()
            .map(|p| p as Arc<dyn SearchProvider>)
            .collect(),
    )
}

fn pipeline(
    settings: &Settings,
    providers: Vec<Arc<StubProvider>>,
    embedder: Option<Arc<dyn Embedder>>,
    completion: Option<Arc<dyn CompletionClient>>,
) -> SearchPipeline {
    SearchPipeline::new(settings, registry(providers), embedder, completion).unwrap()
}

const FIVE: [&str; 5] = [
    "Rust async runtime",
    "Rust ownership explained",
    "Rust error handling",
    "Rust traits in depth",
    "Rust macros guide",
];

#[tokio::test]
async fn test_fallback_serves_when_primary_fails() {
    let primary = StubProvider::new("primary", Behavior::Fail);
    let fallback = StubProvider::new("fallback", Behavior::Titles(FIVE.to_vec()));
    let pipeline = pipeline(&Settings::default(), vec![primary.clone(), fallback.clone()], None, None);

    let response = pipeline.search(SearchRequest::new("rust async")).await;

    assert!(response.is_ok());
    assert_eq!(response.results.len(), 5);
    assert!(response.results.iter().all(|r| r.provider_name == "fallback"));
    assert_eq!(response.providers.len(), 2);
    assert_eq!(response.providers[0].error, Some(ErrorKind::Unavailable));
    assert_eq!(primary.calls(), 1);
    assert_eq!(pipeline.metrics().provider_calls("fallback"), 1);
    assert_eq!(pipeline.pool().in_flight(), 0);
}

#[tokio::test]
async fn test_all_providers_failing_is_reported_not_raised() {
    let pipeline = pipeline(
        &Settings::default(),
        vec![
            StubProvider::new("primary", Behavior::Fail),
            StubProvider::new("fallback", Behavior::Fail),
        ],
        None,
        None,
    );

    let response = pipeline.search(SearchRequest::new("rust")).await;
    assert!(response.results.is_empty());
    assert_eq!(response.error, Some(ErrorKind::NoProvidersAvailable));
    assert!(response.reason.unwrap().contains("primary"));
}

#[tokio::test]
async fn test_embedding_failure_degrades_to_lexical() {
    let pipeline = pipeline(
        &Settings::default(),
        vec![StubProvider::new("primary", Behavior::Titles(FIVE.to_vec()))],
        Some(Arc::new(FailingEmbedder)),
        None,
    );

    let response = pipeline.search(SearchRequest::new("rust async runtime")).await;

    assert!(response.is_ok());
    assert!(response.semantic_degraded);
    assert_eq!(response.results.get("1").unwrap().title, "Rust async runtime");
    for record in &response.results {
        assert_eq!(record.semantic_score, 0.5);
        assert_eq!(record.composite_score, record.lexical_score);
    }
    assert_eq!(pipeline.metrics().semantic_degradations(), 1);
}

#[tokio::test]
async fn test_identical_queries_hit_the_cache() {
    let primary = StubProvider::new("primary", Behavior::Titles(FIVE.to_vec()));
    let pipeline = pipeline(&Settings::default(), vec![primary.clone()], None, None);

    let first = pipeline.search(SearchRequest::new("Rust  traits")).await;
    let second = pipeline.search(SearchRequest::new("rust traits")).await;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.results, second.results);
    assert_eq!(primary.calls(), 1);
    assert_eq!(pipeline.metrics().cache_hits(), 1);

    // different filters are a different entry
    let third = pipeline
        .search(SearchRequest::new("rust traits").with_max_results(2))
        .await;
    assert!(!third.cached);
    assert_eq!(third.results.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_providers_respect_the_budget() {
    let pipeline = pipeline(
        &Settings::default(),
        vec![
            StubProvider::new("primary", Behavior::Hang),
            StubProvider::new("fallback", Behavior::Hang),
        ],
        None,
        None,
    );

    let started = tokio::time::Instant::now();
    let response = pipeline.search(SearchRequest::new("anything")).await;

    assert_eq!(response.error, Some(ErrorKind::NoProvidersAvailable));
    assert!(started.elapsed() <= Duration::from_millis(3050));
    assert!(response.elapsed_ms <= 3050);
    assert_eq!(pipeline.pool().in_flight(), 0);
}

#[tokio::test]
async fn test_tesla_earnings_scenario() {
    let mut settings = Settings::default();
    settings.pipeline.policy = ProviderPolicy::Merge;

    let primary = StubProvider::new(
        "brave",
        Behavior::Titles(vec![
            "Tesla Q3 earnings beat estimates",
            "Tesla deliveries rose in Q3",
            "Tesla margins shrink",
            "Tesla stock jumps after earnings",
            "Musk comments on earnings call",
        ]),
    );
    let fallback = StubProvider::new(
        "searxng",
        Behavior::Titles(vec![
            "tesla q3 earnings beat estimates",
            "TESLA MARGINS SHRINK",
            "Analysts react to Tesla earnings",
            "Tesla energy business grows",
            "Cybertruck ramp update",
        ]),
    );
    let pipeline = pipeline(
        &settings,
        vec![primary, fallback],
        None,
        Some(Arc::new(Scripted(
            "Tesla beat Q3 earnings estimates [1]. Margins were under pressure [3].",
        ))),
    );

    let response = pipeline
        .search(SearchRequest::new("Tesla earnings").with_max_results(5).with_synthesis())
        .await;

    assert!(response.is_ok());
    assert_eq!(response.providers.iter().map(|p| p.result_count).sum::<usize>(), 10);
    assert_eq!(response.results.len(), 5);
    assert!(!response.low_confidence);

    let ids: Vec<_> = response.citations.iter().map(|c| c.citation_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3"]);
    for citation in &response.citations {
        assert!(response.results.get(&citation.citation_id).is_some());
    }

    let markup = response.answer_markup.unwrap();
    assert!(markup.contains(r#"data-citation-id="1""#));
    assert!(markup.contains(r#"data-citation-id="3""#));
}

#[tokio::test]
async fn test_citation_ids_stay_stable_across_cache_hits() {
    let pipeline = pipeline(
        &Settings::default(),
        vec![StubProvider::new("primary", Behavior::Titles(FIVE.to_vec()))],
        None,
        Some(Arc::new(Scripted("Rust has async [2] and macros [9]."))),
    );
    let request = SearchRequest::new("rust").with_synthesis();

    let first = pipeline.search(request.clone()).await;
    let second = pipeline.search(request).await;

    assert!(second.cached);
    assert_eq!(first.answer, second.answer);
    assert_eq!(first.citations, second.citations);
    // the model invented [9]; it never reaches the caller
    assert_eq!(first.answer.as_deref(), Some("Rust has async [2] and macros ."));
    assert_eq!(first.citations.len(), 1);
    assert_eq!(
        first.results.get("2").map(|r| r.url.clone()),
        second.results.get("2").map(|r| r.url.clone())
    );
}

#[tokio::test(start_paused = true)]
async fn test_synthesis_timeout_keeps_results() {
    let pipeline = pipeline(
        &Settings::default(),
        vec![StubProvider::new("primary", Behavior::Titles(FIVE.to_vec()))],
        None,
        Some(Arc::new(Silent)),
    );

    let response = pipeline
        .search(SearchRequest::new("rust").with_synthesis())
        .await;

    assert_eq!(response.results.len(), 5);
    assert!(response.answer.is_none());
    assert!(response.citations.is_empty());
    assert_eq!(response.error, Some(ErrorKind::SynthesisTimeout));
    assert_eq!(pipeline.metrics().synthesis_failures(), 1);

    // results were cached even though the answer failed
    let again = pipeline.search(SearchRequest::new("rust")).await;
    assert!(again.cached);
}

#[tokio::test]
async fn test_cached_results_are_byte_identical() {
    let primary = StubProvider::new(
        "primary",
        Behavior::Titles(vec![
            "Tesla Q3 earnings beat estimates",
            "Tesla deliveries rose in Q3 as earnings season opens",
            "Tesla margins shrink",
            "Tesla stock jumps after earnings call with analysts",
            "Earnings preview",
        ]),
    );
    let pipeline = pipeline(
        &Settings::default(),
        vec![primary.clone()],
        Some(Arc::new(ShapeEmbedder)),
        None,
    );

    let first = pipeline.search(SearchRequest::new("tesla earnings")).await;
    let second = pipeline.search(SearchRequest::new("tesla earnings")).await;

    assert!(!first.semantic_degraded);
    assert!(second.cached);
    assert_eq!(primary.calls(), 1);
    assert_eq!(first.results, second.results);
    assert_eq!(
        serde_json::to_vec(&first.results).unwrap(),
        serde_json::to_vec(&second.results).unwrap()
    );
}

#[tokio::test]
async fn test_failed_synthesis_does_not_requery_providers() {
    let primary = StubProvider::new("primary", Behavior::Titles(FIVE.to_vec()));
    let pipeline = pipeline(&Settings::default(), vec![primary.clone()], None, None);
    let request = SearchRequest::new("rust").with_synthesis();

    let first = pipeline.search(request.clone()).await;
    let second = pipeline.search(request).await;

    assert!(!first.cached);
    assert_eq!(first.error, Some(ErrorKind::Unavailable));
    assert!(second.cached);
    assert_eq!(second.error, Some(ErrorKind::Unavailable));
    assert!(second.answer.is_none());
    assert_eq!(first.results, second.results);
    assert_eq!(primary.calls(), 1);
    assert_eq!(pipeline.metrics().cache_hits(), 1);
    assert_eq!(pipeline.pool().in_flight(), 0);
}

#[tokio::test]
async fn test_cancelled_run_releases_its_lease() {
    let pipeline = pipeline(
        &Settings::default(),
        vec![StubProvider::new("primary", Behavior::Hang)],
        None,
        None,
    );
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let response = pipeline
        .search(SearchRequest::new("rust").with_cancel(cancel))
        .await;

    assert_eq!(response.error, Some(ErrorKind::Cancelled));
    assert_eq!(pipeline.pool().in_flight(), 0);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_final() {
    let pipeline = pipeline(
        &Settings::default(),
        vec![StubProvider::new("primary", Behavior::Titles(FIVE.to_vec()))],
        None,
        None,
    );

    let first = pipeline.shutdown().await;
    let second = pipeline.shutdown().await;
    assert!(!first.already_closed);
    assert!(first.drained());
    assert!(second.already_closed);

    let response = pipeline.search(SearchRequest::new("rust")).await;
    assert_eq!(response.error, Some(ErrorKind::Unavailable));
}

#[tokio::test]
async fn test_empty_query_short_circuits() {
    let primary = StubProvider::new("primary", Behavior::Titles(FIVE.to_vec()));
    let pipeline = pipeline(&Settings::default(), vec![primary.clone()], None, None);

    let response = pipeline.search(SearchRequest::new("   ")).await;
    assert!(response.results.is_empty());
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn test_http_pipeline_from_settings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/searxng"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                { "title": "Rust 1.80 released", "url": "https://blog.rust-lang.org/", "content": "New release of Rust" },
                { "title": "Rust in the kernel", "url": "https://lwn.net/rust", "content": "Linux adopts Rust" },
                { "title": "Why Rust", "url": "https://example.org/why", "content": "Memory safety" }
            ]
        })))
        .mount(&server)
        .await;

    let settings = Settings {
        providers: vec![
            ProviderConfig {
                name: "primary".into(),
                kind: "json".into(),
                base_url: format!("{}/primary", server.uri()),
                ..Default::default()
            },
            ProviderConfig {
                name: "searxng".into(),
                kind: "searxng".into(),
                base_url: format!("{}/searxng", server.uri()),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let pipeline = SearchPipeline::from_settings(&settings).unwrap();
    let response = pipeline.search(SearchRequest::new("rust release")).await;

    assert!(response.is_ok());
    assert_eq!(response.results.len(), 3);
    assert_eq!(response.results.get("1").unwrap().title, "Rust 1.80 released");
    assert!(response.semantic_degraded);
    assert_eq!(pipeline.metrics().reliability("primary"), 0.0);

    pipeline.shutdown().await;
}

#[test]
fn test_invalid_durations_are_config_errors() {
    let mut settings = Settings::default();
    settings.providers[0].timeout = Some(-1.0);
    assert!(matches!(
        SearchPipeline::from_settings(&settings),
        Err(SearchError::Config(_))
    ));

    let mut settings = Settings::default();
    settings.outgoing.connect_timeout = f64::NAN;
    assert!(matches!(
        SearchPipeline::new(&settings, ProviderRegistry::new(), None, None),
        Err(SearchError::Config(_))
    ));
}
