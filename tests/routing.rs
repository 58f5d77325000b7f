#![allow(missing_docs)]

//! Routing scenarios: chain order, quota fallback, abort semantics, and
//! availability filtering.

mod common;

use common::*;

use chrono::{Duration, Utc};

use genrelay::{
    error::AppError,
    models::{
        MediaOptions, RequestConstraints, RoutePreferences, RoutingTier, SimpleRequest, Worker,
    },
    selector::Selector,
};

fn text_request(prompt: &str) -> SimpleRequest {
    SimpleRequest {
        worker: Worker::TextGen,
        prompt: prompt.to_string(),
        options: MediaOptions {
            // The scenarios below exercise the standard chain.
            routing_tier: RoutingTier::Code,
            ..MediaOptions::default()
        },
        constraints: RequestConstraints::default(),
        preferences: RoutePreferences::default(),
        request_id: Some("test-request".to_string()),
    }
}

#[tokio::test]
async fn success_on_primary_stops_the_chain() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool.clone());

    let adapter_a = ScriptedAdapter::new("provider-a", vec![Worker::TextGen], vec![Scripted::Text("ok")]);
    let adapter_b = ScriptedAdapter::new("provider-b", vec![Worker::TextGen], vec![Scripted::Text("never")]);
    let router = test_router(registry.clone(), vec![adapter_a.clone(), adapter_b.clone()]);

    let response = router.route(&text_request("say ok")).await?;

    assert!(response.success);
    assert_eq!(response.attempted_providers, vec!["provider-a"]);
    let result = &response.results["result"];
    assert_eq!(result["provider"], "provider-a");
    assert_eq!(result["text"], "ok");
    assert_eq!(adapter_b.calls(), 0);

    let status = registry.get_status("provider-a").await?;
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.healthy);

    Ok(())
}

#[tokio::test]
async fn quota_error_exhausts_provider_and_falls_back() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool.clone());

    let adapter_a = ScriptedAdapter::new(
        "provider-a",
        vec![Worker::TextGen],
        vec![Scripted::Error(
            "request failed with status 429: you exceeded your current quota",
        )],
    );
    let adapter_b =
        ScriptedAdapter::new("provider-b", vec![Worker::TextGen], vec![Scripted::Text("ok")]);
    let router = test_router(registry.clone(), vec![adapter_a, adapter_b]);

    let before = Utc::now();
    let response = router.route(&text_request("say ok")).await?;

    assert!(response.success);
    assert_eq!(
        response.attempted_providers,
        vec!["provider-a", "provider-b"]
    );
    assert_eq!(response.results["result"]["provider"], "provider-b");
    assert_eq!(response.meta.len(), 2);
    assert!(!response.meta[0].success);
    assert!(response.meta[1].success);

    // The quota cooldown (60 min here) puts the deadline strictly in the
    // future, which removes the provider from availability.
    let status = registry.get_status("provider-a").await?;
    let until = status.marked_exhausted_until.expect("deadline set");
    assert!(until > before + Duration::minutes(55));
    assert!(until < before + Duration::minutes(65));

    let available = registry.get_available_providers(Worker::TextGen).await?;
    assert!(available.iter().all(|p| p.id != "provider-a"));
    assert!(available.iter().any(|p| p.id == "provider-b"));

    Ok(())
}

#[tokio::test]
async fn bad_request_aborts_the_chain() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool.clone());

    let adapter_a = ScriptedAdapter::new(
        "provider-a",
        vec![Worker::TextGen],
        vec![Scripted::Error(
            "request failed with status 400: missing field",
        )],
    );
    let adapter_b =
        ScriptedAdapter::new("provider-b", vec![Worker::TextGen], vec![Scripted::Text("never")]);
    let router = test_router(registry.clone(), vec![adapter_a, adapter_b.clone()]);

    let response = router.route(&text_request("broken")).await?;

    assert!(!response.success);
    assert_eq!(response.attempted_providers, vec!["provider-a"]);
    assert_eq!(adapter_b.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn transient_errors_advance_through_the_whole_chain() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool.clone());

    let adapter_a = ScriptedAdapter::new(
        "provider-a",
        vec![Worker::TextGen],
        vec![Scripted::Error("connection reset by peer")],
    );
    let adapter_b = ScriptedAdapter::new(
        "provider-b",
        vec![Worker::TextGen],
        vec![Scripted::Error("request failed with status 503: Service Unavailable")],
    );
    let router = test_router(registry.clone(), vec![adapter_a, adapter_b]);

    let response = router.route(&text_request("hello")).await?;

    assert!(!response.success);
    assert_eq!(
        response.attempted_providers,
        vec!["provider-a", "provider-b"]
    );
    let error = response.error.expect("error message");
    assert!(error.contains("All providers failed"));

    let status = registry.get_status("provider-a").await?;
    assert_eq!(status.consecutive_failures, 1);

    Ok(())
}

#[tokio::test]
async fn empty_prompt_fails_before_any_dispatch() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool.clone());

    let adapter_a =
        ScriptedAdapter::new("provider-a", vec![Worker::TextGen], vec![Scripted::Text("never")]);
    let router = test_router(registry, vec![adapter_a.clone()]);

    let err = router
        .route(&text_request("   "))
        .await
        .expect_err("should reject");
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(err.code(), "INVALID_REQUEST");
    assert_eq!(adapter_a.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn local_provider_without_base_url_is_filtered() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_worker(&pool, Worker::TextGen).await?;
    // No base endpoint and no URL-bearing credential.
    seed_provider(&pool, "local-box", "local", None, Some("MISSING_URL"), 1).await?;
    seed_worker_provider(&pool, Worker::TextGen, "local-box", 1).await?;
    seed_model(&pool, "local-model", "local-box", Worker::TextGen, &["text"], 1).await?;

    let registry = test_registry(pool.clone());
    let available = registry.get_available_providers(Worker::TextGen).await?;
    assert!(available.is_empty());

    let selector = Selector::new(registry);
    let err = selector
        .build_chain(
            Worker::TextGen,
            &RequestConstraints::default(),
            &RoutePreferences::default(),
        )
        .await
        .expect_err("empty chain");
    assert!(matches!(err, AppError::NoAvailableProvider));

    Ok(())
}

#[tokio::test]
async fn chain_only_contains_credentialed_providers() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_worker(&pool, Worker::TextGen).await?;
    seed_provider(&pool, "provider-a", "api", Some("https://a.example"), Some("TEST_KEY_A"), 1)
        .await?;
    // Credential name that the test credential set does not carry.
    seed_provider(&pool, "provider-x", "api", Some("https://x.example"), Some("MISSING_KEY"), 2)
        .await?;
    seed_worker_provider(&pool, Worker::TextGen, "provider-a", 1).await?;
    seed_worker_provider(&pool, Worker::TextGen, "provider-x", 2).await?;
    seed_model(&pool, "model-a", "provider-a", Worker::TextGen, &["text"], 1).await?;
    seed_model(&pool, "model-x", "provider-x", Worker::TextGen, &["text"], 1).await?;

    let registry = test_registry(pool);
    let selector = Selector::new(registry);
    let chain = selector
        .build_chain(
            Worker::TextGen,
            &RequestConstraints::default(),
            &RoutePreferences::default(),
        )
        .await?;

    assert!(!chain.is_empty());
    assert!(chain.iter().all(|entry| entry.provider.id == "provider-a"));

    Ok(())
}

#[tokio::test]
async fn exclude_constraint_drops_provider() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool);

    let adapter_b =
        ScriptedAdapter::new("provider-b", vec![Worker::TextGen], vec![Scripted::Text("ok")]);
    let adapter_a =
        ScriptedAdapter::new("provider-a", vec![Worker::TextGen], vec![Scripted::Text("wrong")]);
    let router = test_router(registry, vec![adapter_a.clone(), adapter_b]);

    let mut request = text_request("hello");
    request.constraints.exclude_providers = vec!["provider-a".to_string()];
    let response = router.route(&request).await?;

    assert!(response.success);
    assert_eq!(response.results["result"]["provider"], "provider-b");
    assert_eq!(adapter_a.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn preferred_provider_reorders_the_chain() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool);

    let adapter_a =
        ScriptedAdapter::new("provider-a", vec![Worker::TextGen], vec![Scripted::Text("from-a")]);
    let adapter_b =
        ScriptedAdapter::new("provider-b", vec![Worker::TextGen], vec![Scripted::Text("from-b")]);
    let router = test_router(registry, vec![adapter_a, adapter_b]);

    let mut request = text_request("hello");
    request.preferences.provider = Some("provider-b".to_string());
    let response = router.route(&request).await?;

    assert!(response.success);
    assert_eq!(response.results["result"]["provider"], "provider-b");
    assert_eq!(response.attempted_providers, vec!["provider-b"]);

    Ok(())
}

#[tokio::test]
async fn capability_lookup_requires_every_tag() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_worker(&pool, Worker::TextGen).await?;
    seed_provider(&pool, "provider-a", "api", Some("https://a.example"), Some("TEST_KEY_A"), 1)
        .await?;
    seed_worker_provider(&pool, Worker::TextGen, "provider-a", 1).await?;
    seed_model(&pool, "plain", "provider-a", Worker::TextGen, &["text"], 1).await?;
    seed_model(
        &pool,
        "reasoner",
        "provider-a",
        Worker::TextGen,
        &["text", "reasoning", "code"],
        2,
    )
    .await?;

    let registry = test_registry(pool);

    let worker = registry
        .get_worker(Worker::TextGen)
        .await?
        .expect("worker row");
    assert!(worker.enabled);

    let matches = registry
        .find_models_by_capability(
            Worker::TextGen,
            &["text".to_string(), "reasoning".to_string()],
        )
        .await?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "reasoner");

    let all = registry
        .find_models_by_capability(Worker::TextGen, &[])
        .await?;
    assert_eq!(all.len(), 2);

    Ok(())
}

#[tokio::test]
async fn unknown_preferred_model_is_not_found() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool);

    let adapter_a =
        ScriptedAdapter::new("provider-a", vec![Worker::TextGen], vec![Scripted::Text("never")]);
    let router = test_router(registry, vec![adapter_a]);

    let mut request = text_request("hello");
    request.preferences.model = Some("ghost-model".to_string());
    let err = router.route(&request).await.expect_err("should reject");
    assert_eq!(err.code(), "MODEL_NOT_FOUND");

    Ok(())
}

#[tokio::test]
async fn preferred_model_must_serve_the_worker() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    seed_worker(&pool, Worker::ImageGen).await?;
    seed_model(&pool, "image-only", "provider-a", Worker::ImageGen, &["image"], 1).await?;
    let registry = test_registry(pool);

    let adapter_a =
        ScriptedAdapter::new("provider-a", vec![Worker::TextGen], vec![Scripted::Text("never")]);
    let router = test_router(registry, vec![adapter_a]);

    let mut request = text_request("hello");
    request.preferences.model = Some("image-only".to_string());
    let err = router.route(&request).await.expect_err("should reject");
    assert_eq!(err.code(), "INVALID_MODEL_CAPABILITY");

    Ok(())
}

#[tokio::test]
async fn five_failures_flip_the_healthy_flag() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool);

    for _ in 0..5 {
        registry.increment_provider_failures("provider-a").await?;
    }
    let status = registry.get_status("provider-a").await?;
    assert_eq!(status.consecutive_failures, 5);
    assert!(!status.healthy);

    // Any success resets the counter and the flag.
    registry.mark_provider_healthy("provider-a").await?;
    let status = registry.get_status("provider-a").await?;
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.healthy);
    assert!(status.marked_exhausted_until.is_none());

    Ok(())
}
