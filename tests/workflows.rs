#![allow(missing_docs)]

//! Workflow engine scenarios: parallel leaves, chained templates, partial
//! results, and definition round-trips.

mod common;

use common::*;

use std::collections::HashMap;

use genrelay::{
    models::{RequestConstraints, Worker, WorkflowDefinition, WorkflowStep},
    registry::builtin_workflows,
    workflow::WorkflowEngine,
};
use serde_json::json;

async fn seed_media_catalog(pool: &genrelay::database::DbPool) -> anyhow::Result<()> {
    seed_text_catalog(pool).await?;
    seed_worker(pool, Worker::ImageGen).await?;
    seed_provider(pool, "image-box", "api", Some("https://img.example"), Some("TEST_KEY_A"), 1)
        .await?;
    seed_worker_provider(pool, Worker::ImageGen, "image-box", 1).await?;
    seed_model(pool, "image-model", "image-box", Worker::ImageGen, &["image"], 1).await?;
    Ok(())
}

fn step(id: &str, worker: Worker, template: &str, output_key: &str, input_from: Option<&str>) -> WorkflowStep {
    WorkflowStep {
        id: id.to_string(),
        worker,
        prompt_template: template.to_string(),
        output_key: output_key.to_string(),
        input_from: input_from.map(str::to_string),
        constraints: None,
        options: None,
    }
}

#[tokio::test]
async fn parallel_leaves_both_complete() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_media_catalog(&pool).await?;
    let registry = test_registry(pool);

    let text = ScriptedAdapter::new(
        "provider-a",
        vec![Worker::TextGen],
        vec![Scripted::Text("Big birds, bigger ideas.")],
    );
    let image = ImageUrlAdapter::new("image-box", "https://img.example/post.png");
    let router = test_router(registry, vec![text, image]);
    let engine = WorkflowEngine::new(router);

    let definition = WorkflowDefinition {
        id: "social-post".into(),
        name: "Social post".into(),
        description: None,
        steps: vec![
            step(
                "generate-copy",
                Worker::TextGen,
                "Write a short, punchy {{platform}} post about {{topic}}.",
                "post_text",
                Some("request"),
            ),
            step(
                "generate-image",
                Worker::ImageGen,
                "Illustration about {{topic}}",
                "post_image",
                Some("request"),
            ),
        ],
        parallel_groups: Some(vec![vec![
            "generate-copy".to_string(),
            "generate-image".to_string(),
        ]]),
    };

    let mut variables = HashMap::new();
    drop(variables.insert("platform".to_string(), json!("X")));
    drop(variables.insert("topic".to_string(), json!("birds")));

    let response = engine
        .execute(&definition, &variables, &RequestConstraints::default())
        .await?;

    assert!(response.success, "error: {:?}", response.error);
    assert_eq!(response.results["post_text"], json!("Big birds, bigger ideas."));
    assert_eq!(
        response.results["post_image"]["url"],
        json!("https://img.example/post.png")
    );

    Ok(())
}

#[tokio::test]
async fn chained_steps_see_prior_outputs_verbatim() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_media_catalog(&pool).await?;
    let registry = test_registry(pool);

    let text = ScriptedAdapter::new(
        "provider-a",
        vec![Worker::TextGen],
        vec![
            Scripted::Text("  The migration patterns of arctic terns.  "),
            Scripted::Text("A tern flying over icy water"),
        ],
    );
    let image = ImageUrlAdapter::new("image-box", "https://img.example/tern.png");
    let router = test_router(registry, vec![text.clone(), image]);
    let engine = WorkflowEngine::new(router);

    let definition = WorkflowDefinition {
        id: "blog-with-image".into(),
        name: "Blog with image".into(),
        description: None,
        steps: vec![
            step(
                "write-article",
                Worker::TextGen,
                "Write an article about {{topic}}",
                "article",
                Some("request"),
            ),
            step(
                "create-image-prompt",
                Worker::TextGen,
                "Image prompt for: {{article}}",
                "image_prompt",
                Some("step:write-article"),
            ),
            step(
                "generate-featured-image",
                Worker::ImageGen,
                "{{image_prompt}}",
                "featured_image",
                Some("step:create-image-prompt"),
            ),
        ],
        parallel_groups: None,
    };

    let mut variables = HashMap::new();
    drop(variables.insert("topic".to_string(), json!("terns")));

    let response = engine
        .execute(&definition, &variables, &RequestConstraints::default())
        .await?;

    assert!(response.success, "error: {:?}", response.error);
    assert_eq!(
        response.results["article"],
        json!("The migration patterns of arctic terns.")
    );

    // The second step's expanded prompt embeds the first step's trimmed
    // output verbatim.
    let prompts = text.prompts.lock().expect("prompts");
    assert_eq!(
        prompts[1],
        "Image prompt for: The migration patterns of arctic terns."
    );

    Ok(())
}

#[tokio::test]
async fn failing_step_stops_the_workflow_with_partial_results() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_media_catalog(&pool).await?;
    let registry = test_registry(pool);

    let text = ScriptedAdapter::new(
        "provider-a",
        vec![Worker::TextGen],
        vec![
            Scripted::Text("The article body."),
            Scripted::Error("request failed with status 400: prompt rejected"),
        ],
    );
    let image = ImageUrlAdapter::new("image-box", "https://img.example/unused.png");
    let router = test_router(registry, vec![text, image]);
    let engine = WorkflowEngine::new(router.clone());

    let definition = WorkflowDefinition {
        id: "blog-with-image".into(),
        name: "Blog with image".into(),
        description: None,
        steps: vec![
            step(
                "write-article",
                Worker::TextGen,
                "Write about {{topic}}",
                "article",
                Some("request"),
            ),
            step(
                "create-image-prompt",
                Worker::TextGen,
                "Prompt for {{article}}",
                "image_prompt",
                Some("step:write-article"),
            ),
            step(
                "generate-featured-image",
                Worker::ImageGen,
                "{{image_prompt}}",
                "featured_image",
                Some("step:create-image-prompt"),
            ),
        ],
        parallel_groups: None,
    };

    let mut variables = HashMap::new();
    drop(variables.insert("topic".to_string(), json!("terns")));

    let response = engine
        .execute(&definition, &variables, &RequestConstraints::default())
        .await?;

    assert!(!response.success);
    let error = response.error.expect("error");
    assert!(error.starts_with("Step create-image-prompt failed:"), "{error}");
    assert_eq!(response.results["article"], json!("The article body."));
    assert!(!response.results.contains_key("featured_image"));

    Ok(())
}

#[tokio::test]
async fn unknown_placeholders_survive_expansion() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    seed_text_catalog(&pool).await?;
    let registry = test_registry(pool);

    let text = ScriptedAdapter::new(
        "provider-a",
        vec![Worker::TextGen],
        vec![Scripted::Text("done")],
    );
    let router = test_router(registry, vec![text.clone()]);
    let engine = WorkflowEngine::new(router);

    let definition = WorkflowDefinition {
        id: "loose".into(),
        name: "loose".into(),
        description: None,
        steps: vec![step(
            "only",
            Worker::TextGen,
            "Known {{topic}}, unknown {{mystery}}",
            "out",
            None,
        )],
        parallel_groups: None,
    };

    let mut variables = HashMap::new();
    drop(variables.insert("topic".to_string(), json!("value")));

    let response = engine
        .execute(&definition, &variables, &RequestConstraints::default())
        .await?;
    assert!(response.success);

    let prompts = text.prompts.lock().expect("prompts");
    assert_eq!(prompts[0], "Known value, unknown {{mystery}}");

    Ok(())
}

#[tokio::test]
async fn definitions_round_trip_through_the_registry() -> anyhow::Result<()> {
    let pool = memory_pool().await?;
    let registry = test_registry(pool);

    for builtin in builtin_workflows() {
        registry.save_workflow(&builtin).await?;

        let listed = registry.list_workflows().await?;
        assert!(listed.iter().any(|wf| wf.id == builtin.id));

        let loaded = registry
            .get_workflow(&builtin.id)
            .await?
            .expect("definition exists");
        assert_eq!(
            serde_json::to_value(&loaded)?,
            serde_json::to_value(&builtin)?,
        );
    }

    Ok(())
}
