//! The workflow DAG engine.
//!
//! Steps are batched into execution groups: an explicit `parallel_groups`
//! partition is respected verbatim, otherwise groups are derived by
//! topological batching over `input_from` references. Groups run
//! sequentially; the steps inside one group run concurrently and never read
//! each other's outputs.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use futures::future::join_all;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    error::AppError,
    models::{
        RequestConstraints, RouterResponse, SimpleRequest, WorkflowDefinition, WorkflowStep,
    },
    router::SimpleRouter,
};

/// Executes workflow definitions against the simple router.
#[derive(Clone, Debug)]
pub struct WorkflowEngine {
    router: SimpleRouter,
}

impl WorkflowEngine {
    /// Creates an engine dispatching through the given router.
    pub fn new(router: SimpleRouter) -> Self {
        Self { router }
    }

    /// Runs a workflow with the given request variables. Returns an envelope
    /// whose `results` are keyed by each step's `output_key`; on a step
    /// failure the envelope is a failure carrying the partial results.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        variables: &HashMap<String, serde_json::Value>,
        constraints: &RequestConstraints,
    ) -> Result<RouterResponse, AppError> {
        let groups = execution_groups(definition)?;

        let mut context: HashMap<String, serde_json::Value> = variables.clone();
        let mut results: HashMap<String, serde_json::Value> = HashMap::new();
        let mut attempted_providers: Vec<String> = Vec::new();
        let mut meta = Vec::new();

        for group in &groups {
            let steps: Vec<&WorkflowStep> = group
                .iter()
                .filter_map(|id| definition.steps.iter().find(|step| &step.id == id))
                .collect();

            info!(
                workflow = %definition.id,
                steps = ?group,
                "Executing workflow group"
            );

            let futures = steps.iter().map(|step| {
                let prompt = expand_template(&step.prompt_template, &context);
                let merged = step
                    .constraints
                    .as_ref()
                    .map_or_else(|| constraints.clone(), |own| constraints.merged_with(own));
                let request = SimpleRequest {
                    worker: step.worker,
                    prompt,
                    options: step.options.clone().unwrap_or_default(),
                    constraints: merged,
                    preferences: Default::default(),
                    request_id: Some(format!("{}:{}", definition.id, step.id)),
                };
                async move { self.router.route(&request).await }
            });

            let outcomes = join_all(futures).await;

            for (step, outcome) in steps.iter().zip(outcomes) {
                let envelope = match outcome {
                    Ok(envelope) => envelope,
                    Err(err) => {
                        return Ok(step_failure(
                            step,
                            &err.to_string(),
                            results,
                            attempted_providers,
                            meta,
                        ));
                    }
                };

                attempted_providers.extend(envelope.attempted_providers.clone());
                for mut entry in envelope.meta.clone() {
                    entry.step = step.output_key.clone();
                    meta.push(entry);
                }

                if !envelope.success {
                    let error = envelope
                        .error
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Ok(step_failure(
                        step,
                        &error,
                        results,
                        attempted_providers,
                        meta,
                    ));
                }

                let value = step_output_value(&envelope);
                drop(context.insert(step.output_key.clone(), value.clone()));
                drop(results.insert(step.output_key.clone(), value));
            }
        }

        Ok(RouterResponse {
            success: true,
            results,
            error: None,
            attempted_providers,
            meta,
        })
    }
}

/// The value a step contributes to later templates and the result envelope:
/// trimmed text for text payloads, the full result object otherwise.
fn step_output_value(envelope: &RouterResponse) -> serde_json::Value {
    let Some(result) = envelope.results.get("result") else {
        return serde_json::Value::Null;
    };
    if let Some(text) = result.get("text").and_then(serde_json::Value::as_str) {
        return serde_json::Value::String(text.trim().to_string());
    }
    result.clone()
}

fn step_failure(
    step: &WorkflowStep,
    error: &str,
    results: HashMap<String, serde_json::Value>,
    attempted_providers: Vec<String>,
    meta: Vec<crate::models::StepMeta>,
) -> RouterResponse {
    RouterResponse {
        success: false,
        results,
        error: Some(format!("Step {} failed: {error}", step.id)),
        attempted_providers,
        meta,
    }
}

/// Computes the execution groups for a definition.
///
/// An explicit `parallel_groups` partition is used verbatim. Otherwise steps
/// are batched topologically: each pass collects every unfinished step whose
/// dependency is the request or an already-completed step. A pass that makes
/// no progress means the dependencies cannot be resolved.
pub fn execution_groups(definition: &WorkflowDefinition) -> Result<Vec<Vec<String>>, AppError> {
    if let Some(groups) = &definition.parallel_groups {
        return Ok(groups.clone());
    }

    let mut completed: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&WorkflowStep> = definition.steps.iter().collect();
    let mut groups = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&WorkflowStep>, Vec<&WorkflowStep>) =
            remaining.into_iter().partition(|step| {
                step.depends_on()
                    .map_or(true, |dependency| completed.contains(dependency))
            });

        if ready.is_empty() {
            return Err(AppError::Validation(
                "Cannot resolve workflow dependencies".into(),
            ));
        }

        for step in &ready {
            let _ = completed.insert(step.id.as_str());
        }
        groups.push(ready.iter().map(|step| step.id.clone()).collect());
        remaining = blocked;
    }

    Ok(groups)
}

/// Expands `{{name}}` placeholders from the context. Defined names are
/// replaced by their stringified values; unknown names stay literal and are
/// logged. Pure substitution, not a template language.
pub fn expand_template(
    template: &str,
    context: &HashMap<String, serde_json::Value>,
) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let pattern = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("static regex"));

    pattern
        .replace_all(template, |captures: &regex::Captures<'_>| {
            let name = &captures[1];
            match context.get(name) {
                Some(value) => stringify(value),
                None => {
                    warn!(placeholder = name, "Unresolved template placeholder");
                    captures[0].to_string()
                }
            }
        })
        .into_owned()
}

fn stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Worker;
    use serde_json::json;

    fn step(id: &str, input_from: Option<&str>) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            worker: Worker::TextGen,
            prompt_template: String::new(),
            output_key: format!("{id}_out"),
            input_from: input_from.map(str::to_string),
            constraints: None,
            options: None,
        }
    }

    fn definition(steps: Vec<WorkflowStep>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: "test".into(),
            name: "test".into(),
            description: None,
            steps,
            parallel_groups: None,
        }
    }

    #[test]
    fn explicit_groups_are_used_verbatim() {
        let mut def = definition(vec![step("a", None), step("b", None)]);
        def.parallel_groups = Some(vec![vec!["a".into()], vec!["b".into()]]);
        let groups = execution_groups(&def).expect("groups");
        assert_eq!(groups, vec![vec!["a".to_string()], vec!["b".to_string()]]);
    }

    #[test]
    fn independent_steps_share_the_first_group() {
        let def = definition(vec![
            step("a", Some("request")),
            step("b", None),
            step("c", Some("step:a")),
        ]);
        let groups = execution_groups(&def).expect("groups");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(groups[1], vec!["c".to_string()]);
    }

    #[test]
    fn chains_produce_one_group_per_link() {
        let def = definition(vec![
            step("a", Some("request")),
            step("b", Some("step:a")),
            step("c", Some("step:b")),
        ]);
        let groups = execution_groups(&def).expect("groups");
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn unresolvable_dependencies_fail() {
        let def = definition(vec![step("a", Some("step:ghost"))]);
        let err = execution_groups(&def).expect_err("should fail");
        assert!(err.to_string().contains("Cannot resolve workflow dependencies"));
    }

    #[test]
    fn cyclic_dependencies_fail() {
        let def = definition(vec![step("a", Some("step:b")), step("b", Some("step:a"))]);
        assert!(execution_groups(&def).is_err());
    }

    #[test]
    fn defined_placeholders_expand() {
        let mut context = HashMap::new();
        drop(context.insert("topic".to_string(), json!("birds")));
        drop(context.insert("count".to_string(), json!(3)));
        assert_eq!(
            expand_template("{{count}} facts about {{topic}}", &context),
            "3 facts about birds"
        );
    }

    #[test]
    fn unknown_placeholders_stay_literal() {
        let context = HashMap::new();
        assert_eq!(
            expand_template("hello {{missing}}", &context),
            "hello {{missing}}"
        );
    }

    #[test]
    fn whitespace_inside_braces_is_tolerated() {
        let mut context = HashMap::new();
        drop(context.insert("name".to_string(), json!("sol")));
        assert_eq!(expand_template("hi {{ name }}", &context), "hi sol");
    }

    #[test]
    fn text_step_output_is_trimmed_text() {
        let mut results = HashMap::new();
        drop(results.insert(
            "result".to_string(),
            json!({"provider":"a","model":"m","kind":"text","text":"  body  ","tokens_used":5}),
        ));
        let envelope = RouterResponse {
            success: true,
            results,
            error: None,
            attempted_providers: vec![],
            meta: vec![],
        };
        assert_eq!(step_output_value(&envelope), json!("body"));
    }
}
