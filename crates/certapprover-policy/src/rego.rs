//! Rego-backed policy engine
//!
//! Modules are parsed once by [`RegoPolicy::compile`]. Every evaluation runs
//! on a private clone of the prepared engine inside a blocking task, so
//! concurrent evaluations never share interpreter state.

use crate::engine::{Decision, PolicyEngine};
use crate::error::{PolicyError, Result};
use crate::input::PolicyInput;
use crate::sources::PolicySources;
use async_trait::async_trait;
use regorus::{Engine, QueryResults, Value};
use tracing::{debug, info};

/// Package and rule queried for a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyQuery {
    pub package: String,
    pub rule: String,
}

impl Default for PolicyQuery {
    fn default() -> Self {
        Self {
            package: "approval".to_string(),
            rule: "allow".to_string(),
        }
    }
}

impl PolicyQuery {
    /// Fully qualified query, e.g. `data.approval.allow`
    pub fn as_query(&self) -> String {
        format!("data.{}.{}", self.package, self.rule)
    }
}

/// Compiled Rego program
#[derive(Clone)]
pub struct RegoPolicy {
    engine: Engine,
    query: PolicyQuery,
    modules: Vec<String>,
}

impl std::fmt::Debug for RegoPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegoPolicy")
            .field("query", &self.query)
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}

impl RegoPolicy {
    /// Compile sources against the default `data.approval.allow` query
    pub fn compile(sources: &PolicySources) -> Result<Self> {
        Self::compile_with_query(sources, PolicyQuery::default())
    }

    /// Compile sources against a custom query.
    ///
    /// The prepared program is evaluated once with an empty input so that
    /// errors the parser cannot catch still fail at startup.
    pub fn compile_with_query(sources: &PolicySources, query: PolicyQuery) -> Result<Self> {
        if sources.is_empty() {
            return Err(PolicyError::Compile {
                module: "<none>".to_string(),
                reason: "no policy modules given".to_string(),
            });
        }

        let mut engine = Engine::new();
        for (name, source) in sources.iter() {
            engine
                .add_policy(name.clone(), source.clone())
                .map_err(|e| PolicyError::Compile {
                    module: name.clone(),
                    reason: e.to_string(),
                })?;
        }

        let policy = Self {
            engine,
            query,
            modules: sources.names(),
        };

        policy
            .evaluate_json("{}".to_string())
            .map_err(|e| PolicyError::Compile {
                module: policy.modules.join(","),
                reason: e.to_string(),
            })?;

        info!(
            modules = ?policy.modules,
            query = %policy.query.as_query(),
            "Compiled approval policy"
        );

        Ok(policy)
    }

    fn evaluate_json(&self, input_json: String) -> Result<Decision> {
        run_query(self.engine.clone(), self.query.as_query(), input_json)
    }
}

fn run_query(mut engine: Engine, query: String, input_json: String) -> Result<Decision> {
    let input = Value::from_json_str(&input_json).map_err(|e| PolicyError::Input {
        reason: e.to_string(),
    })?;
    engine.set_input(input);

    let results = engine
        .eval_query(query, false)
        .map_err(|e| PolicyError::Evaluation {
            reason: e.to_string(),
        })?;

    Ok(Decision::from(is_allowed(&results)))
}

/// A single result holding a single expression that is literally `true`.
fn is_allowed(results: &QueryResults) -> bool {
    match results.result.as_slice() {
        [result] => matches!(
            result.expressions.as_slice(),
            [expression] if matches!(expression.value, Value::Bool(true))
        ),
        _ => false,
    }
}

#[async_trait]
impl PolicyEngine for RegoPolicy {
    async fn evaluate(&self, input: &PolicyInput<'_>) -> Result<Decision> {
        let input_json = input.to_json()?;
        let engine = self.engine.clone();
        let query = self.query.as_query();

        let decision = tokio::task::spawn_blocking(move || run_query(engine, query, input_json))
            .await
            .map_err(|e| PolicyError::Evaluation {
                reason: format!("evaluation task failed: {}", e),
            })??;

        debug!(
            request = %input.object.key(),
            allowed = decision.is_allowed(),
            "Policy evaluation result"
        );

        Ok(decision)
    }

    fn modules(&self) -> Vec<String> {
        self.modules.clone()
    }
}
