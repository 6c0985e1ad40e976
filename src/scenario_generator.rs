//! Endpoint planning and chunked, strictly sequential scenario generation.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::brd::{Brd, BrdRequirement};
use crate::combination::{self, Combination};
use crate::config::AlgorithmConfig;
use crate::domain::{DomainBuilder, ValueDomain};
use crate::error_handler::{ErrorHandler, IssueKind, ProcessingIssue};
use crate::gherkin::{GherkinParser, ScenarioRow};
use crate::llm::{estimate_tokens, TextGenerator};
use crate::metrics::LlmUsage;
use crate::progress::ChunkProgress;
use crate::retry::RetryPolicy;
use crate::schema::{ApiSchema, Endpoint, EndpointKey};
use crate::template_engine::{PromptTemplates, GHERKIN_SCENARIOS, GHERKIN_SYSTEM_PROMPT};

/// Combinations listed per endpoint in a compact prompt.
const COMPACT_COMBINATIONS: usize = 5;

/// Everything the prompt needs to know about one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointPlan {
    pub endpoint: Endpoint,
    /// `(location.name, domain)` in parameter order.
    pub domains: Vec<(String, ValueDomain)>,
    pub combinations: Vec<Combination>,
    pub requirements: Vec<BrdRequirement>,
}

impl EndpointPlan {
    pub fn key(&self) -> EndpointKey {
        self.endpoint.key()
    }

    /// Feature name the model is asked to use: `GET /pets`.
    pub fn feature_name(&self) -> String {
        self.key().to_string()
    }

    fn domain_for(&self, parameter_key: &str) -> Option<&ValueDomain> {
        self.domains
            .iter()
            .find(|(key, _)| key == parameter_key)
            .map(|(_, domain)| domain)
    }
}

/// Builds domains and combinations for every endpoint. Placeholder domains
/// that stand in for unusable constraints are recorded as issues.
pub fn plan_endpoints(
    endpoints: &[Endpoint],
    brd: Option<&Brd>,
    builder: &DomainBuilder,
    errors: &mut ErrorHandler,
) -> Vec<EndpointPlan> {
    endpoints
        .iter()
        .map(|endpoint| {
            let key = endpoint.key();
            let domains: Vec<(String, ValueDomain)> = endpoint
                .parameters
                .iter()
                .map(|param| {
                    let domain = builder.build(param);
                    if let Some(reason) = &domain.fallback_reason {
                        errors.record(
                            IssueKind::ConstraintFallback,
                            Some(format!("{} {}", key, param.key())),
                            format!("placeholder value used: {}", reason),
                        );
                    }
                    (param.key(), domain)
                })
                .collect();
            let combinations = combination::generate(&domains);
            let requirements = brd
                .map(|brd| brd.requirements_for(&key).into_iter().cloned().collect())
                .unwrap_or_default();
            debug!(endpoint = %key, parameters = domains.len(), combinations = combinations.len(), "endpoint planned");

            EndpointPlan {
                endpoint: endpoint.clone(),
                domains,
                combinations,
                requirements,
            }
        })
        .collect()
}

/// One chunk when `len <= threshold`, otherwise chunks of `chunk_size`.
pub fn chunk_plans(plans: &[EndpointPlan], chunk_size: usize, threshold: usize) -> Vec<&[EndpointPlan]> {
    if plans.is_empty() {
        return Vec::new();
    }
    if plans.len() <= threshold {
        return vec![plans];
    }
    plans.chunks(chunk_size.max(1)).collect()
}

#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    /// 1-based.
    pub index: usize,
    pub endpoints: Vec<EndpointKey>,
    pub estimated_prompt_tokens: usize,
    pub compact: bool,
    pub attempts: u32,
    pub rows: usize,
    pub placeholder_rows: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScenarioRun {
    pub rows: Vec<ScenarioRow>,
    pub chunks: Vec<ChunkOutcome>,
    pub usage: LlmUsage,
}

impl ScenarioRun {
    pub fn failed_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.error.is_some()).count()
    }

    pub fn placeholder_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.is_placeholder()).count()
    }
}

pub struct ScenarioGenerator<'a> {
    generator: &'a dyn TextGenerator,
    templates: &'a PromptTemplates,
    retry: RetryPolicy,
    settings: AlgorithmConfig,
    show_progress: bool,
}

impl<'a> ScenarioGenerator<'a> {
    pub fn new(generator: &'a dyn TextGenerator, templates: &'a PromptTemplates, settings: &AlgorithmConfig) -> Self {
        Self {
            generator,
            templates,
            retry: RetryPolicy::from(&settings.retry),
            settings: settings.clone(),
            show_progress: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Runs every chunk in order. A failed chunk yields one placeholder row
    /// per endpoint; the run only aborts when fail-fast is configured.
    pub async fn generate(
        &self,
        schema: &ApiSchema,
        plans: &[EndpointPlan],
        errors: &mut ErrorHandler,
    ) -> Result<ScenarioRun> {
        let chunks = chunk_plans(plans, self.settings.chunk_size, self.settings.chunking_threshold);
        let parser = GherkinParser::new(self.settings.expand_outlines);
        let mut progress = ChunkProgress::new(self.show_progress, chunks.len());
        let mut run = ScenarioRun::default();
        info!(endpoints = plans.len(), chunks = chunks.len(), model = %self.generator.name(), "generating scenarios");

        for (position, chunk) in chunks.iter().enumerate() {
            let index = position + 1;
            progress.start_chunk(index, chunk.len());
            let (prompt, compact) = self.prompt_for(schema, chunk, index, chunks.len())?;
            let estimated_prompt_tokens = estimate_tokens(&prompt);

            let label = format!("chunk {}/{}", index, chunks.len());
            let attempted = self
                .retry
                .run(&label, || self.generator.generate(GHERKIN_SYSTEM_PROMPT, &prompt))
                .await;
            run.usage
                .record(&prompt, attempted.result.as_deref().ok(), attempted.attempts);

            let mut outcome = ChunkOutcome {
                index,
                endpoints: chunk.iter().map(EndpointPlan::key).collect(),
                estimated_prompt_tokens,
                compact,
                attempts: attempted.attempts,
                rows: 0,
                placeholder_rows: 0,
                error: None,
            };

            let rows = match attempted.result {
                Ok(text) => {
                    let rows = parser.parse(&text);
                    let unparsed = rows.iter().filter(|r| r.is_placeholder()).count();
                    if unparsed == rows.len() {
                        errors.record(
                            IssueKind::UnparseableResponse,
                            Some(label.clone()),
                            "response contained no parseable Gherkin scenario",
                        );
                    } else if unparsed > 0 {
                        errors.record(
                            IssueKind::UnparseableResponse,
                            Some(label.clone()),
                            format!("{} of {} scenarios could not be parsed", unparsed, rows.len()),
                        );
                    }
                    progress.chunk_done(rows.len());
                    rows
                }
                Err(e) => {
                    let message = e.to_string();
                    progress.chunk_failed(&message);
                    outcome.error = Some(message.clone());
                    let may_continue = errors.handle(ProcessingIssue {
                        kind: IssueKind::ChunkFailure,
                        context: Some(label.clone()),
                        message: format!("{} after {} attempts", message, attempted.attempts),
                        recoverable: true,
                    });
                    if !may_continue {
                        return Err(anyhow!("Scenario generation stopped at {}: {}", label, message));
                    }
                    chunk
                        .iter()
                        .map(|plan| {
                            ScenarioRow::placeholder(&plan.feature_name(), Some(format!("generation failed: {}", message)))
                        })
                        .collect()
                }
            };

            outcome.rows = rows.len();
            outcome.placeholder_rows = rows.iter().filter(|r| r.is_placeholder()).count();
            run.chunks.push(outcome);
            run.rows.extend(rows);
        }

        progress.finish();
        Ok(run)
    }

    /// Full prompt, or the compact form when the full one is over budget.
    fn prompt_for(&self, schema: &ApiSchema, chunk: &[EndpointPlan], index: usize, count: usize) -> Result<(String, bool)> {
        let full = self
            .templates
            .render(GHERKIN_SCENARIOS, &self.prompt_data(schema, chunk, index, count, false))?;
        if estimate_tokens(&full) <= self.settings.max_prompt_tokens {
            return Ok((full, false));
        }
        debug!(chunk = index, tokens = estimate_tokens(&full), "prompt over budget, using compact form");
        let compact = self
            .templates
            .render(GHERKIN_SCENARIOS, &self.prompt_data(schema, chunk, index, count, true))?;
        Ok((compact, true))
    }

    fn prompt_data(&self, schema: &ApiSchema, chunk: &[EndpointPlan], index: usize, count: usize, compact: bool) -> Value {
        let cap = if compact {
            COMPACT_COMBINATIONS.min(self.settings.max_combinations_per_endpoint.max(1))
        } else {
            self.settings.max_combinations_per_endpoint.max(1)
        };

        let endpoints: Vec<Value> = chunk
            .iter()
            .map(|plan| {
                let endpoint = &plan.endpoint;
                let parameters: Vec<Value> = endpoint
                    .parameters
                    .iter()
                    .map(|param| {
                        json!({
                            "name": param.name,
                            "location": param.location.as_str(),
                            "type": param.param_type.to_string(),
                            "required": param.required,
                            "domain": plan.domain_for(&param.key()).map(ValueDomain::describe).unwrap_or_default(),
                        })
                    })
                    .collect();
                let shown: Vec<String> = plan.combinations.iter().take(cap).map(|c| {
                    if c.is_negative() {
                        format!("{} (invalid)", c.describe())
                    } else {
                        c.describe()
                    }
                }).collect();
                let requirements: Vec<Value> = plan
                    .requirements
                    .iter()
                    .map(|r| {
                        json!({
                            "id": r.requirement_id,
                            "priority": r.priority.as_str(),
                            "title": r.title,
                            "acceptance": if compact { Vec::new() } else { r.acceptance_criteria.clone() },
                        })
                    })
                    .collect();

                json!({
                    "method": endpoint.method.as_str(),
                    "path": endpoint.path,
                    "summary": if compact { None } else { endpoint.summary.clone() },
                    "description": if compact { None } else { endpoint.description.clone() },
                    "parameters": parameters,
                    "combination_count": plan.combinations.len(),
                    "truncated": plan.combinations.len() > shown.len(),
                    "shown": shown.len(),
                    "combinations": shown,
                    "requirements": requirements,
                })
            })
            .collect();

        json!({
            "api_title": schema.title,
            "api_version": schema.api_version,
            "spec_version": schema.spec_version.to_string(),
            "base_url": schema.base_url,
            "chunk_index": index,
            "chunk_count": count,
            "endpoint_count": chunk.len(),
            "has_requirements": chunk.iter().any(|p| !p.requirements.is_empty()),
            "endpoints": endpoints,
        })
    }
}
