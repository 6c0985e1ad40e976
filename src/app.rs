use anyhow::{anyhow, Result};
use chrono::Local;
use serde_json::json;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs;
use tracing::info;

use crate::brd::{Brd, BrdBuilder, BrdStore};
use crate::brd_validator::{self, BrdValidation};
use crate::cli::{BrdCommands, Commands};
use crate::combination;
use crate::config::{validate_coverage_percentage, Config};
use crate::csv_export::write_scenarios_csv;
use crate::document_processor::DocumentProcessor;
use crate::domain::{DomainBuilder, ValueKind};
use crate::error_handler::{ErrorHandler, IssueKind, ProcessingIssue};
use crate::gherkin::ScenarioRow;
use crate::llm::{LlmClient, TextGenerator};
use crate::metrics::{AlgorithmKind, AlgorithmReport, LlmUsage, MetricsCollector, RunSummary};
use crate::postman_export;
use crate::progress::Spinner;
use crate::retry::RetryPolicy;
use crate::scenario_generator::{plan_endpoints, EndpointPlan, ScenarioGenerator};
use crate::schema::{self, ApiSchema, Endpoint};
use crate::schema_fetcher::{SchemaFetcher, SchemaSource};
use crate::scope::{self, CoverageReport};
use crate::template_engine::PromptTemplates;

pub const SCHEMA_FILE: &str = "schema.json";
pub const COVERAGE_REPORT_FILE: &str = "coverage_report.txt";
pub const ANALYTICS_DIR: &str = "analytics";

/// Where the BRD for a run comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BrdChoice {
    #[default]
    None,
    Existing(String),
    Document(PathBuf),
    FromSchema,
}

#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub schema: String,
    pub brd: BrdChoice,
    pub coverage: u8,
    pub output_dir: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub expand_outlines: Option<bool>,
    pub quiet: bool,
}

impl GenerateRequest {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            brd: BrdChoice::None,
            coverage: 100,
            output_dir: None,
            chunk_size: None,
            expand_outlines: None,
            quiet: false,
        }
    }
}

/// Files and results of one `generate` run.
#[derive(Debug)]
pub struct RunArtifacts {
    pub run_dir: PathBuf,
    pub schema_path: PathBuf,
    pub csv_path: PathBuf,
    pub rows: Vec<ScenarioRow>,
    pub brd_path: Option<PathBuf>,
    pub coverage: Option<CoverageReport>,
    pub validation: Option<BrdValidation>,
    pub reports: Vec<PathBuf>,
    pub issues: Vec<ProcessingIssue>,
}

pub struct App {
    pub config: Config,
    generator: Option<Box<dyn TextGenerator>>,
    /// Why no generator could be built from the configuration.
    generator_error: Option<String>,
    templates: PromptTemplates,
    document_processor: DocumentProcessor,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> Result<Self> {
        let templates = PromptTemplates::with_template_dir(config.paths.template_dir.as_deref())?;
        let (generator, generator_error) = match LlmClient::from_config(&config.llm) {
            Ok(client) => (Some(Box::new(client) as Box<dyn TextGenerator>), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Ok(Self {
            config,
            generator,
            generator_error,
            templates,
            document_processor: DocumentProcessor::new(),
        })
    }

    /// App driven by an already-built text generator instead of the configured provider.
    pub fn with_generator(config: Config, generator: Box<dyn TextGenerator>) -> Result<Self> {
        let mut app = Self::from_config(config)?;
        app.generator = Some(generator);
        app.generator_error = None;
        Ok(app)
    }

    fn print_branded_header(&self) {
        println!("🧪 APICOV - API Parameter Coverage");
        println!("==================================");
    }

    pub async fn run_command(&mut self, command: Commands) -> Result<()> {
        match command {
            Commands::Generate {
                schema,
                brd,
                brd_document,
                generate_brd,
                coverage,
                output,
                chunk_size,
                no_expand_outlines,
                quiet,
            } => {
                let schema = match schema {
                    Some(schema) => schema,
                    None => prompt_for_schema()?,
                };
                let brd = match (brd, brd_document, generate_brd) {
                    (Some(name), _, _) => BrdChoice::Existing(name),
                    (None, Some(path), _) => BrdChoice::Document(path),
                    (None, None, true) => BrdChoice::FromSchema,
                    (None, None, false) => BrdChoice::None,
                };
                let request = GenerateRequest {
                    schema,
                    brd,
                    coverage,
                    output_dir: output,
                    chunk_size,
                    expand_outlines: no_expand_outlines.then_some(false),
                    quiet,
                };
                if !quiet {
                    self.print_branded_header();
                }
                let artifacts = self.run_generate(&request).await?;
                println!("\n🎉 Done: {} scenario rows", artifacts.rows.len());
                println!("📄 CSV: {}", artifacts.csv_path.display());
                println!("📁 Run directory: {}", artifacts.run_dir.display());
                Ok(())
            }
            Commands::Inspect { schema, brd, json } => self.run_inspect(&schema, brd.as_deref(), json).await,
            Commands::Brd { action } => self.run_brd_command(action).await,
            Commands::Postman { csv, output, base_url } => {
                let (path, export) = postman_export::export_csv(&csv, output.as_deref(), base_url.as_deref()).await?;
                println!("📮 Postman collection with {} requests: {}", export.items, path.display());
                if !export.skipped.is_empty() {
                    println!("⏭️  Skipped {} rows:", export.skipped.len());
                    for row in &export.skipped {
                        println!("   • {}", row);
                    }
                }
                Ok(())
            }
            Commands::Config {
                api_key,
                model,
                provider,
                set_template_dir,
                init,
                show,
                validate,
                test,
            } => {
                if init {
                    let path = Config::config_path()?;
                    if path.exists() {
                        println!("ℹ️  Config file already exists: {}", path.display());
                    } else {
                        Config::default().save_to(&path).await?;
                        println!("✅ Default config written to {}", path.display());
                    }
                    return Ok(());
                }
                if show {
                    self.show_config_status();
                    return Ok(());
                }
                if validate {
                    self.print_validation();
                    return Ok(());
                }
                if test {
                    return self.test_ai_configuration().await;
                }

                let mut updated = false;
                if let Some(provider) = provider {
                    self.config.set_provider(provider.as_str());
                    updated = true;
                }
                if let Some(key) = api_key {
                    self.config.set_api_key(key);
                    updated = true;
                }
                if let Some(model_name) = model {
                    self.config.set_model(model_name);
                    updated = true;
                }
                if let Some(dir) = set_template_dir {
                    self.config.paths.template_dir = Some(dir);
                    updated = true;
                }

                if updated {
                    let path = self.config.save().await?;
                    println!("✅ Configuration saved to {}", path.display());
                } else {
                    self.show_config_status();
                }
                Ok(())
            }
        }
    }

    /// Full pipeline. A missing credential and an empty endpoint scope abort
    /// the run; everything else is recorded and reported.
    pub async fn run_generate(&self, request: &GenerateRequest) -> Result<RunArtifacts> {
        let started = Instant::now();
        let mut settings = self.config.algorithm.clone();
        if let Some(chunk_size) = request.chunk_size {
            settings.chunk_size = chunk_size.max(1);
        }
        if let Some(expand) = request.expand_outlines {
            settings.expand_outlines = expand;
        }
        let mut errors = ErrorHandler::new(settings.fail_fast);
        let show_progress = !request.quiet;

        let generator = match self.generator.as_deref() {
            Some(generator) => generator,
            None => {
                let reason = self
                    .generator_error
                    .clone()
                    .unwrap_or_else(|| "no language model configured".to_string());
                errors.handle(ProcessingIssue {
                    kind: IssueKind::Configuration,
                    context: Some(self.config.llm.provider.clone()),
                    message: reason.clone(),
                    recoverable: false,
                });
                return Err(anyhow!(
                    "❌ {}\n💡 Run 'apicov config --provider <name> --api-key <key>' or set LLM_API_KEY",
                    reason
                ));
            }
        };
        let coverage_pct = validate_coverage_percentage(request.coverage)?;
        let retry = RetryPolicy::from(&settings.retry);

        // Schema
        let source = SchemaSource::parse(&request.schema);
        let ((api, normalize_elapsed), raw) = self.load_schema(&source, &mut errors, show_progress).await?;

        let output_root = request
            .output_dir
            .clone()
            .unwrap_or_else(|| self.config.paths.output_dir.clone());
        let run_dir = output_root.join(format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), source.stem()));
        fs::create_dir_all(&run_dir)
            .await
            .map_err(|e| anyhow!("Failed to create {}: {}", run_dir.display(), e))?;
        let schema_path = run_dir.join(SCHEMA_FILE);
        fs::write(&schema_path, serde_json::to_string_pretty(&raw)?)
            .await
            .map_err(|e| anyhow!("Failed to write {}: {}", schema_path.display(), e))?;

        let mut metrics = MetricsCollector::new(run_dir.join(ANALYTICS_DIR));
        metrics
            .save(
                &AlgorithmReport::new("Schema Normalizer", AlgorithmKind::Analyzer)
                    .elapsed(normalize_elapsed)
                    .input("source", &source)
                    .input("spec version", api.spec_version)
                    .output("endpoints", api.endpoints.len())
                    .output("parameters", api.parameter_count())
                    .detail("warnings", api.warnings.len()),
            )
            .await?;

        // BRD
        let mut llm_usage = LlmUsage::default();
        let (brd, brd_path) = self
            .resolve_brd(&request.brd, &api, coverage_pct, generator, retry.clone(), &mut errors, &mut llm_usage)
            .await?;

        // Scope
        let scope_started = Instant::now();
        let (scoped, coverage, validation) = match &brd {
            Some(brd) => {
                let validation = brd_validator::validate(brd, &api.endpoint_keys());
                validation.write_report(&run_dir).await?;
                for key in &validation.orphaned {
                    errors.record(
                        IssueKind::OrphanedRequirement,
                        Some(key.to_string()),
                        "BRD references an endpoint that is not in the schema",
                    );
                }
                let (scoped, report) = scope::filter_by_brd(&api.endpoints, brd);
                if show_progress {
                    println!(
                        "🎯 BRD scope: {}/{} endpoints ({:.1}%)",
                        report.covered, report.total, report.percentage
                    );
                }
                metrics
                    .save(
                        &AlgorithmReport::new("BRD Scope Filter", AlgorithmKind::Filter)
                            .elapsed(scope_started.elapsed())
                            .input("schema endpoints", report.total)
                            .input("BRD requirements", brd.requirements.len())
                            .output("endpoints in scope", report.covered)
                            .output("coverage percentage", format!("{:.2}", report.percentage))
                            .detail("orphaned endpoints", validation.orphaned.len())
                            .detail("missing endpoints", validation.missing.len())
                            .detail("requirement issues", validation.issues.len()),
                    )
                    .await?;
                (scoped, Some(report), Some(validation))
            }
            None => (api.endpoints.clone(), None, None),
        };
        if scoped.is_empty() {
            return Err(anyhow!(
                "❌ No endpoints in scope: the BRD references none of the {} schema endpoints (see {})",
                api.endpoints.len(),
                run_dir.join(brd_validator::REPORT_FILE).display()
            ));
        }

        // Domains and combinations
        let plan_started = Instant::now();
        let builder = DomainBuilder::new(settings.max_string_length);
        let plans = plan_endpoints(&scoped, brd.as_ref(), &builder, &mut errors);
        let plan_elapsed = plan_started.elapsed();
        self.save_plan_reports(&mut metrics, &plans, plan_elapsed).await?;

        // Scenarios
        let scenario_generator = ScenarioGenerator::new(generator, &self.templates, &settings)
            .with_retry(retry)
            .with_progress(show_progress);
        let generation_started = Instant::now();
        let run = scenario_generator.generate(&api, &plans, &mut errors).await?;
        llm_usage.merge(&run.usage);
        metrics
            .save(
                &AlgorithmReport::new("Scenario Generator", AlgorithmKind::Generator)
                    .elapsed(generation_started.elapsed())
                    .input("endpoints", plans.len())
                    .input("chunk size", settings.chunk_size)
                    .input("chunking threshold", settings.chunking_threshold)
                    .output("chunks", run.chunks.len())
                    .output("failed chunks", run.failed_chunks())
                    .output("rows", run.rows.len())
                    .detail("compact prompts", run.chunks.iter().filter(|c| c.compact).count())
                    .detail(
                        "largest prompt (est. tokens)",
                        run.chunks.iter().map(|c| c.estimated_prompt_tokens).max().unwrap_or(0),
                    )
                    .llm(run.usage.clone()),
            )
            .await?;

        let features: std::collections::BTreeSet<&str> = run.rows.iter().map(|r| r.feature.as_str()).collect();
        metrics
            .save(
                &AlgorithmReport::new("Gherkin Parser", AlgorithmKind::Parser)
                    .input("responses", run.chunks.iter().filter(|c| c.error.is_none()).count())
                    .input("expand outlines", settings.expand_outlines)
                    .output("scenario rows", run.rows.len())
                    .output("placeholder rows", run.placeholder_rows())
                    .detail("features", features.len())
                    .detail("tagged rows", run.rows.iter().filter(|r| !r.tags.is_empty()).count()),
            )
            .await?;

        // Outputs
        let csv_path = write_scenarios_csv(&run.rows, &run_dir, &source.stem()).await?;
        let mut reports = Vec::new();
        if let (Some(brd), Some(report)) = (&brd, &coverage) {
            let requirement_coverage = scope::requirement_coverage(brd, &run.rows)?;
            let path = run_dir.join(COVERAGE_REPORT_FILE);
            fs::write(&path, scope::render_coverage_report(report, &requirement_coverage))
                .await
                .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
            reports.push(run_dir.join(brd_validator::REPORT_FILE));
            reports.push(path);
        }

        let summary = RunSummary {
            schema_source: source.to_string(),
            api_title: api.title.clone(),
            spec_version: api.spec_version.to_string(),
            provider: generator.name(),
            brd: brd.as_ref().map(|b| b.brd_id.clone()),
            endpoints_total: api.endpoints.len(),
            endpoints_in_scope: plans.len(),
            coverage_percentage: coverage.as_ref().map(|c| c.percentage),
            parameters: plans.iter().map(|p| p.domains.len()).sum(),
            combinations: plans.iter().map(|p| p.combinations.len()).sum(),
            chunks: run.chunks.len(),
            failed_chunks: run.failed_chunks(),
            rows: run.rows.len(),
            placeholder_rows: run.placeholder_rows(),
            csv_path: Some(csv_path.clone()),
            llm: llm_usage,
            elapsed: started.elapsed(),
            diagnostics: errors.format_report(),
        };
        metrics.save_run_summary(&summary).await?;
        reports.extend(metrics.saved().iter().cloned());

        if show_progress {
            errors.print_summary();
        }
        info!(run_dir = %run_dir.display(), rows = run.rows.len(), "run complete");

        Ok(RunArtifacts {
            run_dir,
            schema_path,
            csv_path,
            rows: run.rows,
            brd_path,
            coverage,
            validation,
            reports,
            issues: errors.issues().to_vec(),
        })
    }

    /// Fetches and normalizes; returns the schema with the normalization time
    /// and the raw document.
    async fn load_schema(
        &self,
        source: &SchemaSource,
        errors: &mut ErrorHandler,
        show_progress: bool,
    ) -> Result<((ApiSchema, Duration), serde_json::Value)> {
        let fetcher = SchemaFetcher::new(
            Duration::from_secs(self.config.llm.timeout.max(1)),
            RetryPolicy::from(&self.config.algorithm.retry),
        );
        let spinner = Spinner::new(show_progress, &format!("Loading schema from {}", source));
        let raw = match fetcher.fetch(source).await {
            Ok(raw) => raw,
            Err(e) => {
                spinner.fail(None);
                return Err(anyhow!("Could not load schema: {}", e));
            }
        };

        let started = Instant::now();
        let api = match schema::normalize(&raw) {
            Ok(api) => api,
            Err(e) => {
                spinner.fail(None);
                return Err(anyhow!("❌ {}", e));
            }
        };
        let elapsed = started.elapsed();
        let loaded = format!(
            "{} {} ({}): {} endpoints",
            api.title,
            api.api_version,
            api.spec_version,
            api.endpoints.len()
        );
        spinner.succeed(Some(&loaded));
        for warning in &api.warnings {
            errors.record(IssueKind::SchemaWarning, None, warning.clone());
        }
        Ok(((api, elapsed), raw))
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_brd(
        &self,
        choice: &BrdChoice,
        api: &ApiSchema,
        coverage: u8,
        generator: &dyn TextGenerator,
        retry: RetryPolicy,
        errors: &mut ErrorHandler,
        usage: &mut LlmUsage,
    ) -> Result<(Option<Brd>, Option<PathBuf>)> {
        let store = BrdStore::new(&self.config.paths.brd_dir);
        let builder = BrdBuilder::new(Some(generator), &self.templates, retry);

        match choice {
            BrdChoice::None => Ok((None, None)),
            BrdChoice::Existing(name) => {
                let brd = store.load(name).await?;
                println!("📋 Using BRD {} ({} requirements)", brd.brd_id, brd.requirements.len());
                Ok((Some(brd), store.resolve(name)))
            }
            BrdChoice::FromSchema => {
                let outcome = builder.from_schema(api, coverage).await?;
                usage.merge(&outcome.usage);
                if let Some(warning) = outcome.warning {
                    errors.record(IssueKind::UnparseableResponse, Some("BRD generation".to_string()), warning);
                }
                let path = store.save(&outcome.brd, None).await?;
                println!(
                    "📋 Generated BRD {} with {} requirements: {}",
                    outcome.brd.brd_id,
                    outcome.brd.requirements.len(),
                    path.display()
                );
                Ok((Some(outcome.brd), Some(path)))
            }
            BrdChoice::Document(path) => {
                let document = match self.document_processor.extract(path).await {
                    Ok(document) => document,
                    Err(e) => {
                        errors.record(
                            IssueKind::DocumentExtraction,
                            Some(path.display().to_string()),
                            format!("{}; continuing without a BRD", e),
                        );
                        return Ok((None, None));
                    }
                };
                match builder.from_document(&document, Some(&api.title)).await {
                    Ok(outcome) => {
                        usage.merge(&outcome.usage);
                        if let Some(warning) = outcome.warning {
                            errors.record(IssueKind::DocumentExtraction, Some(document.name.clone()), warning);
                        }
                        let saved = store.save(&outcome.brd, None).await?;
                        println!(
                            "📋 Parsed BRD {} with {} requirements: {}",
                            outcome.brd.brd_id,
                            outcome.brd.requirements.len(),
                            saved.display()
                        );
                        Ok((Some(outcome.brd), Some(saved)))
                    }
                    Err(e) => {
                        errors.record(
                            IssueKind::UnparseableResponse,
                            Some(document.name.clone()),
                            format!("{}; continuing without a BRD", e),
                        );
                        Ok((None, None))
                    }
                }
            }
        }
    }

    async fn save_plan_reports(
        &self,
        metrics: &mut MetricsCollector,
        plans: &[EndpointPlan],
        elapsed: Duration,
    ) -> Result<()> {
        let domains: Vec<_> = plans.iter().flat_map(|p| p.domains.iter().map(|(_, d)| d)).collect();
        let placeholder_domains = domains
            .iter()
            .filter(|d| d.values().iter().all(|v| v.kind == ValueKind::Placeholder))
            .count();
        let total_values: usize = domains.iter().map(|d| d.len()).sum();
        metrics
            .save(
                &AlgorithmReport::new("Parameter Domain Builder", AlgorithmKind::Analyzer)
                    .elapsed(elapsed)
                    .input("parameters", domains.len())
                    .output("sample values", total_values)
                    .detail("placeholder-only domains", placeholder_domains)
                    .detail("unverified pattern domains", domains.iter().filter(|d| d.unverified).count())
                    .detail("largest domain", domains.iter().map(|d| d.len()).max().unwrap_or(0))
                    .detail(
                        "average domain size",
                        format!("{:.2}", if domains.is_empty() { 0.0 } else { total_values as f64 / domains.len() as f64 }),
                    ),
            )
            .await?;

        let combinations: usize = plans.iter().map(|p| p.combinations.len()).sum();
        let fully_covered = plans
            .iter()
            .filter(|p| combination::required_pairs(&p.domains).is_subset(&combination::covered_pairs(&p.combinations)))
            .count();
        metrics
            .save(
                &AlgorithmReport::new("Coverage Combination Generator", AlgorithmKind::Generator)
                    .input("endpoints", plans.len())
                    .output("combinations", combinations)
                    .output(
                        "negative combinations",
                        plans
                            .iter()
                            .flat_map(|p| p.combinations.iter())
                            .filter(|c| c.is_negative())
                            .count(),
                    )
                    .detail("endpoints with every value covered", format!("{}/{}", fully_covered, plans.len()))
                    .detail(
                        "most combinations for one endpoint",
                        plans.iter().map(|p| p.combinations.len()).max().unwrap_or(0),
                    ),
            )
            .await?;
        Ok(())
    }

    pub async fn run_inspect(&self, schema_input: &str, brd_name: Option<&str>, as_json: bool) -> Result<()> {
        let mut errors = ErrorHandler::new(false);
        let source = SchemaSource::parse(schema_input);
        let ((api, _), _) = self.load_schema(&source, &mut errors, !as_json).await?;

        let brd = match brd_name {
            Some(name) => Some(BrdStore::new(&self.config.paths.brd_dir).load(name).await?),
            None => None,
        };
        let (endpoints, coverage): (Vec<Endpoint>, Option<CoverageReport>) = match &brd {
            Some(brd) => {
                let (scoped, report) = scope::filter_by_brd(&api.endpoints, brd);
                (scoped, Some(report))
            }
            None => (api.endpoints.clone(), None),
        };

        let builder = DomainBuilder::new(self.config.algorithm.max_string_length);
        let plans = plan_endpoints(&endpoints, brd.as_ref(), &builder, &mut errors);

        if as_json {
            let plan = json!({
                "title": api.title,
                "version": api.api_version,
                "spec_version": api.spec_version.to_string(),
                "coverage": coverage,
                "endpoints": plans.iter().map(|p| json!({
                    "endpoint": p.endpoint,
                    "domains": p.domains.iter().map(|(key, domain)| json!({"parameter": key, "domain": domain})).collect::<Vec<_>>(),
                    "combinations": p.combinations,
                    "requirements": p.requirements.iter().map(|r| &r.requirement_id).collect::<Vec<_>>(),
                })).collect::<Vec<_>>(),
                "issues": errors.issues().iter().map(|i| i.to_string()).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&plan)?);
            return Ok(());
        }

        if let Some(report) = &coverage {
            println!(
                "\n🎯 BRD scope: {}/{} endpoints ({:.1}%)",
                report.covered, report.total, report.percentage
            );
            for key in &report.uncovered {
                println!("   ⏭️  {}", key);
            }
        }
        for plan in &plans {
            println!(
                "\n📍 {} ({} parameters, {} combinations)",
                plan.key(),
                plan.domains.len(),
                plan.combinations.len()
            );
            for (key, domain) in &plan.domains {
                let flag = if domain.unverified { " ⚠️ unverified" } else { "" };
                println!("   • {}: {}{}", key, domain.describe(), flag);
            }
            for (index, combination) in plan.combinations.iter().enumerate() {
                println!("     {}. {}", index + 1, combination.describe());
            }
        }
        errors.print_summary();
        Ok(())
    }

    async fn run_brd_command(&self, action: BrdCommands) -> Result<()> {
        let store = BrdStore::new(&self.config.paths.brd_dir);
        match action {
            BrdCommands::Validate { schema, brd, output } => {
                let mut errors = ErrorHandler::new(false);
                let source = SchemaSource::parse(&schema);
                let ((api, _), _) = self.load_schema(&source, &mut errors, true).await?;
                let brd = store.load(&brd).await?;

                let validation = brd_validator::validate(&brd, &api.endpoint_keys());
                let dir = output.unwrap_or_else(|| self.config.paths.output_dir.clone());
                let path = validation.write_report(&dir).await?;

                let status = if validation.is_valid() { "✅ valid" } else { "❌ invalid" };
                println!("📋 BRD {}: {}", brd.brd_id, status);
                println!(
                    "   Matched {}/{} schema endpoints ({:.2}%), {} orphaned, {} requirement issues",
                    validation.matched_endpoints,
                    validation.total_schema_endpoints,
                    validation.match_percentage,
                    validation.orphaned.len(),
                    validation.issues.len()
                );
                println!("📄 Report: {}", path.display());
                Ok(())
            }
            BrdCommands::Parse {
                document,
                api_name,
                output,
            } => {
                let generator = self.require_generator()?;
                let spinner = Spinner::new(true, &format!("Reading {}", document.display()));
                let extracted = match self.document_processor.extract(&document).await {
                    Ok(doc) => {
                        let extracted = format!("Extracted {} characters ({})", doc.content.len(), doc.format);
                        spinner.succeed(Some(&extracted));
                        doc
                    }
                    Err(e) => {
                        spinner.fail(None);
                        return Err(e);
                    }
                };

                let builder = BrdBuilder::new(
                    Some(generator),
                    &self.templates,
                    RetryPolicy::from(&self.config.algorithm.retry),
                );
                let outcome = builder.from_document(&extracted, api_name.as_deref()).await?;
                if let Some(warning) = &outcome.warning {
                    println!("⚠️  {}", warning);
                }
                let path = store.save(&outcome.brd, output.as_deref()).await?;
                println!(
                    "✅ BRD {} with {} requirements saved: {}",
                    outcome.brd.brd_id,
                    outcome.brd.requirements.len(),
                    path.display()
                );
                Ok(())
            }
            BrdCommands::Generate {
                schema,
                coverage,
                heuristic,
                output,
            } => {
                let coverage = validate_coverage_percentage(coverage)?;
                let mut errors = ErrorHandler::new(false);
                let source = SchemaSource::parse(&schema);
                let ((api, _), _) = self.load_schema(&source, &mut errors, true).await?;

                let generator = if heuristic { None } else { self.generator.as_deref() };
                if generator.is_none() && !heuristic {
                    println!("ℹ️  No language model configured, using the priority heuristic");
                }
                let builder = BrdBuilder::new(generator, &self.templates, RetryPolicy::from(&self.config.algorithm.retry));
                let outcome = builder.from_schema(&api, coverage).await?;
                if let Some(warning) = &outcome.warning {
                    println!("⚠️  {}", warning);
                }
                let path = store.save(&outcome.brd, output.as_deref()).await?;
                println!(
                    "✅ BRD {} covering {}/{} endpoints saved: {}",
                    outcome.brd.brd_id,
                    outcome.brd.requirements.len(),
                    api.endpoints.len(),
                    path.display()
                );
                Ok(())
            }
            BrdCommands::List => {
                let files = store.list();
                if files.is_empty() {
                    println!("📭 No BRD files in {}", store.dir().display());
                    return Ok(());
                }
                println!("📚 BRDs in {}", store.dir().display());
                for path in files {
                    match crate::brd::load_brd_file(&path).await {
                        Ok(brd) => println!(
                            "  • {} - {} ({} requirements, {})",
                            file_name(&path),
                            if brd.title.is_empty() { brd.brd_id.as_str() } else { brd.title.as_str() },
                            brd.requirements.len(),
                            if brd.created_date.is_empty() { "undated" } else { brd.created_date.as_str() }
                        ),
                        Err(e) => println!("  • {} ⚠️  {}", file_name(&path), e),
                    }
                }
                Ok(())
            }
        }
    }

    fn require_generator(&self) -> Result<&dyn TextGenerator> {
        self.generator.as_deref().ok_or_else(|| {
            anyhow!(
                "❌ {}\n💡 Run 'apicov config --provider <name> --api-key <key>' or set LLM_API_KEY",
                self.generator_error
                    .as_deref()
                    .unwrap_or("no language model configured")
            )
        })
    }

    fn show_config_status(&self) {
        println!("🔧 Current APICOV Configuration");
        println!("===============================");
        match Config::config_path() {
            Ok(path) => println!("📁 File: {} ({})", path.display(), if path.exists() { "found" } else { "not created yet" }),
            Err(e) => println!("📁 File: unavailable ({})", e),
        }

        let (provider_name, models) = Config::provider_info(&self.config.llm.provider);
        println!("📡 AI Provider: {}", provider_name);
        println!("🤖 Model: {}", if self.config.llm.model.is_empty() { "Not set" } else { self.config.llm.model.as_str() });
        if !models.is_empty() {
            println!("   Suggested models: {}", models.join(", "));
        }
        if let Some(url) = &self.config.llm.base_url {
            println!("🌐 Base URL: {}", url);
        }
        println!(
            "🔑 API Key: {}",
            if self.config.has_api_key() { "Configured ✅" } else { "Not configured ❌" }
        );
        println!("⏱️  Timeout: {}s", self.config.llm.timeout);

        let algorithm = &self.config.algorithm;
        println!("\n⚙️  Algorithm Settings:");
        println!("  • Chunk size: {} (chunking above {} endpoints)", algorithm.chunk_size, algorithm.chunking_threshold);
        println!("  • Prompt budget: {} tokens", algorithm.max_prompt_tokens);
        println!("  • Combinations per endpoint in prompts: {}", algorithm.max_combinations_per_endpoint);
        println!("  • Expand scenario outlines: {}", algorithm.expand_outlines);
        println!(
            "  • Retry: {} attempts, {}ms → {}ms backoff",
            algorithm.retry.max_attempts, algorithm.retry.initial_backoff_ms, algorithm.retry.max_backoff_ms
        );

        println!("\n📂 Paths:");
        println!("  • Output: {}", self.config.paths.output_dir.display());
        println!("  • BRDs: {}", self.config.paths.brd_dir.display());
        match &self.config.paths.template_dir {
            Some(dir) => println!("  • Templates: {} (overrides: {})", dir.display(), self.templates.overridden().join(", ")),
            None => println!("  • Templates: built-in ({})", PromptTemplates::names().join(", ")),
        }
    }

    fn print_validation(&self) {
        println!("🔍 Validating configuration...");
        let result = self.config.validate_all_settings();
        if result.is_valid {
            println!("✅ Configuration is valid!");
        } else {
            println!("❌ Configuration issues found:");
            for issue in &result.issues {
                println!("   • {}", issue);
            }
        }
        if !result.warnings.is_empty() {
            println!("⚠️  Warnings:");
            for warning in &result.warnings {
                println!("   • {}", warning);
            }
        }
    }

    async fn test_ai_configuration(&self) -> Result<()> {
        println!("🧪 Testing AI Configuration...\n");
        let generator = match self.require_generator() {
            Ok(generator) => generator,
            Err(e) => {
                println!("{}", e);
                return Ok(());
            }
        };
        println!("🤖 {}", generator.name());
        println!("🔄 Sending a short test prompt...");

        let started = Instant::now();
        match generator
            .generate("You are a connectivity check.", "Reply with the single word OK.")
            .await
        {
            Ok(response) => {
                let preview: String = response.chars().take(100).collect();
                println!("✅ AI connection successful ({}ms)", started.elapsed().as_millis());
                println!("📝 Response preview: {}", preview.trim());
            }
            Err(e) => {
                println!("❌ AI connection failed: {}", e);
                println!("\n🔧 Troubleshooting:");
                println!("1. Verify the API key and model name");
                println!("2. Check network access to the provider");
                println!("3. Run 'apicov config --validate'");
            }
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn prompt_for_schema() -> Result<String> {
    print!("🔗 OpenAPI/Swagger schema URL or file path: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();
    if input.is_empty() {
        return Err(anyhow!("A schema URL or file path is required"));
    }
    Ok(input.to_string())
}
