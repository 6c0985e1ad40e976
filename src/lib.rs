pub mod app;
pub mod brd;
pub mod brd_validator;
pub mod cli;
pub mod combination;
pub mod config;
pub mod csv_export;
pub mod document_processor;
pub mod domain;
pub mod error_handler;
pub mod gherkin;
pub mod llm;
pub mod metrics;
pub mod postman_export;
pub mod progress;
pub mod retry;
pub mod scenario_generator;
pub mod schema;
pub mod schema_fetcher;
pub mod scope;
pub mod template_engine;
