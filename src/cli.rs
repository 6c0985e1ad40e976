use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apicov")]
#[command(about = "🧪 APICOV - API parameter coverage and Gherkin scenario generator")]
#[command(long_about = "APICOV reads an OpenAPI/Swagger schema, builds value domains for every parameter,
derives coverage combinations, optionally scopes them with a Business Requirement Document (BRD)
and asks a language model for Gherkin scenarios, exported as CSV with analytics reports.

QUICK START:
  apicov config --provider openai --api-key sk-...                  # Configure the model
  apicov generate --schema https://petstore3.swagger.io/api/v3/openapi.json
  apicov inspect --schema ./openapi.yaml                            # Offline plan, no model calls

EXAMPLES:
  apicov generate --schema ./openapi.yaml --brd petstore_brd --output ./out
  apicov generate --schema ./openapi.yaml --generate-brd --coverage 50
  apicov brd parse ./requirements.docx --output ./brd/petstore.json
  apicov brd validate --schema ./openapi.yaml --brd petstore_brd
  apicov postman ./output/<run>/<run>_scenarios.csv                  # Postman collection")]
#[command(version)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Show info-level logs (RUST_LOG overrides)")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the full pipeline: schema → combinations → scenarios → CSV")]
    #[command(long_about = "Fetch the schema, build value domains and coverage combinations, apply the optional
BRD scope and generate Gherkin scenarios chunk by chunk.

BRD OPTIONS (choose at most one):
  --brd            Existing BRD JSON (path, or name inside the BRD directory)
  --brd-document   Requirements document (.txt, .md, .csv, .pdf, .docx, .xlsx) converted to a BRD
  --generate-brd   BRD built from the schema for the top --coverage percent of endpoints

OUTPUT:
  <output>/<timestamp>_<schema>/  schema.json, scenarios CSV, BRD reports and analytics/

EXAMPLES:
  apicov generate --schema ./openapi.yaml
  apicov generate --schema https://example.com/swagger.json --brd-document ./brd.pdf
  apicov generate --schema ./openapi.yaml --generate-brd --coverage 40 --chunk-size 8")]
    Generate {
        #[arg(short, long, help = "Schema URL or file path (prompted for when omitted)")]
        schema: Option<String>,

        #[arg(long, help = "BRD JSON path or name", conflicts_with_all = ["brd_document", "generate_brd"])]
        brd: Option<String>,

        #[arg(long, help = "Requirements document to turn into a BRD", conflicts_with = "generate_brd")]
        brd_document: Option<PathBuf>,

        #[arg(long, help = "Build a BRD from the schema before generating")]
        generate_brd: bool,

        #[arg(short, long, help = "Percentage of endpoints for --generate-brd (1-100)", default_value = "100")]
        coverage: u8,

        #[arg(short, long, help = "Output directory (defaults to paths.output_dir)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Endpoints per model request when chunking")]
        chunk_size: Option<usize>,

        #[arg(long, help = "Keep Scenario Outlines as single rows")]
        no_expand_outlines: bool,

        #[arg(short, long, help = "Suppress progress output")]
        quiet: bool,
    },

    #[command(about = "Show endpoints, value domains and combinations without calling a model")]
    #[command(long_about = "Run the deterministic part of the pipeline and print the plan.
No credential is needed and nothing is written.

EXAMPLES:
  apicov inspect --schema ./openapi.yaml
  apicov inspect --schema ./openapi.yaml --brd petstore_brd
  apicov inspect --schema ./openapi.yaml --json > plan.json")]
    Inspect {
        #[arg(short, long, help = "Schema URL or file path")]
        schema: String,

        #[arg(long, help = "BRD JSON path or name used to scope the plan")]
        brd: Option<String>,

        #[arg(long, help = "Print the plan as JSON")]
        json: bool,
    },

    #[command(about = "Create, validate and list Business Requirement Documents")]
    Brd {
        #[command(subcommand)]
        action: BrdCommands,
    },

    #[command(about = "Convert a scenarios CSV into a Postman collection")]
    #[command(long_about = "Read a scenarios CSV written by 'generate' and write a Postman v2.1 collection
with one request per scenario. Method and path come from the 'METHOD /path' feature
name (or the first 'METHOD request to \"/path\"' step); the scenario steps become the
request's test script. Placeholder rows are skipped.

EXAMPLES:
  apicov postman ./output/20240101_120000_petstore/20240101_120000_petstore_scenarios.csv
  apicov postman ./scenarios.csv --base-url https://petstore.example.com/v1 --output ./pets.json")]
    Postman {
        #[arg(help = "Scenarios CSV")]
        csv: PathBuf,

        #[arg(short, long, help = "Output JSON path (defaults to <csv stem>.postman.json)")]
        output: Option<PathBuf>,

        #[arg(long, help = "Value of the {{baseUrl}} collection variable")]
        base_url: Option<String>,
    },

    #[command(about = "Manage configuration and AI provider settings")]
    #[command(long_about = "Inspect and edit ~/.apicov/config.yml (or the file named by APICOV_CONFIG).
Environment variables with the APICOV_ prefix override file values, e.g.
APICOV_LLM__MODEL=gpt-4o or APICOV_ALGORITHM__CHUNK_SIZE=8.

EXAMPLES:
  apicov config --init
  apicov config --provider claude --api-key sk-ant-... --model claude-3-5-sonnet-20241022
  apicov config --validate
  apicov config --test")]
    Config {
        #[arg(short, long, help = "Set API key for your chosen AI provider")]
        api_key: Option<String>,

        #[arg(short, long, help = "Set model name (e.g., gpt-4, gemini-1.5-pro)")]
        model: Option<String>,

        #[arg(short, long, help = "Set AI provider", value_enum)]
        provider: Option<AiProvider>,

        #[arg(long, help = "Set custom prompt template directory")]
        set_template_dir: Option<PathBuf>,

        #[arg(long, help = "Write a config file with default values")]
        init: bool,

        #[arg(long, help = "Display current configuration values")]
        show: bool,

        #[arg(long, help = "Validate all configuration settings")]
        validate: bool,

        #[arg(long, help = "Send a short test prompt to the configured model")]
        test: bool,
    },
}

#[derive(Subcommand)]
pub enum BrdCommands {
    #[command(about = "Compare a BRD with a schema and write the validation report")]
    Validate {
        #[arg(short, long, help = "Schema URL or file path")]
        schema: String,

        #[arg(long, help = "BRD JSON path or name")]
        brd: String,

        #[arg(short, long, help = "Directory for brd_validation_report.txt (defaults to paths.output_dir)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Convert a requirements document into BRD JSON using the model")]
    Parse {
        #[arg(help = "Document (.txt, .md, .csv, .pdf, .docx, .xlsx, .xls)")]
        document: PathBuf,

        #[arg(long, help = "API name to put into the BRD")]
        api_name: Option<String>,

        #[arg(short, long, help = "Output JSON path (defaults to the BRD directory)")]
        output: Option<PathBuf>,
    },

    #[command(about = "Build a BRD from a schema for the highest-priority endpoints")]
    Generate {
        #[arg(short, long, help = "Schema URL or file path")]
        schema: String,

        #[arg(short, long, help = "Percentage of endpoints to include (1-100)", default_value = "100")]
        coverage: u8,

        #[arg(long, help = "Skip the model and use the priority heuristic only")]
        heuristic: bool,

        #[arg(short, long, help = "Output JSON path (defaults to the BRD directory)")]
        output: Option<PathBuf>,
    },

    #[command(about = "List BRD files in the BRD directory")]
    List,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiProvider {
    Openai,
    Azure,
    Gemini,
    Claude,
    Ollama,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::Openai => "openai",
            AiProvider::Azure => "azure",
            AiProvider::Gemini => "gemini",
            AiProvider::Claude => "claude",
            AiProvider::Ollama => "ollama",
        }
    }
}
