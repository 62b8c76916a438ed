use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use annot::annotator::{DEFAULT_MODEL, MaxTokens, RequestError};
use annot::llm::LlmError;
use annot::{
    Annotator, BatchRunner, BatchTemplate, LlmClientBuilder, LlmClientTrait, probe, self_test,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// annot - label rows of text with an LLM from a fixed option set
#[derive(Parser)]
#[command(name = "annot")]
#[command(about = "Label rows of text with an LLM from a fixed option set")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Endpoint credentials shared by every command
#[derive(Args)]
struct ConnectionArgs {
    /// API key for the endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Alternate OpenAI-compatible base URL
    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds (transport default when unset)
    #[arg(long, value_name = "SECONDS", global = true)]
    timeout: Option<u64>,
}

impl ConnectionArgs {
    fn builder(&self) -> LlmClientBuilder {
        let mut builder = LlmClientBuilder::new();
        if let Some(key) = &self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
    }
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Check the endpoint and list chat-capable models
    Probe,
    /// Annotate a fixed three-item sample to verify the whole path
    SelfTest(SelfTestCommand),
    /// Annotate items read one per line from a file or stdin
    Run(RunCommand),
}

/// Run the built-in smoke test
#[derive(Parser)]
struct SelfTestCommand {
    /// Model to test
    #[arg(short, long, env = "ANNOT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,
}

/// Annotate a dataset
#[derive(Parser)]
struct RunCommand {
    /// Labeling instruction, e.g. "classify the sentiment"
    #[arg(short, long)]
    instruction: String,

    /// Comma-separated option set
    #[arg(short, long, value_name = "OPTIONS")]
    options: String,

    /// Input file with one item per line ("-" or omitted reads stdin)
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Model identifier
    #[arg(short, long, env = "ANNOT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Items sent per backend call
    #[arg(short, long, env = "ANNOT_BATCH_SIZE", default_value_t = annot::batch::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Sampling temperature between 0 and 1
    #[arg(short, long, env = "ANNOT_TEMPERATURE", default_value_t = annot::annotator::DEFAULT_TEMPERATURE)]
    temperature: f64,

    /// Output token limit, or "unlimited"
    #[arg(long, env = "ANNOT_MAX_TOKENS", default_value = "2000")]
    max_tokens: MaxTokens,
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Probe => handle_probe(&cli.connection),
        Commands::SelfTest(cmd) => handle_self_test(&cli.connection, cmd),
        Commands::Run(cmd) => handle_run(&cli.connection, cmd),
    };

    if let Err(e) = result {
        // Determine exit code based on error type
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Logs go to stderr so stdout only carries labels.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
}

/// Determines if an error is a user error (vs internal error).
///
/// User errors are invalid requests and bad configuration; everything else
/// (network, backend, I/O) is internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.is::<RequestError>()
            || matches!(
                cause.downcast_ref::<LlmError>(),
                Some(LlmError::MissingApiKey | LlmError::InvalidUrl(_))
            )
    })
}

fn build_client(connection: &ConnectionArgs) -> Result<Arc<dyn LlmClientTrait>> {
    let client = connection
        .builder()
        .build()
        .context("Failed to create LLM client")?;
    Ok(Arc::new(client))
}

fn handle_probe(connection: &ConnectionArgs) -> Result<()> {
    let client = build_client(connection)?;
    let report = probe(client.as_ref());
    if !report.success {
        anyhow::bail!("{}", report.message);
    }

    println!("{}", report.message);
    for model in &report.models {
        println!("  {model}");
    }
    Ok(())
}

fn handle_self_test(connection: &ConnectionArgs, cmd: &SelfTestCommand) -> Result<()> {
    let annotator = Annotator::new(build_client(connection)?);
    let report = self_test(&annotator, &cmd.model);

    let Some(details) = report.details.filter(|_| report.success) else {
        anyhow::bail!("{}", report.message);
    };

    println!("{}", report.message);
    println!("Instruction: {}", details.instruction);
    println!("Options: {}", details.options.join(", "));
    for (item, label) in details.items.iter().zip(&details.results) {
        println!("  [{label}] {item}");
    }
    Ok(())
}

fn handle_run(connection: &ConnectionArgs, cmd: &RunCommand) -> Result<()> {
    let items = read_items(cmd.input.as_deref())?;
    let client = build_client(connection)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute_run(cmd, &items, client, &mut out)
}

/// Executes the run command logic with a provided client.
///
/// This function is separated from `handle_run` to allow testing with mock clients.
fn execute_run(
    cmd: &RunCommand,
    items: &[String],
    client: Arc<dyn LlmClientTrait>,
    out: &mut impl Write,
) -> Result<()> {
    let options = parse_list(&cmd.options);
    if options.is_empty() {
        anyhow::bail!(RequestError::NoOptions);
    }

    let template = BatchTemplate {
        instruction: cmd.instruction.clone(),
        options,
        model: cmd.model.clone(),
        temperature: cmd.temperature,
        max_tokens: cmd.max_tokens,
    };

    let annotator = Annotator::new(client);
    let runner = BatchRunner::new(&annotator).batch_size(cmd.batch_size);
    let run = runner.run(items, &template, |_| {})?;

    for label in &run.labels {
        writeln!(out, "{label}").context("Failed to write labels")?;
    }

    if !run.failed_batches.is_empty() {
        tracing::warn!(
            failed_batches = ?run.failed_batches,
            "some batches could not be annotated; try a smaller batch size or a larger token limit"
        );
    }

    Ok(())
}

/// Reads one item per non-blank line from `path`, or stdin for `None` / `-`.
fn read_items(path: Option<&Path>) -> Result<Vec<String>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            collect_lines(BufReader::new(file))
        }
        _ => collect_lines(io::stdin().lock()),
    }
}

fn collect_lines(reader: impl BufRead) -> Result<Vec<String>> {
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read input")?;
        let line = line.trim_end();
        if !line.trim().is_empty() {
            items.push(line.to_string());
        }
    }
    Ok(items)
}

/// Parses a comma-separated list.
///
/// Splits on commas, trims whitespace from each entry, and filters out empty strings.
fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
