//! Askdoc CLI - ask questions about a local text document
//!
//! Usage:
//!   askdoc notes.txt                          interactive question loop
//!   askdoc notes.txt -q "What is covered?"    single question, then exit
//!   askdoc notes.txt --chunk-size 500 --chunk-overlap 100

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use askdoc_core::{AppConfig, LlmClient, LlmProvider};
use askdoc_index::{create_embedding_client, EmbeddingClient};
use askdoc_rag::{create_llm_client, Pipeline};

#[derive(Parser)]
#[command(name = "askdoc")]
#[command(about = "Retrieval-augmented question answering over a local document")]
#[command(version)]
struct Cli {
    /// Path to the UTF-8 text file to load
    file: PathBuf,

    /// Ask a single question and exit (non-interactive mode)
    #[arg(short, long)]
    question: Option<String>,

    /// Maximum chunk size in characters
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Overlap between chunks in characters
    #[arg(long)]
    chunk_overlap: Option<usize>,

    /// Number of chunks retrieved per question
    #[arg(long)]
    top_k: Option<usize>,

    /// OpenAI API key (alternatively set OPENAI_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Print the answer as JSON (single-question mode only)
    #[arg(long, requires = "question")]
    json: bool,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };

    // Command-line flags take precedence over file and environment
    if let Some(key) = cli.api_key {
        config.llm.openai_api_key = Some(key);
    }
    if let Some(size) = cli.chunk_size {
        config.pipeline.chunk_size = size;
    }
    if let Some(overlap) = cli.chunk_overlap {
        config.pipeline.chunk_overlap = overlap;
    }
    if let Some(k) = cli.top_k {
        config.pipeline.top_k = k;
    }

    init_tracing(&config.logging.level);

    if !cli.file.exists() {
        anyhow::bail!("file not found: {}", cli.file.display());
    }

    let needs_key = matches!(config.llm.provider, LlmProvider::OpenAI | LlmProvider::Azure);
    if needs_key && config.llm.openai_api_key.is_none() {
        anyhow::bail!(
            "OpenAI API key not provided; set the OPENAI_API_KEY environment variable \
             or pass --api-key"
        );
    }

    let embedder: Arc<dyn EmbeddingClient> = Arc::from(create_embedding_client(&config.llm)?);
    let generator: Arc<dyn LlmClient> = Arc::from(create_llm_client(&config.llm)?);

    let mut pipeline = Pipeline::new(embedder, generator, config.pipeline.clone());

    println!("Loading document: {}", cli.file.display());
    pipeline
        .initialize(&cli.file)
        .await
        .context("failed to initialize pipeline")?;
    pipeline.activate().context("failed to activate pipeline")?;
    println!("Ready to answer questions about: {}\n", cli.file.display());

    match cli.question {
        Some(question) => single_question(&pipeline, &question, cli.json).await,
        None => interactive(&pipeline).await,
    }
}

/// Answer one question and exit
async fn single_question(pipeline: &Pipeline, question: &str, json: bool) -> anyhow::Result<()> {
    if !json {
        println!("Question: {question}\n");
    }

    let answer = pipeline.ask(question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("Answer: {}", answer.text);
    if !answer.sources.is_empty() {
        println!("\n(based on {} source chunk(s))", answer.sources.len());
    }

    Ok(())
}

/// Interactive question loop; `quit`, `exit`, or `q` to leave
async fn interactive(pipeline: &Pipeline) -> anyhow::Result<()> {
    println!("Interactive mode. Type your questions below; 'quit' to exit.");

    let stdin = std::io::stdin();
    loop {
        print!("\nYour question: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break; // EOF
        }

        let question = line.trim();
        if question.is_empty() {
            println!("Please enter a question.");
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            println!("Goodbye!");
            break;
        }

        match pipeline.ask(question).await {
            Ok(answer) => {
                println!("\nAnswer: {}", answer.text);
                if !answer.sources.is_empty() {
                    println!("(based on {} source chunk(s))", answer.sources.len());
                }
            }
            // Keep the loop alive on per-question failures
            Err(err) => eprintln!("Error: {err}"),
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
