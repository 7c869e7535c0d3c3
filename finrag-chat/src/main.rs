use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use finrag_chat::engine::prepare_retriever;
use finrag_chat::logging::init_logging;
use finrag_chat::{AppConfig, ChatEngine, RejectReason, TurnOutcome};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// Ask questions about 10-Q and 10-K filings.
#[derive(Debug, Parser)]
#[command(name = "finrag", version, about)]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of extracted filing text.
    #[arg(long, global = true)]
    corpus: Option<PathBuf>,

    /// Where to store the vector index.
    #[arg(long, global = true, conflicts_with = "no_index_file")]
    index: Option<PathBuf>,

    /// Keep the index in memory only.
    #[arg(long, global = true)]
    no_index_file: bool,

    /// Chunks retrieved per question.
    #[arg(long, global = true)]
    top_k: Option<usize>,

    /// Embedding backend, e.g. `hash:384` or `openai:text-embedding-3-small`.
    #[arg(long, global = true)]
    embedding_model: Option<String>,

    /// Generation backend, e.g. `openai:gpt-3.5-turbo` or `ollama:llama2`.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat.
    Chat,
    /// Answer a single question and exit.
    Ask {
        /// The question.
        question: String,
    },
    /// Build or refresh the on-disk index and exit.
    Index,
}

impl Cli {
    fn app_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(corpus) = &self.corpus {
            config.corpus_dir = corpus.clone();
        }
        if let Some(index) = &self.index {
            config.index_path = Some(index.clone());
        }
        if self.no_index_file {
            config.index_path = None;
        }
        if let Some(top_k) = self.top_k {
            config.rag.top_k = top_k;
        }
        if let Some(model) = &self.embedding_model {
            config.embedding_model_identifier = model.clone();
        }
        if let Some(backend) = &self.backend {
            config.generation_backend_identifier = backend.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

fn print_outcome(outcome: &TurnOutcome, answer: Option<&str>) {
    match outcome {
        TurnOutcome::Completed => println!("{}", answer.unwrap_or_default()),
        TurnOutcome::Rejected(RejectReason::EmptyInput) => {}
        TurnOutcome::Rejected(RejectReason::TurnInFlight) => {
            eprintln!("Still answering the previous question.")
        }
        TurnOutcome::Failed(failure) => eprintln!("Sorry, I could not answer that ({failure})."),
    }
}

async fn chat(engine: &ChatEngine) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialise line editor")?;
    let mut transcript = String::new();
    println!("Ask about the filings. Ctrl-D to quit.");

    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = editor.add_history_entry(line.as_str()) {
            tracing::debug!(error = %e, "failed to record line history");
        }

        let reply = engine.handle_turn(&line, &transcript).await;
        transcript = reply.transcript;
        print_outcome(&reply.outcome, reply.answer.as_deref());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_json);
    let config = cli.app_config()?;

    match &cli.command {
        Command::Index => {
            let retriever = prepare_retriever(&config).await.context("failed to build index")?;
            println!("Indexed {} chunks.", retriever.index().len());
        }
        Command::Ask { question } => {
            let engine = ChatEngine::start(&config).await.context("failed to start")?;
            let result = engine.session().submit(question).await;
            print_outcome(&result.outcome, result.answer());
            if !result.is_completed() {
                std::process::exit(1);
            }
        }
        Command::Chat => {
            let engine = ChatEngine::start(&config).await.context("failed to start")?;
            chat(&engine).await?;
        }
    }
    Ok(())
}
