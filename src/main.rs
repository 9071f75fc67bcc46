#[macro_use]
extern crate tracing;

use clap::Parser;
use eyre::{Result, WrapErr};
use harvest_interpreter::{
    prompt::PRODUCE_ANALYSIS_QUESTION, process_states_with_handler, Config,
    ConsoleInterpretationHandler, GeminiClient, ImagePayload, InterpretationState, Interpreter,
    Request,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "harvest-interpreter")]
#[command(about = "Analyze produce photos with Gemini and find the best county to sell in", long_about = None)]
struct Args {
    /// Enable debug logging, including every streamed chunk
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Path to custom configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Question to ask instead of the default produce analysis
    #[arg(short, long)]
    question: Option<String>,

    /// Produce photos to analyze
    #[arg(value_name = "IMAGE")]
    images: Vec<PathBuf>,
}

fn init_logging(debug: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if debug {
                    "harvest_interpreter=debug".into()
                } else {
                    "harvest_interpreter=info".into()
                }
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Starting Harvest Interpreter");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    init_logging(args.debug);

    let config = Config::load(args.config.clone())?;

    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        images.push(ImagePayload::from_path(path).await?);
    }
    if images.is_empty() {
        warn!("No images given, asking the question on its own");
    }

    let question = args
        .question
        .unwrap_or_else(|| PRODUCE_ANALYSIS_QUESTION.to_string());

    let generator = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.model.clone(),
    )?);
    let shutdown_token = CancellationToken::new();
    let interpreter = Interpreter::new(generator, &config.stream, shutdown_token.clone());

    let task = interpreter
        .submit(Request::new(question, images))
        .wrap_err("Request rejected")?;
    let state_rx = interpreter.subscribe();

    let outcome = tokio::select! {
        outcome = process_states_with_handler(state_rx, ConsoleInterpretationHandler::new()) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling request");
            interpreter.shutdown();
            interpreter.current()
        }
    };

    interpreter.shutdown();
    if tokio::time::timeout(std::time::Duration::from_secs(3), task)
        .await
        .is_err()
    {
        warn!("Request task did not stop within timeout");
    }

    match outcome {
        InterpretationState::Completed { .. } => Ok(()),
        InterpretationState::Failed { message } => Err(eyre::eyre!(message)),
        other => Err(eyre::eyre!("Request ended in unexpected state: {}", other.name())),
    }
}
