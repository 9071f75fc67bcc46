#[macro_use]
extern crate tracing;

use eyre::Result;
use harvest_interpreter::{
    process_states_with_handler, ConsoleInterpretationHandler, InterpretationState, Interpreter,
    Request, ScriptedGenerator, StreamConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const CANNED_ANSWER: &[&str] = &[
    "## Tomato\n\n● **Current maturity stage:** Breaker, turning red\n",
    "● **Remaining shelf life:** 6-8 days at room temperature\n",
    "● **Present market rate (KES):** 80 per kg\n● **Best county for sel",
    "ling:** Nakuru\n● **Coordinates:** -0.303,36.",
    "080\n● **Transportation recommendations:** Ventilated crates, early morning\n",
];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("harvest_interpreter=debug")
        .with_writer(std::io::stderr)
        .init();

    let generator = Arc::new(
        ScriptedGenerator::new(CANNED_ANSWER.iter().copied())
            .with_delay(Duration::from_millis(150)),
    );
    let interpreter =
        Interpreter::new(generator, &StreamConfig::default(), CancellationToken::new());

    let task = interpreter.submit(Request::new("What produce is this?", vec![]))?;
    let outcome =
        process_states_with_handler(interpreter.subscribe(), ConsoleInterpretationHandler::new())
            .await?;
    task.await?;

    if let InterpretationState::Completed { fields, .. } = outcome {
        info!("Replay finished with {:?}", fields);
    }
    Ok(())
}
