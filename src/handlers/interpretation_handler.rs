use crate::extraction::ExtractedFields;
use crate::state::InterpretationState;
use async_trait::async_trait;
use eyre::Result;
use tokio::sync::watch;

/// Trait for presenting interpretation states as they are published
#[async_trait]
pub trait InterpretationHandler: Send + Sync {
    /// Called with the transcript so far each time a chunk arrives.
    /// Fields may still change as more text streams in
    async fn on_partial(&mut self, transcript: &str, fields: &ExtractedFields) -> Result<()>;

    /// Called once with the final transcript and fields
    async fn on_completed(&mut self, transcript: &str, fields: &ExtractedFields) -> Result<()>;

    /// Called once when the request fails
    async fn on_failed(&mut self, message: &str) -> Result<()>;

    /// Called before the first state is handled (optional hook)
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called after the terminal state is handled (optional hook)
    async fn on_end(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called when handling a published state fails (optional hook)
    async fn on_handler_error(&mut self, error: String) -> Result<()> {
        error!("Handler error: {}", error);
        Ok(())
    }
}

/// Drive `handler` from published states until a terminal state is reached.
///
/// Subscribe after submitting, otherwise a terminal state left over from an
/// earlier request ends processing immediately. Intermediate states may be
/// skipped when the handler is slower than the stream; the terminal state is
/// always delivered.
pub async fn process_states_with_handler<H>(
    mut state_rx: watch::Receiver<InterpretationState>,
    mut handler: H,
) -> Result<InterpretationState>
where
    H: InterpretationHandler,
{
    handler.on_start().await?;

    loop {
        let state = state_rx.borrow_and_update().clone();

        match &state {
            InterpretationState::Idle => {}
            InterpretationState::Running { transcript, fields } => {
                if let Err(e) = handler.on_partial(transcript, fields).await {
                    let error_msg = format!("Error handling partial result: {e}");
                    handler.on_handler_error(error_msg).await?;
                }
            }
            InterpretationState::Completed { transcript, fields } => {
                if let Err(e) = handler.on_completed(transcript, fields).await {
                    let error_msg = format!("Error handling final result: {e}");
                    handler.on_handler_error(error_msg).await?;
                }
                handler.on_end().await?;
                return Ok(state);
            }
            InterpretationState::Failed { message } => {
                if let Err(e) = handler.on_failed(message).await {
                    let error_msg = format!("Error handling failure: {e}");
                    handler.on_handler_error(error_msg).await?;
                }
                handler.on_end().await?;
                return Ok(state);
            }
        }

        if state_rx.changed().await.is_err() {
            bail!("Interpreter went away before the request finished");
        }
    }
}
