#[macro_use]
extern crate tracing;

#[macro_use]
extern crate eyre;

pub mod accumulator;
pub mod config;
pub mod error;
pub mod extraction;
pub mod gemini;
pub mod generator;
pub mod handlers;
pub mod interpreter;
pub mod prompt;
pub mod request;
pub mod state;

// Re-export commonly used items
pub use accumulator::StreamAccumulator;
pub use config::{Config, ScanMode, StreamConfig};
pub use error::{InterpretError, UpstreamError};
pub use extraction::ExtractedFields;
pub use gemini::GeminiClient;
pub use generator::{ChunkStream, ContentGenerator, ScriptedGenerator};
pub use handlers::{
    process_states_with_handler, ConsoleInterpretationHandler, InterpretationHandler,
};
pub use interpreter::Interpreter;
pub use request::{ImagePayload, Request};
pub use state::{InterpretationState, ResultStateMachine};
