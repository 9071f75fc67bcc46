pub mod console_handler;
mod interpretation_handler;

pub use console_handler::ConsoleInterpretationHandler;

pub use interpretation_handler::{process_states_with_handler, InterpretationHandler};
