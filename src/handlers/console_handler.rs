use async_trait::async_trait;
use eyre::Result;
use std::io::Write;

use super::InterpretationHandler;
use crate::extraction::ExtractedFields;

/// Handler that streams the answer to stdout and prints a summary at the end
#[derive(Default)]
pub struct ConsoleInterpretationHandler {
    printed: usize,
}

impl ConsoleInterpretationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_delta(&mut self, transcript: &str) -> Result<()> {
        let delta = transcript.get(self.printed..).unwrap_or(transcript);
        if !delta.is_empty() {
            print!("{}", delta);
            std::io::stdout().flush()?;
        }
        self.printed = transcript.len();
        Ok(())
    }
}

#[async_trait]
impl InterpretationHandler for ConsoleInterpretationHandler {
    async fn on_partial(&mut self, transcript: &str, _fields: &ExtractedFields) -> Result<()> {
        self.print_delta(transcript)
    }

    async fn on_completed(&mut self, transcript: &str, fields: &ExtractedFields) -> Result<()> {
        self.print_delta(transcript)?;
        println!("\n");

        match &fields.best_county {
            Some(county) => println!("Best county for selling: {}", county),
            None => println!("No best county found in the answer"),
        }
        if let Some(link) = &fields.maps_link {
            println!("Map: {}", link);
        }
        Ok(())
    }

    async fn on_failed(&mut self, message: &str) -> Result<()> {
        if self.printed > 0 {
            println!();
        }
        eprintln!("Error: {}", message);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        println!("Analyzing images...\n");
        Ok(())
    }
}
