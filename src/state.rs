use serde::Serialize;

use crate::accumulator::StreamAccumulator;
use crate::config::ScanMode;
use crate::error::InterpretError;
use crate::extraction::ExtractedFields;
use crate::request::Request;

pub const FALLBACK_ERROR_MESSAGE: &str = "An unknown error occurred";

/// What a presentation layer observes for the current request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InterpretationState {
    Idle,
    Running {
        transcript: String,
        fields: ExtractedFields,
    },
    Completed {
        transcript: String,
        fields: ExtractedFields,
    },
    Failed {
        message: String,
    },
}

impl InterpretationState {
    pub fn name(&self) -> &'static str {
        match self {
            InterpretationState::Idle => "idle",
            InterpretationState::Running { .. } => "running",
            InterpretationState::Completed { .. } => "completed",
            InterpretationState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InterpretationState::Completed { .. } | InterpretationState::Failed { .. }
        )
    }

    fn running() -> Self {
        InterpretationState::Running {
            transcript: String::new(),
            fields: ExtractedFields::default(),
        }
    }
}

/// `Idle -> Running -> {Completed, Failed}`. Terminal states only leave
/// through [`start`](Self::start), which goes straight back to `Running`.
#[derive(Debug)]
pub struct ResultStateMachine {
    state: InterpretationState,
    accumulator: StreamAccumulator,
}

impl ResultStateMachine {
    pub fn new(scan_mode: ScanMode) -> Self {
        Self {
            state: InterpretationState::Idle,
            accumulator: StreamAccumulator::new(scan_mode),
        }
    }

    pub fn state(&self) -> &InterpretationState {
        &self.state
    }

    /// Start a new request from any state. An invalid request leaves the
    /// current state untouched.
    pub fn start(&mut self, request: &Request) -> Result<&InterpretationState, InterpretError> {
        self.accumulator.start(request)?;
        self.state = InterpretationState::running();
        Ok(&self.state)
    }

    pub fn on_chunk(&mut self, text: &str) -> Result<&InterpretationState, InterpretError> {
        self.require_running("chunk")?;

        let (fields, transcript) = self.accumulator.on_chunk(text)?;
        self.state = InterpretationState::Running {
            transcript: transcript.to_string(),
            fields: fields.clone(),
        };
        Ok(&self.state)
    }

    pub fn on_stream_end(&mut self) -> Result<&InterpretationState, InterpretError> {
        self.require_running("stream end")?;

        let (transcript, fields) = self.accumulator.finish()?;
        info!(
            "Interpretation completed: {} bytes, county={:?}, map link={}",
            transcript.len(),
            fields.best_county,
            fields.maps_link.is_some()
        );
        self.state = InterpretationState::Completed { transcript, fields };
        Ok(&self.state)
    }

    /// Fail the request with the producer's message, or a generic one when
    /// the producer gave none.
    pub fn on_stream_error(&mut self, message: &str) -> Result<&InterpretationState, InterpretError> {
        self.require_running("stream error")?;

        let message = match message.trim() {
            "" => FALLBACK_ERROR_MESSAGE.to_string(),
            trimmed => trimmed.to_string(),
        };
        self.accumulator
            .fail(&InterpretError::UpstreamFailure(message.clone()))?;

        if let Some(partial) = self.accumulator.diagnostic_transcript() {
            debug!("Discarding {} bytes of partial transcript", partial.len());
        }

        self.state = InterpretationState::Failed { message };
        Ok(&self.state)
    }

    fn require_running(&self, event: &'static str) -> Result<(), InterpretError> {
        if !matches!(self.state, InterpretationState::Running { .. }) {
            return Err(InterpretError::IllegalState {
                event,
                state: self.state.name(),
            });
        }
        debug_assert_eq!(self.accumulator.status_name(), "open");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> Request {
        Request::new("Which county?", vec![])
    }

    #[test]
    fn happy_path_transitions() {
        let mut machine = ResultStateMachine::new(ScanMode::Incremental);
        assert_eq!(machine.state(), &InterpretationState::Idle);

        let state = machine.start(&request()).unwrap();
        assert_eq!(state, &InterpretationState::running());

        machine.on_chunk("Best county for selling: Nak").unwrap();
        machine.on_chunk("uru\nCoordinates: -0.303,36.080").unwrap();

        match machine.on_stream_end().unwrap() {
            InterpretationState::Completed { transcript, fields } => {
                assert_eq!(
                    transcript,
                    "Best county for selling: Nakuru\nCoordinates: -0.303,36.080"
                );
                assert_eq!(fields.best_county.as_deref(), Some("Nakuru"));
                assert_eq!(
                    fields.maps_link.as_deref(),
                    Some("https://www.google.com/maps/search/?api=1&query=-0.303,36.080")
                );
            }
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn missing_coordinates_leave_link_unset() {
        let mut machine = ResultStateMachine::new(ScanMode::Full);
        machine.start(&request()).unwrap();
        machine.on_chunk("Best county for selling: Meru\n").unwrap();

        match machine.on_stream_end().unwrap() {
            InterpretationState::Completed { fields, .. } => {
                assert_eq!(fields.best_county.as_deref(), Some("Meru"));
                assert_eq!(fields.maps_link, None);
            }
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn invalid_request_keeps_state() {
        let mut machine = ResultStateMachine::new(ScanMode::Full);
        let err = machine.start(&Request::new("", vec![])).unwrap_err();
        assert!(matches!(err, InterpretError::InvalidRequest(_)));
        assert_eq!(machine.state(), &InterpretationState::Idle);
    }

    #[test]
    fn events_outside_running_are_rejected() {
        let mut machine = ResultStateMachine::new(ScanMode::Full);
        assert!(matches!(
            machine.on_chunk("hello"),
            Err(InterpretError::IllegalState { event: "chunk", state: "idle" })
        ));
        assert!(machine.on_stream_end().is_err());
        assert!(machine.on_stream_error("boom").is_err());

        machine.start(&request()).unwrap();
        machine.on_stream_end().unwrap();
        assert!(matches!(
            machine.on_chunk("late"),
            Err(InterpretError::IllegalState { state: "completed", .. })
        ));
        assert!(machine.on_stream_error("late").is_err());
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn error_after_chunks_fails_without_transcript() {
        let mut machine = ResultStateMachine::new(ScanMode::Incremental);
        machine.start(&request()).unwrap();
        machine.on_chunk("first ").unwrap();
        machine.on_chunk("second").unwrap();

        let state = machine.on_stream_error("connection reset").unwrap();
        assert_eq!(
            state,
            &InterpretationState::Failed {
                message: "connection reset".to_string()
            }
        );
    }

    #[test]
    fn blank_error_message_uses_fallback() {
        let mut machine = ResultStateMachine::new(ScanMode::Incremental);
        machine.start(&request()).unwrap();
        let state = machine.on_stream_error("  ").unwrap();
        assert_eq!(
            state,
            &InterpretationState::Failed {
                message: FALLBACK_ERROR_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn terminal_states_restart_into_running() {
        let mut machine = ResultStateMachine::new(ScanMode::Incremental);
        machine.start(&request()).unwrap();
        machine.on_chunk("Best county for selling: Embu\n").unwrap();
        machine.on_stream_error("dropped").unwrap();

        machine.start(&request()).unwrap();
        assert_eq!(machine.state(), &InterpretationState::running());
        machine.on_chunk("clean slate").unwrap();
        match machine.on_stream_end().unwrap() {
            InterpretationState::Completed { transcript, fields } => {
                assert_eq!(transcript, "clean slate");
                assert_eq!(fields.best_county, None);
            }
            other => panic!("expected completed, got {other:?}"),
        }
    }

    #[test]
    fn serializes_with_state_tag() {
        let json = serde_json::to_value(InterpretationState::Failed {
            message: "nope".to_string(),
        })
        .unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["message"], "nope");
    }
}
