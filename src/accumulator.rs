use crate::config::ScanMode;
use crate::error::InterpretError;
use crate::extraction::{extract, ExtractedFields};
use crate::request::Request;

/// Identifies one accumulation started by [`StreamAccumulator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccumulationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorStatus {
    Idle,
    Open,
    Closed,
    Aborted,
}

impl AccumulatorStatus {
    fn as_str(self) -> &'static str {
        match self {
            AccumulatorStatus::Idle => "idle",
            AccumulatorStatus::Open => "open",
            AccumulatorStatus::Closed => "closed",
            AccumulatorStatus::Aborted => "aborted",
        }
    }
}

/// Appends streamed chunks to a transcript and re-derives [`ExtractedFields`]
/// after every chunk.
///
/// In [`ScanMode::Incremental`] only the text from the start of the last
/// unterminated line is re-scanned. Extraction patterns never span a newline,
/// so matches in completed lines cannot change and their latest values are
/// kept in `settled`. The result is identical to a full re-scan.
#[derive(Debug)]
pub struct StreamAccumulator {
    scan_mode: ScanMode,
    status: AccumulatorStatus,
    next_id: u64,
    transcript: String,
    fields: ExtractedFields,
    settled: ExtractedFields,
    settled_len: usize,
    chunk_count: usize,
}

impl StreamAccumulator {
    pub fn new(scan_mode: ScanMode) -> Self {
        Self {
            scan_mode,
            status: AccumulatorStatus::Idle,
            next_id: 0,
            transcript: String::new(),
            fields: ExtractedFields::default(),
            settled: ExtractedFields::default(),
            settled_len: 0,
            chunk_count: 0,
        }
    }

    /// Begin a new transcript, discarding whatever was accumulated before
    pub fn start(&mut self, request: &Request) -> Result<AccumulationId, InterpretError> {
        request.validate()?;

        if self.status == AccumulatorStatus::Open {
            debug!(
                "Discarding in-flight transcript ({} bytes, {} chunks)",
                self.transcript.len(),
                self.chunk_count
            );
        }

        self.next_id += 1;
        self.status = AccumulatorStatus::Open;
        self.transcript.clear();
        self.fields = ExtractedFields::default();
        self.settled = ExtractedFields::default();
        self.settled_len = 0;
        self.chunk_count = 0;

        Ok(AccumulationId(self.next_id))
    }

    /// Append a chunk and return the re-derived fields with the transcript so far
    pub fn on_chunk(&mut self, text: &str) -> Result<(&ExtractedFields, &str), InterpretError> {
        self.require_open("chunk")?;

        self.transcript.push_str(text);
        self.chunk_count += 1;

        self.fields = match self.scan_mode {
            ScanMode::Full => extract(&self.transcript),
            ScanMode::Incremental => self.rescan_tail(),
        };

        trace!(
            "Chunk #{} applied: {} bytes, transcript now {} bytes",
            self.chunk_count,
            text.len(),
            self.transcript.len()
        );

        Ok((&self.fields, &self.transcript))
    }

    /// Close the transcript and hand back the final text and fields
    pub fn finish(&mut self) -> Result<(String, ExtractedFields), InterpretError> {
        self.require_open("finish")?;
        self.status = AccumulatorStatus::Closed;

        debug!(
            "Accumulation closed after {} chunks ({} bytes)",
            self.chunk_count,
            self.transcript.len()
        );

        Ok((self.transcript.clone(), self.fields.clone()))
    }

    /// Abort the accumulation. The transcript stays readable through
    /// [`diagnostic_transcript`](Self::diagnostic_transcript) only.
    pub fn fail(&mut self, error: &InterpretError) -> Result<(), InterpretError> {
        self.require_open("fail")?;
        self.status = AccumulatorStatus::Aborted;

        warn!(
            "Accumulation aborted after {} chunks: {}",
            self.chunk_count, error
        );

        Ok(())
    }

    pub fn status(&self) -> AccumulatorStatus {
        self.status
    }

    pub fn fields(&self) -> &ExtractedFields {
        &self.fields
    }

    /// Whatever was received before an abort, for logging
    pub fn diagnostic_transcript(&self) -> Option<&str> {
        (self.status == AccumulatorStatus::Aborted).then_some(self.transcript.as_str())
    }

    pub(crate) fn status_name(&self) -> &'static str {
        self.status.as_str()
    }

    fn require_open(&self, event: &'static str) -> Result<(), InterpretError> {
        if self.status != AccumulatorStatus::Open {
            return Err(InterpretError::IllegalState {
                event,
                state: self.status.as_str(),
            });
        }
        Ok(())
    }

    fn rescan_tail(&mut self) -> ExtractedFields {
        let line_start = self
            .transcript
            .rfind('\n')
            .map(|idx| idx + 1)
            .unwrap_or(0)
            .max(self.settled_len);

        if line_start > self.settled_len {
            let newly_settled = extract(&self.transcript[self.settled_len..line_start]);
            self.settled = std::mem::take(&mut self.settled).overlay(newly_settled);
            self.settled_len = line_start;
        }

        self.settled
            .clone()
            .overlay(extract(&self.transcript[self.settled_len..]))
    }
}
