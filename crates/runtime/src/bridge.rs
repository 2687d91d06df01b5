//! The one-shot command driver: stdin JSON in, stdout JSON out.
//!
//! ```text
//! AwaitInput ──read──▶ Parsing ──text ok──▶ Synthesizing ──▶ Done(response)
//!      │                  │
//!      └──────────────────┴──── any failure ───────────────▶ Done(error)
//! ```

use std::io::{Read, Write};

use serde_json::Value;
use tracing::{debug, warn};
use tts_core::{ModelLoader, SynthesisRequest, SynthesisResponse, TtsResult, WavFormat};

use crate::loader::ModelSlot;
use crate::synthesizer::{
    prefixed, Synthesizer, MSG_EMPTY_TEXT, MSG_INVALID_JSON, MSG_PROCESSING_PREFIX,
};

/// Exit status for a successful invocation.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit status whenever the response carries an error.
pub const EXIT_FAILURE: i32 = 1;

/// States of a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverState {
    /// Nothing read yet.
    AwaitInput,
    /// Raw standard input, not yet parsed.
    Parsing(String),
    /// A valid request waiting for synthesis.
    Synthesizing(SynthesisRequest),
    /// Final response.
    Done(SynthesisResponse),
}

/// Owns the model slot for the lifetime of the process.
pub struct Bridge<L> {
    slot: ModelSlot<L>,
    synthesizer: Synthesizer,
}

impl<L: ModelLoader> std::fmt::Debug for Bridge<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("slot", &self.slot)
            .field("synthesizer", &self.synthesizer)
            .finish()
    }
}

impl<L: ModelLoader> Bridge<L> {
    pub fn new(loader: L, wav_format: WavFormat) -> Self {
        Self {
            slot: ModelSlot::new(loader),
            synthesizer: Synthesizer::new(wav_format),
        }
    }

    /// The model slot.
    pub fn slot(&self) -> &ModelSlot<L> {
        &self.slot
    }

    /// Drive the state machine to completion.
    pub fn respond<R: Read>(&self, mut input: R) -> SynthesisResponse {
        let mut state = DriverState::AwaitInput;
        loop {
            state = match state {
                DriverState::AwaitInput => read_input(&mut input),
                DriverState::Parsing(raw) => parse_request(&raw),
                DriverState::Synthesizing(request) => {
                    DriverState::Done(self.synthesizer.synthesize(&self.slot, &request.text))
                }
                DriverState::Done(response) => return response,
            };
        }
    }

    /// Read one request, write one newline-terminated JSON line, and return
    /// the process exit status.
    pub fn run<R: Read, W: Write>(&self, input: R, mut output: W) -> TtsResult<i32> {
        let response = self.respond(input);
        writeln!(output, "{}", response.to_json_line())?;
        output.flush()?;
        Ok(exit_code(&response))
    }
}

/// Exit status for a response.
pub fn exit_code(response: &SynthesisResponse) -> i32 {
    if response.is_error() {
        EXIT_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

fn read_input<R: Read>(input: &mut R) -> DriverState {
    let mut raw = String::new();
    match input.read_to_string(&mut raw) {
        Ok(bytes) => {
            debug!(bytes, "read request");
            DriverState::Parsing(raw)
        }
        Err(e) => {
            warn!("failed to read standard input: {e}");
            DriverState::Done(SynthesisResponse::error(prefixed(MSG_PROCESSING_PREFIX, e)))
        }
    }
}

/// Validate raw input text as a synthesis request.
pub fn parse_request(raw: &str) -> DriverState {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("invalid JSON input: {e}");
            return DriverState::Done(SynthesisResponse::error(MSG_INVALID_JSON));
        }
    };

    let Value::Object(fields) = value else {
        return DriverState::Done(SynthesisResponse::error(prefixed(
            MSG_PROCESSING_PREFIX,
            format!("expected a JSON object, got {}", json_type(&value)),
        )));
    };

    match fields.get("text") {
        None | Some(Value::Null) => DriverState::Done(SynthesisResponse::error(MSG_EMPTY_TEXT)),
        Some(Value::String(text)) if text.trim().is_empty() => {
            DriverState::Done(SynthesisResponse::error(MSG_EMPTY_TEXT))
        }
        Some(Value::String(text)) => {
            DriverState::Synthesizing(SynthesisRequest::new(text.as_str()))
        }
        Some(other) => DriverState::Done(SynthesisResponse::error(prefixed(
            MSG_PROCESSING_PREFIX,
            format!("\"text\" must be a string, got {}", json_type(other)),
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
