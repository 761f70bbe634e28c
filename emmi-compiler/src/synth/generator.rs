//! External program generators.
//!
//! A generator turns a free-text request into raw text that should contain a
//! program document. The orchestrator never trusts that text: it extracts the
//! JSON object and hands it to the sanitizer.

use std::future::Future;
use std::time::Duration;

use serde_json::Value as Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("{0}")]
    Unavailable(String),

    #[error("generator timed out after {ms} ms")]
    Timeout { ms: u64 },

    #[error("AI returned invalid JSON.")]
    InvalidResponse,

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

pub trait Generator {
    /// Raw reply for `message`, ideally one JSON object shaped like
    /// `{"program": {...}, "explanation": "...", "warnings": []}`.
    fn generate(&self, message: &str) -> impl Future<Output = Result<String, GeneratorError>> + Send;
}

/// Always answers with the same text, optionally after a delay.
#[derive(Debug, Clone)]
pub struct CannedGenerator {
    response: String,
    delay: Option<Duration>,
}

impl CannedGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into(), delay: None }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Generator for CannedGenerator {
    fn generate(&self, _message: &str) -> impl Future<Output = Result<String, GeneratorError>> + Send {
        let response = self.response.clone();
        let delay = self.delay;
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(response)
        }
    }
}

/// No generator configured; every request goes to the local translator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl Generator for OfflineGenerator {
    fn generate(&self, _message: &str) -> impl Future<Output = Result<String, GeneratorError>> + Send {
        async { Err(GeneratorError::Unavailable("no generator configured.".to_string())) }
    }
}

/// The whole text if it parses, otherwise the slice from the first `{` to the
/// last `}`.
pub fn extract_json_object(text: &str) -> Option<Json> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Json>(trimmed) {
        return value.is_object().then_some(value);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Json>(&trimmed[start..=end])
        .ok()
        .filter(Json::is_object)
}

/// System prompt for chat-model generators.
pub const GENERATOR_PROMPT: &str = r#"You convert user intent into an EMMI robot program as JSON AST.
Return ONLY valid JSON. No markdown fences, no commentary outside JSON.

RESPONSE SHAPE:
{"program":{"initFlags":[],"setup":[],"loop":[]},"explanation":"...","warnings":[]}

NODE TYPES (use these exactly):
- {"type":"cmd","cmd":"TOKEN"}: hardware command (see VALID TOKENS below)
- {"type":"delay","ms":500}: pause in milliseconds
- {"type":"set_var","varType":"I","index":1,"op":"=","value":0}: varType I|F|C|S|B, index 1-5, op "=" or "+"
- {"type":"if","expr":{"op":"==","left":"TR","right":1},"then":[...],"else":[]}
- {"type":"while","expr":{...},"body":[...]}
- {"type":"for","start":0,"end":10,"step":1,"body":[...]}
- {"type":"switch","value":"I1","cases":[{"match":0,"body":[...]}],"default":[...]}
- {"type":"break"}

VALID CMD TOKENS (use ONLY these in cmd nodes):
Eyes: ERN(red on), ERF(red off), EGN(green on), EGF(green off), EBN(blue on), EBF(blue off), EAN(all on), EAF(all off)
Motors: MF(forward), MB(backward), ML(left), MR(right), MS(stop)
Buzzer: BS(stop), BF<hz>(tone, e.g. BF440), BP<name>(melody, e.g. BPMario)
IMPORTANT: Do NOT invent tokens. Only use the tokens listed above.

SENSOR VALUES (use in expr left/right, NOT as cmd):
TR = touch sensor, AR = audio/mic, VR = light/LDR

VARIABLE REFS: I1-I5(int), F1-F5(float), C1-C5(char), S1-S5(string), B1-B5(bool)

EXPRESSION: {"op":"==","left":"TR","right":1}  ops: ==, !=, >, >=, <, <=
VALUES may also be arithmetic: {"op":"+","left":"I1","right":1}  ops: +, -, *, /

INIT FLAGS: E=Eyes, B=Buzzer, M=Motors, T=Touch, A=Audio, V=Light, R"<name>"=wireless link
Include only flags for hardware actually used.

RULES:
- AR is ACTIVE-LOW: AR==0 means noise detected, AR==1 means quiet
- VR is INVERSE: brighter light -> lower value; direct light ~600
- For LED blink: use cmd on + delay + cmd off + delay in loop
- Use conservative safe defaults when ambiguous
- Keep explanation and warnings concise

EXAMPLE, blink red LED every 500ms:
{"program":{"initFlags":["E"],"setup":[],"loop":[{"type":"cmd","cmd":"ERN"},{"type":"delay","ms":500},{"type":"cmd","cmd":"ERF"},{"type":"delay","ms":500}]},"explanation":"Blinks red LED on/off every 500ms.","warnings":[]}"#;
