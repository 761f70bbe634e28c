//! Free text to a verified robot program.
//!
//! Order of attempts: the generator (bounded by a timeout), then the local
//! heuristics, then the empty fallback program. Whatever comes out is
//! sanitized, serialized and validated; a script that fails validation is
//! replaced by [`FALLBACK_SCRIPT`]. [`Translator::translate`] never fails.

pub mod generator;
pub mod heuristics;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::ir::ast::Program;
use crate::sanitize::{sanitize_document, sanitize_program};
use crate::script::{self, FALLBACK_SCRIPT};

use generator::{Generator, GeneratorError, extract_json_object};
use heuristics::build_heuristic_program;

pub const DEFAULT_TIMEOUT_MS: u64 = 15_000;

const DEFAULT_EXPLANATION: &str = "Program generated successfully.";
const FALLBACK_EXPLANATION: &str = "Using safe fallback program.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Translation {
    pub program: Program,
    pub script: String,
    pub explanation: String,
    pub warnings: Vec<String>,
}

pub struct Translator<G> {
    generator: G,
    timeout: Duration,
}

impl<G: Generator> Translator<G> {
    pub fn new(generator: G) -> Self {
        Self { generator, timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn translate(&self, message: &str) -> Translation {
        let mut warnings = Vec::new();

        match self.call_generator(message).await {
            Ok(raw) => {
                info!("using generator output");
                let document = sanitize_document(&raw);
                warnings.extend(document.warnings);
                let explanation = document.explanation.unwrap_or_else(|| DEFAULT_EXPLANATION.to_string());
                return finish(document.program, explanation, warnings);
            }
            Err(err) => {
                warn!(error = %err, "generator failed");
                warnings.push(format!("AI service unavailable: {}", err));
            }
        }

        if let Some(heuristic) = build_heuristic_program(message) {
            info!("using local translator");
            let sanitized = sanitize_program(&heuristic.program);
            warnings.extend(sanitized.warnings);
            warnings.extend(heuristic.warnings);
            return finish(sanitized.program, heuristic.explanation, warnings);
        }

        fallback(warnings, "Could not generate program automatically.".to_string())
    }

    async fn call_generator(&self, message: &str) -> Result<Json, GeneratorError> {
        let reply = match tokio::time::timeout(self.timeout, self.generator.generate(message)).await {
            Ok(reply) => reply?,
            Err(_) => {
                return Err(GeneratorError::Timeout { ms: self.timeout.as_millis() as u64 });
            }
        };
        debug!(bytes = reply.len(), "generator replied");
        extract_json_object(&reply).ok_or(GeneratorError::InvalidResponse)
    }
}

fn finish(program: Program, explanation: String, warnings: Vec<String>) -> Translation {
    let checked = script::serialize(&program).and_then(|text| {
        script::validate_script(&text)?;
        Ok(text)
    });
    match checked {
        Ok(script) => {
            info!(script = %script, warnings = warnings.len(), "translation ready");
            Translation { program, script, explanation, warnings }
        }
        Err(err) => {
            warn!(error = %err, "candidate script rejected");
            fallback(warnings, format!("Validation failed: {}", err))
        }
    }
}

fn fallback(mut warnings: Vec<String>, reason: String) -> Translation {
    warnings.push(reason);
    Translation {
        program: Program::empty(),
        script: FALLBACK_SCRIPT.to_string(),
        explanation: FALLBACK_EXPLANATION.to_string(),
        warnings,
    }
}
