//! Local translator used when no generator answers.
//!
//! A couple of fixed templates keyed on words in the request. The output is a
//! raw program document and goes through the sanitizer like generator output.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Value as Json, json};

pub const DEFAULT_DELAY_MS: u64 = 500;
pub const MIN_DELAY_MS: u64 = 20;
pub const MAX_DELAY_MS: u64 = 10_000;

pub const LOCAL_TRANSLATOR_WARNING: &str = "Used deterministic local translator for this request.";

#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicProgram {
    pub program: Json,
    pub explanation: String,
    pub warnings: Vec<String>,
}

fn millis_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(\d{2,5})\s*(ms|msec|millisecond)").expect("millis pattern"))
}

fn seconds_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)(\d{1,3})\s*(s|sec|second)").expect("seconds pattern"))
}

/// Delay mentioned in the request, clamped to `[20, 10000]` ms.
pub fn parse_requested_delay_ms(text: &str) -> u64 {
    let captured = |pattern: &Regex| -> Option<u64> { pattern.captures(text)?.get(1)?.as_str().parse().ok() };
    let requested = if let Some(ms) = captured(millis_pattern()) {
        ms
    } else if let Some(seconds) = captured(seconds_pattern()) {
        seconds * 1000
    } else {
        return DEFAULT_DELAY_MS;
    };
    requested.clamp(MIN_DELAY_MS, MAX_DELAY_MS)
}

pub fn build_heuristic_program(message: &str) -> Option<HeuristicProgram> {
    let text = message.to_lowercase();
    touch_color_cycle(&text).or_else(|| eye_control(&text))
}

/// Touch steps I1 through 0, 1, 2 and the eyes show one color per state.
fn touch_color_cycle(text: &str) -> Option<HeuristicProgram> {
    let mentions_state = text.contains("i1") || text.contains("state");
    let mentions_colors = ["green", "red", "blue"].iter().all(|color| text.contains(color));
    if !(mentions_state && text.contains("touch") && mentions_colors) {
        return None;
    }

    let debounce = if text.contains("500") || text.contains("debounce") { 500 } else { 300 };
    let show = |token: &str| json!([{"type": "cmd", "cmd": "EAF"}, {"type": "cmd", "cmd": token}]);
    let program = json!({
        "initFlags": ["E", "T"],
        "setup": [
            {"type": "set_var", "varType": "I", "index": 1, "op": "=", "value": 0}
        ],
        "loop": [
            {
                "type": "if",
                "expr": {"op": "==", "left": "TR", "right": 1},
                "then": [
                    {"type": "set_var", "varType": "I", "index": 1, "op": "+", "value": 1},
                    {
                        "type": "if",
                        "expr": {"op": ">", "left": "I1", "right": 2},
                        "then": [{"type": "set_var", "varType": "I", "index": 1, "op": "=", "value": 0}],
                        "else": []
                    },
                    {"type": "delay", "ms": debounce}
                ],
                "else": []
            },
            {
                "type": "switch",
                "value": "I1",
                "cases": [
                    {"match": 0, "body": show("EGN")},
                    {"match": 1, "body": show("ERN")},
                    {"match": 2, "body": show("EBN")}
                ],
                "default": [{"type": "cmd", "cmd": "EAF"}]
            }
        ]
    });

    Some(HeuristicProgram {
        program,
        explanation: "Touch input cycles I1 through 0, 1, 2 with debounce, then drives LED color per state."
            .to_string(),
        warnings: vec![LOCAL_TRANSLATOR_WARNING.to_string()],
    })
}

/// Blink, on or off for one eye color.
fn eye_control(text: &str) -> Option<HeuristicProgram> {
    let mentions_eyes = ["led", "eye", "rgb"].iter().any(|word| text.contains(word));
    if !mentions_eyes {
        return None;
    }

    let delay = parse_requested_delay_ms(text);
    // green wins over blue wins over all; red otherwise
    let (color, on, off) = if text.contains("green") {
        ("green", "EGN", "EGF")
    } else if text.contains("blue") {
        ("blue", "EBN", "EBF")
    } else if text.contains("all") {
        ("all", "EAN", "EAF")
    } else {
        ("red", "ERN", "ERF")
    };

    let wants_blink = ["blink", "flash", "toggle"].iter().any(|word| text.contains(word));
    let wants_off = [" off", "switch off", "turn off", "disable"].iter().any(|word| text.contains(word));

    let (loop_body, explanation) = if wants_blink {
        (
            json!([
                {"type": "cmd", "cmd": on},
                {"type": "delay", "ms": delay},
                {"type": "cmd", "cmd": off},
                {"type": "delay", "ms": delay}
            ]),
            format!("Blinking {} LED by toggling eyes on/off with a {}ms delay.", color, delay),
        )
    } else {
        let (token, state) = if wants_off { (off, "off") } else { (on, "on") };
        (json!([{"type": "cmd", "cmd": token}]), format!("Setting {} LED {}.", color, state))
    };

    Some(HeuristicProgram {
        program: json!({"initFlags": ["E"], "setup": [], "loop": loop_body}),
        explanation,
        warnings: vec![LOCAL_TRANSLATOR_WARNING.to_string()],
    })
}
