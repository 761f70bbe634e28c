use std::time::Duration;

use emmi_compiler::Program;
use emmi_compiler::script::{FALLBACK_SCRIPT, validate_script};
use emmi_compiler::synth::Translator;
use emmi_compiler::synth::generator::{CannedGenerator, OfflineGenerator};
use emmi_compiler::synth::heuristics::LOCAL_TRANSLATOR_WARNING;

#[tokio::test]
async fn blink_request_without_generator() {
    let result = Translator::new(OfflineGenerator).translate("blink the blue led every 2 seconds").await;
    assert_eq!(result.script, "|I|E|S||L|EBN|D2000|EBF|D2000|");
    assert_eq!(result.explanation, "Blinking blue LED by toggling eyes on/off with a 2000ms delay.");
    assert_eq!(
        result.warnings,
        vec!["AI service unavailable: no generator configured.", LOCAL_TRANSLATOR_WARNING]
    );
    validate_script(&result.script).unwrap();
}

#[tokio::test]
async fn slow_generator_times_out() {
    let generator = CannedGenerator::new(r#"{"program":{"loop":[{"type":"cmd","cmd":"MF"}]}}"#)
        .with_delay(Duration::from_millis(500));
    let result = Translator::new(generator)
        .with_timeout(Duration::from_millis(20))
        .translate("turn off the green eye")
        .await;
    assert!(result.warnings[0].contains("timed out"), "{:?}", result.warnings);
    assert_eq!(result.script, "|I|E|S||L|EGF|");
}

#[tokio::test]
async fn reply_wrapped_in_prose_is_accepted() {
    let reply = "Sure! Here it is:\n```json\n{\"program\":{\"setup\":[],\"loop\":[{\"type\":\"cmd\",\"cmd\":\"MF\"},\
                 {\"type\":\"delay\",\"ms\":1000},{\"type\":\"cmd\",\"cmd\":\"MS\"}]},\"explanation\":\"Drive.\"}\n```";
    let result = Translator::new(CannedGenerator::new(reply)).translate("drive a second").await;
    assert_eq!(result.script, "|I|M|S||L|MF|D1000|MS|");
    assert_eq!(result.explanation, "Drive.");
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn touch_cycle_template() {
    let result = Translator::new(OfflineGenerator)
        .translate("Use touch to cycle I1 state: green, red, blue")
        .await;
    assert!(result.script.starts_with("|I|E|T|S|G(I,1,=,0)|L|C(O=,TR,1){|G(I,1,+,1)|"));
    assert!(result.script.contains("K(I1, (0){|EAF|EGN|} (1){|EAF|ERN|} (2){|EAF|EBN|} (D){|EAF|})"));
    validate_script(&result.script).unwrap();
}

#[tokio::test]
async fn garbage_generator_document_is_repaired() {
    let reply = r#"{"program":{"initFlags":["Q"],"setup":"nope",
                    "loop":[{"type":"teleport"},{"type":"delay","ms":-40},{"type":"cmd","cmd":"EAN"}]}}"#;
    let result = Translator::new(CannedGenerator::new(reply)).translate("anything").await;
    assert_eq!(result.script, "|I|E|S||L|D0|EAN|");
    assert!(!result.warnings.is_empty());
    assert_eq!(result.explanation, "Program generated successfully.");
}

#[tokio::test]
async fn unknown_request_gets_safe_program() {
    let result = Translator::new(OfflineGenerator).translate("sing me a song").await;
    assert_eq!(result.program, Program::empty());
    assert_eq!(result.script, FALLBACK_SCRIPT);
    assert_eq!(result.warnings.last().map(String::as_str), Some("Could not generate program automatically."));
}
