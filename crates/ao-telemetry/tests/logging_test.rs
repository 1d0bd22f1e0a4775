use ao_telemetry::logging::{self, LogFormat};
use ao_telemetry::spans;

#[test]
fn test_init_is_repeatable() {
    // The first call installs the subscriber; later calls are no-ops.
    logging::init(LogFormat::Human, "ao-test", "debug");
    logging::init(LogFormat::Json, "ao-test", "info");
    logging::init_logging("ao-test", "warn");

    tracing::info!(agent_id = "agent_1_1", "log line after init");
}

#[test]
fn test_format_from_flag() {
    assert_eq!(LogFormat::from_flag(true), LogFormat::Json);
    assert_eq!(LogFormat::from_flag(false), LogFormat::Human);
    assert_eq!(LogFormat::default(), LogFormat::Human);
}

#[test]
fn test_format_serde() {
    let json = serde_json::to_string(&LogFormat::Json).unwrap();
    assert_eq!(json, "\"json\"");
}

#[test]
fn test_bad_level_falls_back() {
    // Must not panic on garbage.
    let _ = logging::env_filter("not=a=level[[");
}

#[test]
fn test_spans_enter() {
    let span = spans::agent_span("restart", "agent_42_1", 42);
    let _guard = span.enter();
    let sweep = spans::sweep_span(3);
    let _inner = sweep.enter();
}
