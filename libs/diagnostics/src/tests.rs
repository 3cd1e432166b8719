use crate::*;

#[test]
fn recording_sink_preserves_order() {
    let sink = RecordingSink::new();
    sink.emit(Severity::Info, "first");
    sink.emit(Severity::Error, "second");
    sink.emit(Severity::Warning, "third");
    assert_eq!(
        sink.records(),
        vec![
            (Severity::Info, "first".to_string()),
            (Severity::Error, "second".to_string()),
            (Severity::Warning, "third".to_string()),
        ]
    );
    assert_eq!(sink.num_errors(), 1);
    assert_eq!(sink.messages(Severity::Warning), vec!["third".to_string()]);

    sink.clear();
    assert!(sink.records().is_empty());
}

#[test]
fn emit_all_through_reference() {
    let sink = RecordingSink::new();
    let by_ref = &sink;
    by_ref.emit_all(Severity::Error, ["a", "b"]);
    assert_eq!(sink.messages(Severity::Error), vec!["a", "b"]);
}

#[test]
fn tracing_sink_accepts_every_severity() {
    let sink = TracingSink;
    sink.emit(Severity::Info, "info");
    sink.emit(Severity::Warning, "warning");
    sink.emit(Severity::Error, "error");
}

#[test]
fn default_severity_is_warning() {
    assert_eq!(Severity::default(), Severity::Warning);
}

#[test]
fn severity_for_count() {
    assert_eq!(Severity::for_count(0), Severity::Info);
    assert_eq!(Severity::for_count(1), Severity::Error);
    assert_eq!(Severity::for_count(42), Severity::Error);
}

#[test]
fn severity_as_tracing_level() {
    assert_eq!(Severity::Info.as_tracing_level(), tracing::Level::INFO);
    assert_eq!(Severity::Warning.as_tracing_level(), tracing::Level::WARN);
    assert_eq!(Severity::Error.as_tracing_level(), tracing::Level::ERROR);
}

#[test]
fn severity_is_error() {
    assert!(!Severity::Info.is_error());
    assert!(!Severity::Warning.is_error());
    assert!(Severity::Error.is_error());
}
