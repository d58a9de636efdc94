use serial_test::serial;
use tracing_subscriber::filter::LevelFilter;

use super::error::{ClientError, HandlerError, TransportError};
use super::logging;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warn");
}

#[test]
#[serial]
fn filter_uses_configured_level_without_rust_log() {
    temp_env::with_var_unset("RUST_LOG", || {
        let filter = logging::filter("debug");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    });
}

#[test]
#[serial]
fn rust_log_overrides_configured_level() {
    temp_env::with_var("RUST_LOG", Some("warn"), || {
        let filter = logging::filter("trace");
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    });
}

#[test]
fn parse_level_falls_back_to_info() {
    assert_eq!(logging::parse_level("WARNING"), tracing::Level::WARN);
    assert_eq!(logging::parse_level(" trace "), tracing::Level::TRACE);
    assert_eq!(logging::parse_level("verbose"), tracing::Level::INFO);
}

#[test]
fn error_messages_are_descriptive() {
    let err = ClientError::validation("mem_free must not be negative");
    assert_eq!(
        err.to_string(),
        "Validation error: mem_free must not be negative"
    );
    assert_eq!(
        TransportError::Status(503).to_string(),
        "unexpected HTTP status 503"
    );
    assert_eq!(
        HandlerError::new("bad payload").to_string(),
        "handler rejected message: bad payload"
    );
}
