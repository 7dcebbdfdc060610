// Structured logging setup
//
// Installs a JSON-formatted tracing subscriber writing to stdout.
// Log level is controlled through RUST_LOG (defaults to info).

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Uses JSON output so log aggregators can ingest events without parsing
/// free-form text. Returns an error if a subscriber is already installed.
pub fn init_subscriber() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test: Subscriber initialization is idempotent-safe to call once
    #[test]
    fn test_init_subscriber_succeeds_once() {
        // First call in this process wins; a second call must error rather
        // than panic. Either outcome here proves the call is non-panicking.
        let _ = init_subscriber();
        assert!(init_subscriber().is_err());
    }
}
