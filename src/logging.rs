use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the filter spec; a bare level gets quieter defaults for HTTP internals
pub fn filter_spec(level: &str) -> String {
    let level = level.trim();
    if level.is_empty() {
        "info".to_string()
    } else if level.contains(',') || level.contains('=') {
        level.to_string()
    } else {
        format!("{},hyper=info,tower_http=info", level)
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_spec(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_target(false).with_current_span(false))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).compact())
            .try_init()
    };

    if result.is_ok() {
        let format = if json { "json" } else { "compact" };
        tracing::debug!(format, "Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_gets_defaults() {
        assert_eq!(filter_spec("debug"), "debug,hyper=info,tower_http=info");
        assert_eq!(filter_spec(""), "info");
    }

    #[test]
    fn test_directives_kept_verbatim() {
        assert_eq!(filter_spec("mortgage_calc=trace,info"), "mortgage_calc=trace,info");
    }
}
