use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_ENV: &str = "DRILL_LOG";

/// `DRILL_LOG` wins over the verbosity flag when it parses.
pub fn filter_for(verbose: bool, env_value: Option<&str>) -> EnvFilter {
    let fallback = if verbose { "debug" } else { "info" };
    env_value
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(fallback))
}

/// Installs the global subscriber. Logs go to stderr so stdout stays clean
/// for command output such as `drill scenarios`.
pub fn init_tracing(verbose: bool, json: bool) {
    let env_value = std::env::var(LOG_ENV).ok();
    let filter = filter_for(verbose, env_value.as_deref());

    let (plain, structured) = if json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (Some(fmt::layer().with_writer(std::io::stderr)), None)
    };

    let _ = tracing_subscriber::registry()
        .with(plain)
        .with(structured)
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_picks_the_default_level() {
        assert_eq!(filter_for(false, None).to_string(), "info");
        assert_eq!(filter_for(true, None).to_string(), "debug");
    }

    #[test]
    fn env_directive_overrides_verbosity() {
        assert_eq!(
            filter_for(false, Some("drilld=trace")).to_string(),
            "drilld=trace"
        );
    }

    #[test]
    fn unparseable_env_falls_back() {
        assert_eq!(filter_for(true, Some("drilld=loudest")).to_string(), "debug");
    }
}
