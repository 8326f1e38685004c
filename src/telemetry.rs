use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Output layout for the fmt subscriber, selected through `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Target, file and line on every event.
    #[default]
    Full,
    /// Single-line events without source locations.
    Compact,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match crate::util::env::env_opt("LOG_FORMAT")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("compact") => Self::Compact,
            _ => Self::Full,
        }
    }
}

/// Sets up the global tracing subscriber with a fmt formatter and env filter.
///
/// `default_filter` applies when `RUST_LOG` is not set, so every binary shares
/// the same formatting rules while picking its own verbosity.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let builder = SubscriberBuilder::default().with_env_filter(filter);
    let installed = match format {
        LogFormat::Full => builder
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .try_init(),
        LogFormat::Compact => builder.compact().with_target(false).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
