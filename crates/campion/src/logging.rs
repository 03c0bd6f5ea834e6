//! Tracing subscriber setup.

use campion_config::LoggingSection;
use tracing::Level;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initializes logging from the config section, with an optional CLI
/// override for the level. `RUST_LOG` takes precedence over both.
pub fn init(section: &LoggingSection, override_level: Option<&str>) {
    let level = override_level
        .unwrap_or(&section.level)
        .parse::<Level>()
        .unwrap_or(Level::INFO);

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if section.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
