use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
};

// RUST_LOG overrides `default_level`. Output goes to stderr; stdout carries device listings.
pub fn init(default_level: &str) {
    let level = default_level.parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}
