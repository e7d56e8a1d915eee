use anyhow::Result;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Logs go to stderr; stdout is reserved for the feedback document.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("REMLIST_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    remlist::run()
}
