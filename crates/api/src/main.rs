use warden_api::config::log_format_from_lookup;
use warden_api::server::{DEFAULT_WORKERS, serve};
use warden_api::{ServiceConfig, build_services};
use warden_core::RequestContext;

/// Serves line-delimited JSON requests from stdin on a fixed pool of workers.
fn main() -> anyhow::Result<()> {
    warden_observability::init_with(log_format_from_lookup(|key| std::env::var(key).ok())?);
    let config = ServiceConfig::from_env()?;

    let services = build_services(&RequestContext::with_timeout(config.request_timeout), &config)?;
    services.announce_generated_password(&config.system_admin_email, std::io::stderr().lock())?;

    tracing::info!(workers = DEFAULT_WORKERS, "accepting requests on stdin");
    let answered = serve(
        &services.dispatcher,
        std::io::stdin().lock(),
        std::io::stdout(),
        DEFAULT_WORKERS,
        config.request_timeout,
    )?;

    tracing::info!(answered, "stdin closed; shutting down");
    Ok(())
}
