use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::env_opt;

/// Keeps error reporting alive. Hold it for the life of the process;
/// dropping it flushes pending Sentry events.
#[must_use]
pub struct TracingGuard {
    sentry: Option<sentry::ClientInitGuard>,
}

impl TracingGuard {
    /// Whether `ERROR` events are forwarded to Sentry.
    pub fn reports_errors(&self) -> bool {
        self.sentry.as_ref().is_some_and(|guard| guard.is_enabled())
    }
}

/// JSON logs on stdout, filtered by `RUST_LOG` (default `info`).
///
/// When `SENTRY_DSN` is set, error events and panics are also reported to
/// Sentry, with lower levels kept as breadcrumbs.
///
/// Every Yodel process calls this once at startup. Later calls are no-ops
/// for the subscriber.
pub fn init_tracing() -> TracingGuard {
    let (sentry, dsn_error) = match env_opt("SENTRY_DSN").map(|dsn| init_sentry(&dsn)) {
        Some(Ok(guard)) => (Some(guard), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json())
        .with(sentry.is_some().then(|| sentry_tracing::layer()))
        .try_init();

    if let Some(e) = dsn_error {
        tracing::warn!(error = %e, "invalid SENTRY_DSN, error reporting disabled");
    }
    TracingGuard { sentry }
}

/// Bind the process-wide Sentry client to `dsn`.
pub fn init_sentry(dsn: &str) -> Result<sentry::ClientInitGuard, sentry::types::ParseDsnError> {
    let dsn: sentry::types::Dsn = dsn.trim().parse()?;
    Ok(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        attach_stacktrace: true,
        ..Default::default()
    }))
}
