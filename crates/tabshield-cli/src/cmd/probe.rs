use crate::reports;
use clap::Args;
use tabshield_core::{Acquire, BackendConfig, EvaluationBackend, HttpBackend, SearchError, SearchResult, Stage};
use tabshield_protocol::SUPPORTED_PROTOCOL_VERSION;
use tracing::{info, warn};

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Also open and close one solver session
    #[arg(long, default_value_t = false)]
    pub session: bool,
}

pub async fn run(args: ProbeArgs, backend: &BackendConfig) -> SearchResult<()> {
    let backend = HttpBackend::from_config(backend);

    let version = backend
        .protocol_version()
        .await
        .map_err(|e| SearchError::backend(Stage::Protocol, None, e))?;
    let capacity = backend
        .capacity()
        .await
        .map_err(|e| SearchError::backend(Stage::Protocol, None, e))?;

    if version != SUPPORTED_PROTOCOL_VERSION {
        warn!(
            "⚠️  Server speaks protocol {}, searches require {}",
            version, SUPPORTED_PROTOCOL_VERSION
        );
    }
    if capacity < 2 {
        warn!("⚠️  Server allows {} session(s), searches need two", capacity);
    }

    let session = if args.session {
        match backend
            .acquire_session()
            .await
            .map_err(|e| SearchError::backend(Stage::Acquisition, None, e))?
        {
            Acquire::Granted(token) => {
                info!("🔑 Opened session {}", token);
                backend
                    .release(&token)
                    .await
                    .map_err(|e| SearchError::backend(Stage::Acquisition, Some(&token), e))?;
                Some(true)
            }
            Acquire::Busy => Some(false),
        }
    } else {
        None
    };

    reports::print_probe_report(backend.base_url(), version, capacity, session);
    Ok(())
}
