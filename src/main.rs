// src/main.rs

use std::env;
use std::error::Error;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod pipeline;
mod sys;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::pipeline::SyncPipeline;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // ==============================================================================
    // 1. Telemetry
    // ==============================================================================
    init_tracing();

    // ==============================================================================
    // 2. Configuration (immutable for the whole run)
    // ==============================================================================
    let config = match SyncConfig::load() {
        Ok(config) => config,
        Err(e) => return fail(&e),
    };

    tracing::info!(
        userlist = %config.userlist_path.display(),
        database = %config.redacted_database_url(),
        excluded = ?config.exclude,
        "userlist-sync starting"
    );

    // ==============================================================================
    // 3. Run once; this is the only place an error becomes an exit code
    // ==============================================================================
    match SyncPipeline::new(config).run().await {
        Ok(outcome) => {
            tracing::info!(
                changed = outcome.changed,
                reloaded = outcome.reloaded,
                backup = ?outcome.backup,
                "userlist-sync finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if env::var("USERLIST_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn fail(err: &SyncError) -> ExitCode {
    let mut chain = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        chain.push_str(": ");
        chain.push_str(&inner.to_string());
        cause = inner.source();
    }

    tracing::error!(
        stage = err.stage(),
        published = err.left_published_state(),
        "{}",
        chain
    );
    ExitCode::FAILURE
}
