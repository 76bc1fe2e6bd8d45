// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use dcr_ingest::{
    config::IngestConfig,
    http,
    logger::Formatter,
    pipeline::{self, Pipeline, PipelineOptions},
    source,
    token::ClientCredentials,
    transport::{RetryPolicy, Transport},
};

/// Configuration problems, raised before any network call.
const EXIT_CONFIG: u8 = 2;
/// Token or delivery failure.
const EXIT_FAILURE: u8 = 1;

fn init_logging() -> Result<(), String> {
    let log_level = env::var("DCR_LOG_LEVEL")
        .map(|val| val.trim().to_lowercase())
        .ok()
        .filter(|val| !val.is_empty())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let filter = EnvFilter::try_new(env_filter).map_err(|e| format!("could not parse log level: {e}"))?;
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .event_format(Formatter)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| format!("setting default subscriber failed: {e}"))
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("{e}");
        return ExitCode::from(EXIT_CONFIG);
    }
    debug!("Logging subsystem enabled");

    let config = match IngestConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let run_started = chrono::Utc::now();

    let client = http::get_client(config.https_proxy.as_deref(), config.request_timeout);
    let token_factory = ClientCredentials::new(
        client.clone(),
        &config.authority_host,
        &config.tenant_id,
        &config.client_id,
        &config.client_secret,
    )
    .into_factory();

    if config.preflight {
        return match pipeline::preflight(&config, &token_factory).await {
            Ok(report) => {
                info!("Preflight report:\n{report}");
                if report.is_ready() {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(EXIT_FAILURE)
                }
            }
            Err(e) => {
                error!("{e}");
                ExitCode::from(EXIT_CONFIG)
            }
        };
    }

    let target = match config.target() {
        Ok(target) => target,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let Some(input_path) = config.input_path.as_deref() else {
        error!("Missing required setting: DCR_INPUT_PATH");
        return ExitCode::from(EXIT_CONFIG);
    };
    let records = match source::open(input_path, config.resolved_input_format()) {
        Ok(records) => records,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let transport = Transport::new(client, target, RetryPolicy::default());
    let pipeline = Pipeline::new(
        transport,
        token_factory,
        PipelineOptions::from_config(&config, run_started),
    );

    match pipeline.run(records).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Run aborted: {}", e.kind);
            error!("Partial total: {}", e.summary);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
