#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::io::Write;

use anyhow::Context;
use args::{Args, Command, IndexAction};
use clap::Parser;
use futures_util::StreamExt;
use tether_config::Config;
use tether_llm::{ChatRequest, CompletionRequest, DeploymentClient, HttpTransport, Message};
use tether_vector::RedisVectorStore;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;

    // Initialize telemetry
    let _telemetry_guard = tether_telemetry::init(config.telemetry.as_ref(), "warn")?;

    tracing::info!(config_path = %args.config.display(), "starting tether");

    // Cancel the running command on Ctrl+C / SIGTERM
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    tokio::select! {
        result = run(args.command, &config) => result?,
        () = shutdown.cancelled() => tracing::info!("command cancelled"),
    }

    Ok(())
}

async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Complete { prompt, stream } => {
            let client = deployment_client(config)?;
            let request = CompletionRequest::new(prompt);

            if stream {
                let mut deltas = client.stream_complete(&request).await?;
                while let Some(delta) = deltas.next().await {
                    print_fragment(&delta?.delta)?;
                }
                println!();
            } else {
                println!("{}", client.complete(&request).await?.text);
            }
        }
        Command::Chat {
            message,
            system,
            stream,
        } => {
            let client = deployment_client(config)?;
            let messages = system
                .map(Message::system)
                .into_iter()
                .chain([Message::user(message)])
                .collect();
            let request = ChatRequest::new(messages);

            if stream {
                let mut deltas = client.stream_chat(&request).await?;
                while let Some(delta) = deltas.next().await {
                    print_fragment(&delta?.delta)?;
                }
                println!();
            } else {
                println!("{}", client.chat(&request).await?.message.content);
            }
        }
        Command::Index { action } => {
            let store_config = config
                .vector_store
                .as_ref()
                .context("no [vector_store] section in configuration")?;
            let store = RedisVectorStore::from_config(store_config)?;

            match action {
                IndexAction::Create { overwrite } => {
                    store.create_index(overwrite || store_config.overwrite).await?;
                }
                IndexAction::Drop => store.delete_index().await?,
            }
        }
    }

    Ok(())
}

fn deployment_client(config: &Config) -> anyhow::Result<DeploymentClient<HttpTransport>> {
    let deployment = config
        .deployment
        .as_ref()
        .context("no [deployment] section in configuration")?;
    Ok(DeploymentClient::from_config(deployment)?)
}

fn print_fragment(fragment: &str) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(fragment.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
