use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ragkb::{
    api,
    config::{self, Config},
    logging,
    pipeline::{AnswerSource, RagService},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "ragkb",
    version,
    about = "Question answering over a PDF knowledge base"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default).
    Serve,
    /// Ingest a PDF file or every PDF below a directory.
    Ingest {
        /// File or directory to ingest.
        path: PathBuf,
    },
    /// Ask a question against the indexed documents.
    Query {
        /// Question text.
        text: String,
        /// Number of chunks to retrieve.
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show the number of indexed chunks.
    Status,
    /// List indexed document sources.
    ListDocs,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!(error = %err, "Command failed");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing();
    let config = config::init_config().context("failed to load configuration")?;
    let service =
        Arc::new(RagService::from_config(config).context("failed to initialize RAG service")?);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, service).await,
        Command::Ingest { path } => {
            let outcome = service
                .ingest_path(&path)
                .await
                .with_context(|| format!("failed to ingest {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Command::Query { text, top_k } => {
            let outcome = service.query(&text, top_k).await.context("query failed")?;
            println!("{}\n", outcome.llm_answer);
            let label = match outcome.answer_source {
                AnswerSource::Documents => "documents",
                AnswerSource::GeneralKnowledge => "general knowledge",
            };
            println!("Answer source: {label}");
            for chunk in &outcome.retrieved_chunks {
                println!(
                    "- {} (page {}, distance {:.3})",
                    chunk.metadata.source, chunk.metadata.page, chunk.distance
                );
            }
            Ok(())
        }
        Command::Status => {
            let report = service.status().await.context("vector store unavailable")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::ListDocs => {
            let documents = service
                .list_documents()
                .await
                .context("failed to retrieve documents")?;
            for document in documents {
                println!("{document}");
            }
            Ok(())
        }
    }
}

async fn serve(config: &Config, service: Arc<RagService>) -> Result<()> {
    let app = api::create_router(service);
    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

async fn bind_listener(server_port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 8080..=8099;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 8080-8099",
    ))
}
