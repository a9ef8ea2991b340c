use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Model deployment and Redis vector store client
#[derive(Debug, Parser)]
#[command(name = "tether", about = "Talk to a model deployment and manage its Redis vector index")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tether.toml", env = "TETHER_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a text completion
    Complete {
        /// Prompt text
        prompt: String,

        /// Print tokens as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// Send a chat message
    Chat {
        /// User message
        message: String,

        /// Optional system prompt
        #[arg(long)]
        system: Option<String>,

        /// Print tokens as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// Manage the vector index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum IndexAction {
    /// Create the index if it does not exist
    Create {
        /// Drop an existing index and its documents first
        #[arg(long)]
        overwrite: bool,
    },

    /// Drop the index and its documents
    Drop,
}
