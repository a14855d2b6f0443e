//! CLI commands

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Switchyard - one Anthropic-shaped front door for many model providers
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the loopback gateway until interrupted
    Serve {
        /// Port to bind on 127.0.0.1 (0 picks a free port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Gateway YAML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fall back to Claude when a proxied provider fails
        #[arg(long)]
        fallback: bool,
    },

    /// List known models and their pricing
    Models {
        /// Only models served by this provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Match id substring or tag
        #[arg(short, long)]
        search: Option<String>,

        /// Only free models
        #[arg(long)]
        free: bool,

        /// Extra model table (JSON array) merged over the built-in one
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Show which model a prompt resolves to
    Resolve {
        /// Prompt type (agent, command, skill, hook)
        #[arg(long = "type")]
        prompt_type: String,

        /// Prompt name
        #[arg(long)]
        name: String,

        /// Explicit model override
        #[arg(long)]
        model: Option<String>,

        /// Model declared in the prompt's frontmatter
        #[arg(long)]
        frontmatter: Option<String>,
    },

    /// Show recorded usage and cost
    Stats {
        /// Only usage on this day (YYYY-MM-DD, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Only usage attributed to this command
        #[arg(long)]
        command: Option<String>,
    },

    /// Probe provider reachability
    Health {
        /// Only this provider
        #[arg(short, long)]
        provider: Option<String>,
    },
}
