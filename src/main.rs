//! Tooldock command-line harness.
//!
//! Loads a manifest of toolkits and remote-proxy tools, then lists or invokes
//! them:
//!
//! ```bash
//! tooldock --manifest tools.json list --toolkit github
//! tooldock --manifest tools.json invoke get_repo_topics \
//!     --input '{"owner": "rust-lang", "repo": "rust"}' --caller me
//! ```
//!
//! Credentials are toolkit-wide secrets read from a JSON object
//! (`{"github": "ghp_..."}`), either a file passed with `--credentials` or
//! the `TOOLDOCK_CREDENTIALS` environment variable.

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tooldock::credentials::{Credential, StaticCredentialResolver};
use tooldock::declarations::Manifest;
use tooldock::dispatch::{Dispatcher, InvocationRequest};
use tooldock::tools::{ToolFilter, ToolRegistry};
use tooldock::types::{CallerId, ToolkitId};
use tooldock::{Config, Error};

/// Register and invoke tools from a manifest
#[derive(Parser, Debug)]
#[command(name = "tooldock")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Manifest of toolkits and remote tools (JSON)
    #[arg(short, long, global = true, env = "TOOLDOCK_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Config file (JSON); TOOLDOCK_* variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// List registered tools
    List {
        /// Only tools of these toolkits ("none" for standalone tools)
        #[arg(short, long)]
        toolkit: Vec<String>,

        /// Only tools carrying any of these tags
        #[arg(long)]
        tag: Vec<String>,

        /// Print function-calling declarations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Invoke a tool and print the result envelope
    Invoke {
        /// Tool id
        tool: String,

        /// Input object as JSON
        #[arg(short, long, default_value = "{}")]
        input: String,

        /// Caller identity used for credential lookup
        #[arg(long, default_value = "cli")]
        caller: String,

        /// JSON object mapping toolkit id to secret
        #[arg(long, env = "TOOLDOCK_CREDENTIALS_FILE")]
        credentials: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env_overrides()?;
    tooldock::observability::init_tracing_with(&config.observability);

    let registry = Arc::new(ToolRegistry::from_config(&config.registry));
    if let Some(path) = &cli.manifest {
        Manifest::from_file(path)?.install(&registry)?;
    }

    match cli.command {
        Command::List { toolkit, tag, json } => {
            let mut filter = ToolFilter::all();
            if !toolkit.is_empty() {
                filter = filter.toolkits(toolkit);
            }
            if !tag.is_empty() {
                filter = filter.tags(tag);
            }

            if json {
                let declarations = Value::Array(registry.declarations(&filter));
                println!("{}", serde_json::to_string_pretty(&declarations)?);
            } else {
                println!("{}", registry.render_prompt(&filter));
            }
        }
        Command::Invoke {
            tool,
            input,
            caller,
            credentials,
        } => {
            let input: Value = serde_json::from_str(&input)?;
            let caller = CallerId::try_from(caller).map_err(Error::validation)?;
            let resolver = load_credentials(credentials.as_ref())?;

            let dispatcher = Dispatcher::from_config(registry, resolver, &config)?;
            let envelope = dispatcher
                .invoke(InvocationRequest::new(tool, input, caller), CancellationToken::new())
                .await;

            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.is_successful() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Toolkit-wide credentials from a file, else `TOOLDOCK_CREDENTIALS`.
fn load_credentials(path: Option<&PathBuf>) -> tooldock::Result<StaticCredentialResolver> {
    let raw = match path {
        Some(path) => Some(std::fs::read_to_string(path)?),
        None => std::env::var("TOOLDOCK_CREDENTIALS").ok(),
    };

    let resolver = StaticCredentialResolver::new();
    if let Some(raw) = raw {
        let secrets: HashMap<String, String> = serde_json::from_str(&raw)?;
        for (toolkit, secret) in secrets {
            let toolkit = ToolkitId::try_from(toolkit).map_err(Error::validation)?;
            resolver.insert_toolkit_wide(toolkit, Credential::new(secret));
        }
    }
    Ok(resolver)
}
