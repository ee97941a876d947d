//! gworkspace-guard - diagnostic CLI for the Workspace policy core.
//!
//! Subcommands:
//! - `config`: print the effective configuration read from the environment
//! - `schema`: print the configuration JSON schema
//! - `check`: evaluate one access request, walking Drive when needed

use clap::{Parser, Subcommand};
use gworkspace_core::access::{AccessRequest, Operation};
use gworkspace_core::google::{AuthHandle, DriveClient, HttpDriveClient, StaticTokenProvider};
use gworkspace_core::types::WorkspaceEnv;
use gworkspace_core::{CallGuard, Config};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "gworkspace-guard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration as JSON.
    Config,
    /// Print the configuration JSON schema.
    Schema,
    /// Evaluate an access request against the configured policy.
    Check {
        /// read, create, update or delete.
        #[arg(long)]
        operation: Operation,
        #[arg(long)]
        service: String,
        #[arg(long)]
        tool: Option<String>,
        /// Target folder id for the folder restriction.
        #[arg(long)]
        folder: Option<String>,
        /// Bearer token for the Drive parent walk.
        #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
        access_token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::from_env();

    gworkspace_core::observability::init_tracing(&config.observability);

    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&Config::json_schema()?)?);
        }
        Command::Check {
            operation,
            service,
            tool,
            folder,
            access_token,
        } => {
            let drive = match (config.access.restricted_folder(), access_token) {
                (Some(_), Some(token)) => {
                    let auth = AuthHandle::new(Arc::new(StaticTokenProvider::new(token)));
                    let client: Arc<dyn DriveClient> =
                        Arc::new(HttpDriveClient::new(&config.drive, auth)?);
                    Some(client)
                }
                (Some(_), None) => {
                    tracing::warn!(
                        "folder restriction active but {} is unset; writes with a target folder will fail",
                        WorkspaceEnv::AccessToken
                    );
                    None
                }
                (None, _) => None,
            };

            let mut request = AccessRequest::new(operation, service);
            request.tool_name = tool;
            request.target_folder_id = folder;

            let guard = CallGuard::from_config(&config, drive);
            if let Err(e) = gworkspace_core::validation::validate_request(&request) {
                println!("{}", serde_json::to_string_pretty(&e.to_payload())?);
                return Ok(ExitCode::FAILURE);
            }
            match guard.policy().validate_access(&request).await {
                Ok(()) => {
                    println!("{}", serde_json::json!({ "allowed": true, "request": request }));
                }
                Err(e) => {
                    println!("{}", serde_json::to_string_pretty(&e.to_payload())?);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
