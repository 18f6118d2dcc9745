use clap::{Parser, Subcommand};
use rimbridge::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION_HEADER};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "rimbridge-cli")]
#[command(about = "Send one JSON-RPC request to a RimBridge MCP endpoint", long_about = None)]
struct Cli {
    /// Endpoint URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:5174/mcp")]
    url: String,

    /// Bearer token
    #[arg(long, global = true, env = "RIMBRIDGE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the initialize handshake
    Init {
        /// Protocol version to request
        #[arg(long, default_value = "2025-06-18")]
        protocol_version: String,
    },

    /// List registered tools
    List,

    /// Call a tool
    Call {
        /// Full tool name, e.g. rimbridge.core/ping
        name: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Protocol-level ping
    Ping,
}

impl Commands {
    fn to_request(&self) -> Result<JsonRpcRequest, Box<dyn std::error::Error>> {
        let id = Value::String(Uuid::new_v4().to_string());
        let request = match self {
            Commands::Init { protocol_version } => JsonRpcRequest::new(
                id,
                "initialize",
                Some(json!({
                    "protocolVersion": protocol_version,
                    "capabilities": {},
                    "clientInfo": {"name": "rimbridge-cli", "version": env!("CARGO_PKG_VERSION")}
                })),
            ),
            Commands::List => JsonRpcRequest::new(id, "tools/list", None),
            Commands::Call { name, args } => {
                let arguments: Value = serde_json::from_str(args)
                    .map_err(|e| format!("--args is not valid JSON: {}", e))?;
                if !arguments.is_object() {
                    return Err("--args must be a JSON object".into());
                }
                JsonRpcRequest::new(
                    id,
                    "tools/call",
                    Some(json!({"name": name, "arguments": arguments})),
                )
            }
            Commands::Ping => JsonRpcRequest::new(id, "ping", None),
        };
        Ok(request)
    }

    fn protocol_version(&self) -> Option<&str> {
        match self {
            Commands::Init { protocol_version } => Some(protocol_version),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();
    let request = cli.command.to_request()?;

    let client = reqwest::Client::new();
    let mut builder = client.post(&cli.url).json(&request);
    if let Some(token) = cli.token.as_deref().filter(|t| !t.is_empty()) {
        builder = builder.bearer_auth(token);
    }
    if let Some(version) = cli.command.protocol_version() {
        builder = builder.header(PROTOCOL_VERSION_HEADER, version);
    }

    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() && status != reqwest::StatusCode::BAD_REQUEST {
        eprintln!("HTTP {}", status);
        std::process::exit(1);
    }

    let body: JsonRpcResponse = response.json().await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    if body.error.is_some() {
        std::process::exit(2);
    }

    Ok(())
}
