use std::{process::ExitCode, time::Duration};

use clap::{Parser, Subcommand};
use freelance_mcp_client::{
    ClientConfig, Listing, ResourceContent, Result, ToolCallRequest, ToolClient,
    DEFAULT_API_KEY_VAR,
};
use serde_json::Value;
use tracing::{error, warn, Level};

#[derive(Parser, Debug)]
#[command(author, version, about = "Talk to the freelance MCP server over stdio", long_about = None)]
struct Args {
    /// Executable that runs the server
    #[arg(long, default_value = "python", env = "FREELANCE_SERVER_PROGRAM")]
    program: String,

    /// Server script, launched as `<program> <script> stdio`
    #[arg(long, default_value = "freelance_server.py", env = "FREELANCE_SERVER_SCRIPT")]
    server_script: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Key for the server's LLM-backed tools
    #[arg(long, env = DEFAULT_API_KEY_VAR, hide_env_values = true)]
    api_key: Option<String>,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List tools, resources, resource templates and prompts
    Capabilities,
    /// Call a tool and print its result as JSON
    Call {
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Read a resource and print its first content part
    Read { uri: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    match execute(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn client_config(args: &Args) -> ClientConfig {
    let config = ClientConfig::new()
        .with_program(args.program.as_str())
        .with_server_script(args.server_script.as_str())
        .with_request_timeout(Duration::from_secs(args.timeout_secs));
    match &args.api_key {
        Some(key) if !key.trim().is_empty() => config.with_api_key(key.as_str()),
        _ => {
            warn!(
                "{} not set; LLM-backed tools on the server will not work",
                DEFAULT_API_KEY_VAR
            );
            config
        }
    }
}

/// Run one command. `Ok(false)` means the command ran but the server
/// reported a failure.
async fn execute(args: Args) -> Result<bool> {
    let client = ToolClient::new(client_config(&args));

    match args.command {
        Command::Capabilities => {
            client
                .run(|client| Box::pin(print_capabilities(client)))
                .await??;
            Ok(true)
        }
        Command::Call { tool, args } => {
            let arguments: Value = serde_json::from_str(&args)?;
            let request = ToolCallRequest::from_value(tool, arguments)?;
            let result = client
                .run(|client| Box::pin(client.call_tool(request)))
                .await??;

            let failed = result.is_error();
            println!("{}", serde_json::to_string_pretty(&result.into_json())?);
            Ok(!failed)
        }
        Command::Read { uri } => {
            let content = client
                .run(|client| Box::pin(async move { client.read_resource(&uri).await }))
                .await??;
            print_resource(&content)?;
            Ok(true)
        }
    }
}

async fn print_capabilities(client: &mut ToolClient) -> Result<()> {
    if let Some(info) = client.server_info() {
        println!(
            "Server: {} {} (protocol {})",
            info.server_info.name, info.server_info.version, info.protocol_version
        );
        if let Some(instructions) = &info.instructions {
            println!("{instructions}");
        }
        println!();
    }

    let tools = client.list_tools().await?;
    println!("Tools ({}):", tools.len());
    for tool in &tools {
        match &tool.description {
            Some(description) => println!("  - {}: {}", tool.name, first_line(description)),
            None => println!("  - {}", tool.name),
        }
    }

    let resources = client.list_resources().await?;
    println!("\nResources ({}):", resources.len());
    for resource in &resources {
        println!("  - {} ({})", resource.uri, resource.name);
    }

    match client.list_resource_templates().await? {
        Listing::Available(templates) => {
            println!("\nResource templates ({}):", templates.len());
            for template in &templates {
                println!("  - {}", template.uri_template);
            }
        }
        Listing::Unavailable { reason } => println!("\nResource templates: unavailable ({reason})"),
    }

    // Prompts are optional for this server.
    match client.list_prompts().await {
        Ok(prompts) => {
            println!("\nPrompts ({}):", prompts.len());
            for prompt in &prompts {
                println!("  - {}", prompt.name);
            }
        }
        Err(e) => println!("\nPrompts: unavailable ({e})"),
    }
    Ok(())
}

fn print_resource(content: &ResourceContent) -> Result<()> {
    match content {
        ResourceContent::Text { text, .. } => match content.json() {
            Some(json) => println!("{}", serde_json::to_string_pretty(&json)?),
            None => println!("{text}"),
        },
        ResourceContent::Blob {
            uri,
            mime_type,
            blob,
        } => println!(
            "{uri}: {} bytes of base64 {}",
            blob.len(),
            mime_type.as_deref().unwrap_or("data")
        ),
    }
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}
