//! api-agent CLI: turn a sentence into an API call
//!
//! Logs go to stderr so stdout carries only the JSON result.

use std::path::PathBuf;

use api_catalog::{Credentials, Headers};
use clap::Parser;
use tracing::info;

use intent_agent::{AgentConfig, AgentOptions, ApiAgent, ExecuteRequest, RequestContext};

/// Resolve a natural-language request against configured API specs and run it
#[derive(Parser, Debug)]
#[command(name = "api-agent")]
#[command(version)]
#[command(about = "Resolve a natural-language request to an API call and run it")]
struct Args {
    /// Config file (YAML or JSON)
    #[arg(short = 'f', long, env = "API_AGENT_CONFIG", default_value = "api-agent.yaml")]
    config: PathBuf,

    /// Oracle model, overrides the config file
    #[arg(long)]
    model: Option<String>,

    /// Include the dispatched request in the output
    #[arg(short, long)]
    verbose: bool,

    /// Extra request header, `Name: value`
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Credential field, `key=value` (token, username, password, or an API key header name)
    #[arg(short = 'c', long = "credential", value_parser = parse_credential)]
    credentials: Vec<(String, String)>,

    /// Print the compiled catalog and exit
    #[arg(long)]
    list: bool,

    /// The request, e.g. "create a pet named Sticky"
    #[arg(required_unless_present = "list")]
    prompt: Vec<String>,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected 'Name: value', got '{}'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{}'", raw));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn parse_credential(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected 'key=value', got '{}'", raw))?;
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = AgentConfig::load(&args.config)
        .await
        .map_err(|e| format!("Failed to load {}: {}", args.config.display(), e))?;
    if let Some(model) = args.model {
        config.model = model;
    }

    if args.list {
        // Listing compiles the catalog only and never reaches the oracle
        let agent = ApiAgent::new(AgentOptions {
            specs: config.spec_configs()?,
            ..Default::default()
        });
        for operation in agent.catalog().await? {
            println!(
                "{} {} - {}",
                operation.method(),
                operation.path(),
                operation.summary()
            );
        }
        return Ok(());
    }

    let agent = ApiAgent::new(config.into_options()?);

    let prompt = args.prompt.join(" ");
    let context = RequestContext {
        headers: args.headers.into_iter().collect::<Headers>(),
        credentials: (!args.credentials.is_empty())
            .then(|| args.credentials.into_iter().collect::<Credentials>()),
    };

    info!("Resolving '{}' with {}", prompt, agent.model());
    let result = agent
        .execute(
            ExecuteRequest::new(prompt)
                .with_context(context)
                .verbose(args.verbose),
        )
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
