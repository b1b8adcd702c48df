//! # hostwise CLI Entry Point
//!
//! ## Usage
//!
//! ```bash
//! # Read the server version from whichever host answers first
//! hostwise call get /_api/version -u tcp://10.0.0.1:8529 -u tcp://10.0.0.2:8529
//!
//! # Create a document, spreading load over every host
//! hostwise call post /_api/document/users --load-balancing round_robin \
//!   -d '{"name": "alice"}' -q returnNew=true
//!
//! # Endpoints from the environment
//! HOSTWISE_URLS=tcp://10.0.0.1:8529,tcp://10.0.0.2:8529 hostwise hosts
//! ```
//!
//! URLs may use `http`, `https`, `tcp`, `ssl`, `tls` or a `unix://` socket
//! path; aliases are normalized before use.

use anyhow::Result;
use argh::FromArgs;
use hostwise_cli::options::{ConnectionFlags, RequestFlags, URLS_ENV};
use hostwise_client::{Connection, LoadBalancingStrategy};
use hostwise_common::ResponseBody;
use std::io::Write;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// hostwise - multi-host database request dispatcher
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Call**: send one request (unix-friendly output)
/// - **Hosts**: print the normalized host registry
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
    Hosts(HostsArgs),
}

/// Arguments for sending a single request.
///
/// The response body is written to stdout as-is: JSON bodies are printed
/// compact on one line so they can be piped to `jq`.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// send one request through the dispatcher
struct CallArgs {
    /// HTTP method (get, post, put, patch, delete, head)
    #[argh(positional)]
    method: String,

    /// request path, e.g. /_api/version
    #[argh(positional)]
    path: String,

    /// endpoint URL, may be repeated
    #[argh(option, short = 'u', long = "url")]
    urls: Vec<String>,

    /// JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// load balancing strategy: none, round_robin or one_random
    #[argh(option, long = "load-balancing")]
    load_balancing: Option<LoadBalancingStrategy>,

    /// query parameter as key=value, may be repeated
    #[argh(option, short = 'q', long = "query")]
    query: Vec<String>,

    /// extra header as "Name: value", may be repeated
    #[argh(option, short = 'H', long = "header")]
    headers: Vec<String>,

    /// JSON request body
    #[argh(option, short = 'd')]
    data: Option<String>,

    /// allow the request to be served by a follower
    #[argh(switch, long = "dirty-read")]
    dirty_read: bool,

    /// per-attempt timeout in milliseconds
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// maximum retries after refused connections
    #[argh(option, long = "retries")]
    retries: Option<u32>,

    /// surface refused connections immediately
    #[argh(switch, long = "no-retry")]
    no_retry: bool,
}

/// Arguments for listing the host registry.
#[derive(FromArgs)]
#[argh(subcommand, name = "hosts")]
/// print the normalized endpoints with their indices
struct HostsArgs {
    /// endpoint URL, may be repeated
    #[argh(option, short = 'u', long = "url")]
    urls: Vec<String>,

    /// JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call keeps stderr quiet so its output can be piped
    if !matches!(cli.command, Commands::Call(_)) {
        // Set default log level to INFO, but allow RUST_LOG env var to override
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let env_urls = std::env::var(URLS_ENV).ok();

    match cli.command {
        Commands::Call(args) => run_call(args, env_urls).await,
        Commands::Hosts(args) => run_hosts(args, env_urls).await,
    }
}

/// Executes the `call` subcommand.
///
/// # Errors
///
/// Returns an error if the flags are invalid, an endpoint cannot be
/// registered, or the request is rejected.
async fn run_call(args: CallArgs, env_urls: Option<String>) -> Result<()> {
    let (connection_flags, request_flags) = split_call_args(args);
    let config = connection_flags.into_config(env_urls)?;
    let request = request_flags.into_request()?;

    let connection = Connection::new(config).await?;
    let result = connection.request(request).await;
    connection.close().await?;
    let response = result?;

    let mut stdout = std::io::stdout().lock();
    match &response.body {
        ResponseBody::Empty => {}
        ResponseBody::Json(value) => writeln!(stdout, "{}", serde_json::to_string(value)?)?,
        ResponseBody::Text(text) => writeln!(stdout, "{}", text)?,
        ResponseBody::Binary(bytes) => stdout.write_all(bytes)?,
    }

    Ok(())
}

/// Executes the `hosts` subcommand.
async fn run_hosts(args: HostsArgs, env_urls: Option<String>) -> Result<()> {
    let flags = ConnectionFlags {
        urls: args.urls,
        config: args.config,
        ..Default::default()
    };
    let config = flags.into_config(env_urls)?;

    let connection = Connection::new(config).await?;
    let urls = connection.host_urls().await?;
    connection.close().await?;

    for (index, url) in urls.iter().enumerate() {
        println!("{}\t{}", index, url);
    }

    tracing::info!("{} host(s) registered", urls.len());
    Ok(())
}

fn split_call_args(args: CallArgs) -> (ConnectionFlags, RequestFlags) {
    let connection = ConnectionFlags {
        urls: args.urls,
        config: args.config,
        load_balancing: args.load_balancing,
        retries: args.retries,
        no_retry: args.no_retry,
    };
    let request = RequestFlags {
        method: args.method,
        path: args.path,
        query: args.query,
        headers: args.headers,
        data: args.data,
        dirty_read: args.dirty_read,
        timeout_ms: args.timeout_ms,
    };
    (connection, request)
}
