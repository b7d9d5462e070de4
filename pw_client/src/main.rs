//! Command-line client for the points paywall server.
//!
//! Logs in (or resumes a stored token), then reads commands from stdin
//! until `quit` or end of input.

use anyhow::{Context, Result};
use pico_args::Arguments;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pw_client::{
    api_client::{ApiClient, DEFAULT_TIMEOUT},
    app::ClientApp,
    commands::{Command, parse_command},
    token_store::TokenStore,
};

const HELP: &str = "\
Connect to a points paywall server

USAGE:
  pw_client [OPTIONS]

OPTIONS:
  --server URL          Server URL  [default: http://localhost:8000]
  --timeout-secs N      HTTP request timeout  [default: 30]
  --token-file PATH     Where the access token is kept
                        [default: $PW_CLIENT_TOKEN_FILE or ~/.pw_client/token.json]
  --username NAME       Log in as NAME on startup
  --password PASS       Password for --username

FLAGS:
  --no-store            Do not persist the access token
  -h, --help            Print help information
";

struct Args {
    server_url: String,
    timeout: Duration,
    token_file: Option<PathBuf>,
    username: Option<String>,
    password: Option<String>,
    no_store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        server_url: pargs
            .value_from_str("--server")
            .unwrap_or_else(|_| "http://localhost:8000".to_string()),
        timeout: pargs
            .opt_value_from_str("--timeout-secs")
            .context("--timeout-secs must be a number of seconds")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TIMEOUT),
        token_file: pargs.opt_value_from_str("--token-file").ok().flatten(),
        username: pargs.opt_value_from_str("--username").ok().flatten(),
        password: pargs.opt_value_from_str("--password").ok().flatten(),
        no_store: pargs.contains("--no-store"),
    };

    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let api = ApiClient::with_timeout(args.server_url.clone(), args.timeout)
        .context("Failed to create HTTP client")?;
    let tokens = (!args.no_store)
        .then(|| TokenStore::new(args.token_file.unwrap_or_else(TokenStore::default_path)));
    let mut app = ClientApp::new(Arc::new(api), tokens);

    println!("Connected to {}", args.server_url);

    match (args.username, args.password) {
        (Some(username), Some(password)) => {
            println!("Logging in as {}...", username);
            print_outcome(app.execute(Command::Login { username, password }).await);
        }
        _ => match app.resume().await {
            Ok(Some(username)) => println!("Resumed session for {}", username),
            Ok(None) => println!("Not logged in. Use 'login USER PASS' or 'register USER PASS'"),
            Err(e) => println!("Could not restore session: {}", e),
        },
    }
    println!("Type 'help' for commands");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        if input.trim().is_empty() {
            continue;
        }

        match parse_command(&input) {
            Ok(Command::Quit) => break,
            Ok(command) => print_outcome(app.execute(command).await),
            Err(e) => println!("{}", e),
        }
    }

    println!("Bye");
    Ok(())
}

fn print_outcome(outcome: pw_client::ClientResult<String>) {
    match outcome {
        Ok(output) => println!("{}", output),
        Err(e) if e.needs_login() => println!("{} (use 'login USER PASS')", e),
        Err(e) if e.is_retryable() => println!("{} (you may retry)", e),
        Err(e) => println!("{}", e),
    }
}
