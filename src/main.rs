use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use ops_toolgate::config::Config;
use ops_toolgate::{Credentials, Orchestrator, Tool, ToolError, logging};

#[derive(Parser)]
#[command(name = "ops-toolgate", version)]
#[command(about = "Policy-gated execution of the openstack and oc CLIs", long_about = None)]
struct Cli {
    /// Config overlay (default: OPS_TOOLGATE_CONFIG or ~/.config/ops-toolgate/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the merged configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,

    /// Debug logging on stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct CommandArgs {
    /// Wrapped tool: infra (openstack) or cluster (oc)
    #[arg(long, short)]
    tool: Tool,

    #[command(flatten)]
    credentials: CredentialArgs,

    /// The command, with or without the tool name
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[derive(Args)]
struct CredentialArgs {
    /// Token passed to the wrapped tool
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    /// Service URL (infra) or API server URL (cluster)
    #[arg(long, value_name = "URL")]
    url: Option<String>,
}

impl CredentialArgs {
    fn into_credentials(self) -> Credentials {
        Credentials::new(self.token, self.url)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one command and print its output.
    Run(CommandArgs),

    /// Sanitize and classify a command without running it.
    Check(CommandArgs),

    /// Serve line-delimited JSON requests from stdin, one JSON response per line on stdout.
    Serve,

    /// Print the allow/deny partition of the installed infra catalog.
    Catalog(CredentialArgs),
}

#[derive(Deserialize)]
struct ServeRequest {
    #[serde(default)]
    id: serde_json::Value,
    tool: Tool,
    command: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Serialize)]
struct ServeResponse {
    id: serde_json::Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ServeResponse {
    fn from_result(id: serde_json::Value, result: Result<String, ToolError>) -> Self {
        match result {
            Ok(output) => Self {
                id,
                ok: true,
                output: Some(output),
                kind: None,
                error: None,
            },
            Err(e) => Self {
                id,
                ok: false,
                output: None,
                kind: Some(e.kind()),
                error: Some(e.to_string()),
            },
        }
    }
}

fn command_string(words: &[String]) -> anyhow::Result<String> {
    shlex::try_join(words.iter().map(String::as_str)).context("command contains a NUL byte")
}

fn print_output(output: &str) {
    if output.ends_with('\n') {
        print!("{output}");
    } else {
        println!("{output}");
    }
}

async fn run_command(orch: &Orchestrator, args: CommandArgs) -> anyhow::Result<ExitCode> {
    let command = command_string(&args.command)?;
    let result = match orch.request(args.tool, &command, args.credentials.into_credentials()) {
        Ok(request) => orch.execute(&request).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(output) => {
            print_output(&output);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_check(orch: &Orchestrator, args: CommandArgs) -> anyhow::Result<ExitCode> {
    let command = command_string(&args.command)?;
    let result = match orch.request(args.tool, &command, args.credentials.into_credentials()) {
        Ok(request) => orch.authorize(&request).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(authorized) => {
            println!(
                "{}: {}",
                authorized.decision.decision.label(),
                authorized.decision.reason
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}: {e}", e.kind());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_catalog(orch: &Orchestrator, credentials: CredentialArgs) -> anyhow::Result<ExitCode> {
    let state = match orch.infra_state(&credentials.into_credentials()).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{e}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let (allowed, denied) = state.catalog.partition();
    let versions: serde_json::Map<String, serde_json::Value> = state
        .versions
        .iter()
        .map(|(api, v)| (api.to_string(), serde_json::Value::from(v)))
        .collect();
    let report = serde_json::json!({
        "phase": orch.shell().phase().as_str(),
        "mode": orch.mode(Tool::Infra).as_str(),
        "allowed": allowed,
        "denied": denied,
        "api_versions": versions,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(ExitCode::SUCCESS)
}

async fn serve(orch: Arc<Orchestrator>) -> anyhow::Result<ExitCode> {
    let (tx, mut rx) = mpsc::channel::<ServeResponse>(64);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = rx.recv().await {
            let mut line = serde_json::to_string(&response)?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        anyhow::Ok(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let tx = tx.clone();
        let request: ServeRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let _ = tx
                    .send(ServeResponse {
                        id: serde_json::Value::Null,
                        ok: false,
                        output: None,
                        kind: Some("invalid_request"),
                        error: Some(e.to_string()),
                    })
                    .await;
                continue;
            }
        };
        let orch = Arc::clone(&orch);
        tokio::spawn(async move {
            let credentials = Credentials::new(request.token, request.url);
            let result = match orch.request(request.tool, &request.command, credentials) {
                Ok(req) => orch.execute(&req).await,
                Err(e) => Err(e),
            };
            let _ = tx.send(ServeResponse::from_result(request.id, result)).await;
        });
    }

    // The writer stops once every in-flight request has answered.
    drop(tx);
    writer.await.context("response writer panicked")??;
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    if cli.dump_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(ExitCode::SUCCESS);
    }

    logging::init(cli.debug || config.settings.debug).context("initializing logger")?;

    let Some(command) = cli.command else {
        println!("Run with --help for usage");
        return Ok(ExitCode::SUCCESS);
    };

    let orch = Arc::new(Orchestrator::from_config(config));
    match command {
        Commands::Run(args) => run_command(&orch, args).await,
        Commands::Check(args) => run_check(&orch, args).await,
        Commands::Serve => serve(orch).await,
        Commands::Catalog(credentials) => run_catalog(&orch, credentials).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ops-toolgate: {e:#}");
            ExitCode::FAILURE
        }
    }
}
