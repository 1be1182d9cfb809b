use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the proof-of-work ledger node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        #[arg(long)]
        sender: String,
        #[arg(long)]
        recipient: String,
        /// Any JSON number, e.g. 10, 2.5 or -5
        #[arg(long, allow_negative_numbers = true, value_parser = parse_amount)]
        amount: Number,
    },
    /// Mine the pending transactions into a new block
    Mine,
    /// Print the full chain
    Chain,
    /// Register peer nodes
    Register {
        #[arg(required = true)]
        nodes: Vec<String>,
    },
    /// Run consensus against the registered peers
    Resolve,
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: Number,
}

// Parsed as JSON so `10` and `10.0` reach the node as written.
fn parse_amount(raw: &str) -> Result<Number, String> {
    serde_json::from_str(raw.trim()).map_err(|_| format!("{raw:?} is not a number"))
}

#[derive(Serialize)]
struct Nodes {
    nodes: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = reqwest::Client::new();
    let req = match cli.cmd {
        Command::Submit {
            sender,
            recipient,
            amount,
        } => client
            .post(format!("{node}/transactions/new"))
            .json(&Tx {
                sender,
                recipient,
                amount,
            }),
        Command::Mine => client.get(format!("{node}/mine")),
        Command::Chain => client.get(format!("{node}/chain")),
        Command::Register { nodes } => client
            .post(format!("{node}/nodes/register"))
            .json(&Nodes { nodes }),
        Command::Resolve => client.get(format!("{node}/nodes/resolve")),
    };

    let res = req.send().await.with_context(|| format!("contacting {node}"))?;
    let status = res.status();
    debug!("node answered {}", status);
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    if !status.is_success() {
        anyhow::bail!("request failed with {status}");
    }
    Ok(())
}
