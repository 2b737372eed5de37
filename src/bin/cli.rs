//! A command-line client for the ledger node.

use anyhow::{bail, Context};
use clap::Parser;
use hashledger::address::derive_address;
use hashledger::api::{SubmittedBlock, TransactionRequest};
use hashledger::chain::compute_block_hash;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Base URL of the ledger node.
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print the address owned by a key
    Address {
        #[arg(short, long)]
        pkey: String,
    },
    /// Compute the hash a block must carry
    Hash {
        #[arg(long)]
        prev: String,
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        nonce: String,
    },
    /// Get the balance of an address
    Balance {
        #[arg(short, long)]
        address: String,
    },
    /// Send coins to another address
    Transfer {
        #[arg(short, long)]
        pkey: String,
        #[arg(short, long)]
        to: String,
        #[arg(short, long)]
        amount: u64,
    },
    /// Submit a block on top of the current tip, rewarding `address`
    Mine {
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        nonce: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let node = args.node.trim_end_matches('/');
    let client = reqwest::Client::new();

    match args.command {
        Commands::Address { pkey } => {
            println!("{}", derive_address(pkey));
        }
        Commands::Hash {
            prev,
            address,
            nonce,
        } => {
            println!("{}", compute_block_hash(&prev, &address, &nonce));
        }
        Commands::Balance { address } => {
            let body = fetch(&client, &format!("{}/address/{}", node, address)).await?;
            println!("{}", body["balance"]);
        }
        Commands::Transfer { pkey, to, amount } => {
            let request = TransactionRequest {
                pkey,
                address: to,
                amount,
            };
            let response = client
                .post(format!("{}/transaction", node))
                .json(&request)
                .send()
                .await
                .context("sending transfer")?;
            report(response).await?;
        }
        Commands::Mine { address, nonce } => {
            let tip = fetch(&client, &format!("{}/block", node)).await?;
            let Some(prev) = tip["block"].as_str().map(str::to_string) else {
                bail!("node returned no chain tip");
            };
            let block = SubmittedBlock {
                block: compute_block_hash(&prev, &address, &nonce),
                prev_block: prev,
                address,
                nonce,
            };
            let response = client
                .post(format!("{}/block", node))
                .json(&block)
                .send()
                .await
                .context("submitting block")?;
            report(response).await?;
            println!("{}", block.block);
        }
    }
    Ok(())
}

async fn fetch(client: &reqwest::Client, url: &str) -> anyhow::Result<Value> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("requesting {}", url))?;
    let status = response.status();
    let body: Value = response.json().await.context("decoding response")?;
    if !status.is_success() {
        bail!("{}: {}", status, body["error"]);
    }
    Ok(body)
}

async fn report(response: reqwest::Response) -> anyhow::Result<()> {
    let status = response.status();
    let body: Value = response.json().await.context("decoding response")?;
    if !status.is_success() {
        bail!("{}: {}", status, body["error"]);
    }
    println!("ok");
    Ok(())
}
