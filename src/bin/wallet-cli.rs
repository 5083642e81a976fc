use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "wallet-cli")]
#[command(about = "Management CLI for the wallet relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:7545")]
    url: String,

    #[arg(short, long, env = "WALLET_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon, vault and queue status
    Status,
    /// List providers and their health
    Providers,
    /// Move a chain to another provider (next healthy one if no name given)
    Switch {
        chain_id: u64,
        provider: Option<String>,
    },
    /// List pending approvals
    Approvals,
    /// Approve a pending request
    Approve { id: u64 },
    /// Reject a pending request
    Reject { id: u64 },
    /// List accounts
    Accounts,
    /// Derive a new primary account, or a sub account under PARENT
    Derive { parent: Option<String> },
    /// Select an account
    Select { id: String },
    /// Retire an account
    Retire { id: String },
    /// Create a vault, generating a phrase unless one is given
    Create {
        #[arg(long)]
        passphrase: String,
        #[arg(long)]
        mnemonic: Option<String>,
    },
    /// Unlock the vault
    Unlock {
        #[arg(long)]
        passphrase: String,
    },
    /// Lock the vault
    Lock,
    /// Clear a halted derivation fault
    Acknowledge,
    /// List origin sessions
    Sessions,
    /// Revoke an origin's permissions
    Revoke { origin: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let url = |path: &str| format!("{}/admin/{}", cli.url.trim_end_matches('/'), path);

    let res = match cli.command {
        Commands::Status => client.get(url("status")).send().await?,
        Commands::Providers => client.get(url("providers")).send().await?,
        Commands::Switch { chain_id, provider } => {
            client
                .post(url("providers/switch"))
                .json(&json!({ "chainId": chain_id, "provider": provider }))
                .send()
                .await?
        }
        Commands::Approvals => client.get(url("approvals")).send().await?,
        Commands::Approve { id } => {
            client
                .post(url(&format!("approvals/{}", id)))
                .json(&json!({ "decision": "approve" }))
                .send()
                .await?
        }
        Commands::Reject { id } => {
            client
                .post(url(&format!("approvals/{}", id)))
                .json(&json!({ "decision": "reject" }))
                .send()
                .await?
        }
        Commands::Accounts => client.get(url("accounts")).send().await?,
        Commands::Derive { parent } => client.post(url("accounts")).json(&json!({ "parent": parent })).send().await?,
        Commands::Select { id } => client.post(url(&format!("accounts/{}/select", id))).send().await?,
        Commands::Retire { id } => client.post(url(&format!("accounts/{}/retire", id))).send().await?,
        Commands::Create { passphrase, mnemonic } => {
            client
                .post(url("vault"))
                .json(&json!({ "passphrase": passphrase, "mnemonic": mnemonic }))
                .send()
                .await?
        }
        Commands::Unlock { passphrase } => {
            client
                .post(url("vault/unlock"))
                .json(&json!({ "passphrase": passphrase }))
                .send()
                .await?
        }
        Commands::Lock => client.post(url("vault/lock")).send().await?,
        Commands::Acknowledge => client.post(url("vault/acknowledge")).send().await?,
        Commands::Sessions => client.get(url("sessions")).send().await?,
        Commands::Revoke { origin } => {
            client
                .post(url("sessions/revoke"))
                .json(&json!({ "origin": origin }))
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
