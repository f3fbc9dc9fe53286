use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use bling_order_processor::bling::database::OrderDatabase;
use bling_order_processor::bling::quote::QuoteInput;
use bling_order_processor::bling::BlingProvider;
use bling_order_processor::settings;

#[derive(Parser)]
#[command(name = "bling-order-processor", about = "Quote approval core with Bling ERP reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the Bling authorization URL (issues a state nonce)
    Connect,
    /// Complete the authorization callback
    Callback {
        #[arg(long)]
        code: String,
        #[arg(long)]
        state: String,
    },
    /// Show whether a Bling token is stored
    Status,
    /// Create a PENDING quote from a JSON input file
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// List quotes with their client-facing summaries
    List,
    /// Approve a quote: resolve the contact and submit the order to Bling
    Approve { id: String },
    /// Reject a quote
    Reject { id: String },
    /// List Bling products
    Products {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    /// List Bling stock balances
    Stock {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration from environment
    let cfg = settings::Config::from_env();
    let cli = Cli::parse();

    let db = OrderDatabase::new(&cfg.database_path)?;
    let provider = BlingProvider::new(cfg.bling.clone(), db)?;

    match cli.command {
        Command::Connect => {
            let url = provider.oauth().connect_url()?;
            println!("{url}");
        }
        Command::Callback { code, state } => {
            provider.oauth().complete_callback(&code, &state).await?;
            println!("Bling connected.");
        }
        Command::Status => {
            let connected = provider.tokens().connected()?;
            println!("{}", serde_json::json!({ "connected": connected }));
        }
        Command::Create { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let input: QuoteInput = serde_json::from_str(&raw)?;
            let quote = provider.orders().create_quote(input)?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
        Command::List => {
            let summaries = provider.orders().list()?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Command::Approve { id } => match provider.orders().approve(&id).await {
            Ok(outcome) => {
                println!("{}", serde_json::to_string_pretty(&outcome.quote)?);
            }
            Err(e) => {
                tracing::error!(status = e.status_code(), "approval failed: {e}");
                return Err(e.into());
            }
        },
        Command::Reject { id } => {
            let quote = provider.orders().reject(&id)?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }
        Command::Products { page, limit } => {
            let data = provider.rest().list_products(page, limit).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Command::Stock { page, limit } => {
            let data = provider.rest().list_stock_balances(page, limit).await?;
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
    }

    Ok(())
}
