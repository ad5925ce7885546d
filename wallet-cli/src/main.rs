//! Wallet CLI
//!
//! Command-line interface for the Wallet API.

use anyhow::Result;
use clap::{Parser, Subcommand};

use wallet_client::WalletClient;
use wallet_types::{
    CreateDepositRequest, CreditAccountRequest, SendPayoutRequest, TransactionResponse,
    TransactionStatus,
};

#[derive(Parser)]
#[command(name = "wallet")]
#[command(author, version, about = "Wallet API CLI client", long_about = None)]
struct Cli {
    /// Base URL of the Wallet API
    #[arg(long, env = "WALLET_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provider-funded deposits
    Deposit {
        #[command(subcommand)]
        action: DepositCommands,
    },
    /// Payouts to external receivers
    Payout {
        #[command(subcommand)]
        action: PayoutCommands,
    },
    /// Credit an account directly
    Credit {
        /// Account ID
        account: String,
        /// Amount in minor units
        #[arg(long)]
        amount: i64,
        /// Idempotency key; reuse it to retry safely
        #[arg(long)]
        id: Option<String>,
    },
    /// Show an account balance
    Balance {
        /// Account ID
        account: String,
    },
    /// Transaction lookups and reconciliation
    Tx {
        #[command(subcommand)]
        action: TxCommands,
    },
    /// Check API health
    Health,
}

#[derive(Subcommand)]
enum DepositCommands {
    /// Open a deposit and print the provider checkout info
    Create {
        #[arg(long)]
        account: String,
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Capture a deposit and credit the account
    Confirm {
        /// Transaction ID
        id: String,
    },
}

#[derive(Subcommand)]
enum PayoutCommands {
    /// Debit an account and send the funds out
    Send {
        #[arg(long)]
        account: String,
        /// Receiver address at the provider
        #[arg(long)]
        destination: String,
        #[arg(long)]
        amount: i64,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Subcommand)]
enum TxCommands {
    /// Get a transaction by ID
    Get { id: String },
    /// List an account's transactions
    List {
        /// Account ID
        account: String,
    },
    /// Resume a pending transaction now
    Reconcile { id: String },
}

fn print_outcome(resp: &TransactionResponse) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(resp)?);
    if resp.status == TransactionStatus::Pending {
        eprintln!(
            "… pending at the provider; retry with --id {} or run `wallet tx reconcile {}`",
            resp.transaction_id, resp.transaction_id
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let client = WalletClient::new(&cli.api_url);

    match cli.command {
        Commands::Health => {
            let healthy = client.health().await?;
            if healthy {
                println!("✓ API is healthy");
            } else {
                println!("✗ API is not healthy");
                std::process::exit(1);
            }
        }

        Commands::Deposit { action } => match action {
            DepositCommands::Create {
                account,
                amount,
                currency,
                id,
            } => {
                let req = CreateDepositRequest {
                    transaction_id: id,
                    account_id: account,
                    amount,
                    currency,
                };
                print_outcome(&client.create_deposit(&req).await?)?;
            }
            DepositCommands::Confirm { id } => {
                print_outcome(&client.confirm_deposit(&id).await?)?;
            }
        },

        Commands::Payout { action } => match action {
            PayoutCommands::Send {
                account,
                destination,
                amount,
                currency,
                id,
            } => {
                let req = SendPayoutRequest {
                    transaction_id: id,
                    account_id: account,
                    destination,
                    amount,
                    currency,
                };
                print_outcome(&client.send_payout(&req).await?)?;
            }
        },

        Commands::Credit {
            account,
            amount,
            id,
        } => {
            let req = CreditAccountRequest {
                transaction_id: id,
                amount,
            };
            print_outcome(&client.credit_account(&account, &req).await?)?;
        }

        Commands::Balance { account } => {
            let balance = client.get_balance(&account).await?;
            println!("{}", serde_json::to_string_pretty(&balance)?);
        }

        Commands::Tx { action } => match action {
            TxCommands::Get { id } => {
                let tx = client.get_transaction(&id).await?;
                println!("{}", serde_json::to_string_pretty(&tx)?);
            }
            TxCommands::List { account } => {
                let txs = client.list_transactions(&account).await?;
                println!("{}", serde_json::to_string_pretty(&txs)?);
            }
            TxCommands::Reconcile { id } => {
                print_outcome(&client.reconcile(&id).await?)?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_payout() {
        let cli = Cli::try_parse_from([
            "wallet",
            "--api-url",
            "http://wallet.test",
            "payout",
            "send",
            "--account",
            "alice",
            "--destination",
            "ext-bob",
            "--amount",
            "300",
            "--id",
            "p-1",
        ])
        .unwrap();

        assert_eq!(cli.api_url, "http://wallet.test");
        let Commands::Payout {
            action:
                PayoutCommands::Send {
                    account,
                    destination,
                    amount,
                    currency,
                    id,
                },
        } = cli.command
        else {
            panic!("expected payout send");
        };
        assert_eq!(account, "alice");
        assert_eq!(destination, "ext-bob");
        assert_eq!(amount, 300);
        assert_eq!(currency, "USD");
        assert_eq!(id.as_deref(), Some("p-1"));
    }

    #[test]
    fn test_rejects_missing_amount() {
        assert!(Cli::try_parse_from(["wallet", "credit", "alice"]).is_err());
    }
}
