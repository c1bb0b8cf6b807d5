use std::path::PathBuf;

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use chain_custody::config::{load_config, CustodyConfig};
use chain_custody::observability::init_logging;
use chain_custody::operations::OperationError;
use chain_custody::services::{BootstrapPlan, ServiceError, ServiceResult, TokenPlan};
use chain_custody::storage::Store;

#[derive(Parser)]
#[command(name = "custody-cli")]
#[command(about = "Operator tooling for the custody state file", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "custody.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the configured network, its assets and the starter-asset config
    Bootstrap {
        /// Existing hosted wallet that funds starter assets
        #[arg(long)]
        house: Option<Address>,
        /// Native amount given to every new address
        #[arg(long)]
        starter_eth: Option<Decimal>,
        /// Token contract of the starter token
        #[arg(long)]
        toybox_contract: Option<Address>,
        #[arg(long, default_value = "TOY")]
        toybox_symbol: String,
        #[arg(long, default_value = "Toybox")]
        toybox_name: String,
        #[arg(long, default_value_t = 0)]
        toybox_decimals: u32,
        /// Whole tokens given to every new address
        #[arg(long)]
        starter_toybox: Option<u64>,
    },
    /// Print operation counts and the ledger audit
    Status,
    /// Credit an address without touching the chain (test networks only)
    FauxDeposit {
        #[arg(long)]
        address: Address,
        #[arg(long, default_value = "ETH")]
        asset: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "Faux deposit")]
        note: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    init_logging(&config.observability);

    let path = config
        .storage
        .state_path
        .clone()
        .ok_or("storage.state_path must be set for custody-cli")?;
    let store = Store::open(&path)?;

    match cli.command {
        Commands::Bootstrap {
            house,
            starter_eth,
            toybox_contract,
            toybox_symbol,
            toybox_name,
            toybox_decimals,
            starter_toybox,
        } => {
            let plan = BootstrapPlan {
                network_name: config.network.name.clone(),
                house_address: house,
                toybox: toybox_contract.map(|contract| TokenPlan {
                    symbol: toybox_symbol,
                    name: toybox_name,
                    contract,
                    decimals: toybox_decimals,
                }),
                starter_eth,
                starter_toybox,
            };
            let report = store.atomic(|t| t.bootstrap_network(&plan))?;
            println!("network      {}", report.network_id);
            println!("native asset {}", report.native_asset_id);
            if let Some(id) = report.toybox_asset_id {
                println!("toybox asset {}", id);
            }
            if let Some(id) = report.house_address_id {
                println!("house        {}", id);
            }
        }
        Commands::Status => print_status(&store, &config)?,
        Commands::FauxDeposit {
            address,
            asset,
            amount,
            note,
        } => {
            if !config.network.allow_faux_deposits {
                return Err(OperationError::FauxDepositsDisabled.into());
            }
            let name = config.network.name.clone();
            let op = store.atomic(|t| -> ServiceResult<_> {
                let network = t
                    .network_by_name(&name)
                    .ok_or_else(|| ServiceError::Setup(format!("network '{}' is not bootstrapped", name)))?
                    .id;
                let asset_id = t
                    .asset_by_symbol(network, &asset)
                    .ok_or_else(|| ServiceError::Setup(format!("asset '{}' is not registered", asset)))?
                    .id;
                let address_id = t.get_or_create_address(network, address)?;
                Ok(t.record_faux_deposit(address_id, asset_id, amount, &note)?)
            })?;
            println!("operation {}", op);
        }
    }

    store.flush()?;
    Ok(())
}

fn print_status(store: &Store, config: &CustodyConfig) -> Result<(), Box<dyn std::error::Error>> {
    let summary = store.read(|t| {
        let network = t.network_by_name(&config.network.name);
        let counts = network.map(|n| t.operation_counts(n.id));
        let heartbeat = network.and_then(|n| n.metadata.heartbeat);
        let bookmark = network.and_then(|n| n.metadata.event_bookmark);
        serde_json::json!({
            "network": config.network.name,
            "bootstrapped": network.is_some(),
            "operations": counts,
            "heartbeat": heartbeat,
            "event_bookmark": bookmark,
            "audit": t.audit_ledger(),
        })
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
