//! # Ordex CLI
//!
//! Operator tooling for the ordinals marketplace: fee arithmetic, PSBT
//! inspection and offline merging of signed listings and purchases.

use anyhow::{Context, Result};
use bitcoin::{psbt::Psbt, Address, Network};
use clap::{Parser, Subcommand};
use colored::*;
use log::debug;
use ordex_core::{
    calculate_tx_bytes_fee_with_rate, config::parse_network, extract_merged_transaction,
    merge_signed_buying_psbt, platform_fee_value, psbt_from_base64, psbt_to_base64,
    seller_ord_output_value, tx_to_hex, utils::*, MarketConfig, TxLayout,
};

#[derive(Parser)]
#[command(name = "ordex")]
#[command(about = "Ordinals marketplace PSBT tooling")]
#[command(version)]
struct Cli {
    /// Network addresses are checked against
    #[arg(short, long, global = true, env = "BTC_NETWORK")]
    network: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the network fee of a transaction shape
    Fee {
        /// Number of inputs
        #[arg(short, long)]
        inputs: usize,
        /// Number of outputs, change excluded
        #[arg(short, long)]
        outputs: usize,
        /// Fee rate in sat/vB
        #[arg(short, long)]
        rate: u64,
        /// Do not count a change output
        #[arg(long)]
        no_change: bool,
    },
    /// Compute the seller payout of a listing
    SellerOutput {
        /// Listing price in sats
        #[arg(short, long)]
        price: u64,
        /// Maker fee in basis points
        #[arg(short, long)]
        maker_fee_bp: u64,
        /// Value of the output holding the artifact
        #[arg(short, long)]
        output_value: u64,
    },
    /// Compute the platform fee of a purchase
    PlatformFee {
        /// Listing price in sats
        #[arg(short, long)]
        price: u64,
        /// Maker fee in basis points
        #[arg(short, long)]
        maker_fee_bp: u64,
        /// Taker fee in basis points
        #[arg(short, long)]
        taker_fee_bp: u64,
    },
    /// Decode a base64 PSBT and show its inputs and outputs
    Inspect {
        /// Base64 PSBT
        psbt: String,
    },
    /// Splice a signed listing into a signed buying PSBT
    Merge {
        /// Base64 listing PSBT signed by the seller
        #[arg(short, long)]
        listing: String,
        /// Base64 buying PSBT signed by the buyer
        #[arg(short, long)]
        buying: String,
        /// Print the final transaction hex instead of the merged PSBT
        #[arg(long)]
        extract: bool,
    },
    /// Validate a Bitcoin address
    ValidateAddress {
        /// Bitcoin address to validate
        address: String,
    },
    /// Convert between Bitcoin and satoshis
    Convert {
        /// Amount to convert
        amount: f64,
        /// Unit (btc or sat)
        unit: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = MarketConfig::from_env().context("invalid market configuration")?;
    if let Some(network) = &cli.network {
        config.network = parse_network(network)?;
    }
    debug!("market configuration: {config:?}");

    match cli.command {
        Commands::Fee {
            inputs,
            outputs,
            rate,
            no_change,
        } => {
            let fee = calculate_tx_bytes_fee_with_rate(inputs, outputs, rate, !no_change)?;
            println!(
                "{}: {} sats ({} inputs, {} outputs{}, {} sat/vB)",
                "Network Fee".green().bold(),
                fee.to_string().cyan(),
                inputs,
                outputs,
                if no_change { "" } else { " + change" },
                rate
            );
        }

        Commands::SellerOutput {
            price,
            maker_fee_bp,
            output_value,
        } => {
            let payout = seller_ord_output_value(price, maker_fee_bp, output_value);
            println!(
                "{}: {} sats",
                "Seller Output".green().bold(),
                payout.to_string().cyan()
            );
        }

        Commands::PlatformFee {
            price,
            maker_fee_bp,
            taker_fee_bp,
        } => {
            let fee = platform_fee_value(price, maker_fee_bp, taker_fee_bp)?;
            println!(
                "{}: {} sats",
                "Platform Fee".green().bold(),
                fee.to_string().cyan()
            );
            if !config.is_above_dust(fee) {
                println!(
                    "{}",
                    format!(
                        "At or below {} sats: the fee output is omitted",
                        config.dummy_utxo_min_value
                    )
                    .yellow()
                );
            }
        }

        Commands::Inspect { psbt } => {
            let psbt = psbt_from_base64(&psbt)?;
            print_psbt(&psbt, config.network);
        }

        Commands::Merge {
            listing,
            buying,
            extract,
        } => {
            let listing = psbt_from_base64(&listing).context("cannot decode listing PSBT")?;
            let buying = psbt_from_base64(&buying).context("cannot decode buying PSBT")?;
            let merged = merge_signed_buying_psbt(&listing, &buying)?;

            if extract {
                let tx = extract_merged_transaction(&merged)?;
                println!("{}: {}", "Txid".green().bold(), tx.compute_txid());
                println!("{}", tx_to_hex(&tx));
            } else {
                println!("{}", psbt_to_base64(&merged));
            }
        }

        Commands::ValidateAddress { address } => {
            let network = config.network;
            if validate_address(&address, network) {
                println!(
                    "{}: {} is {} for {}",
                    "Address Validation".green().bold(),
                    address.cyan(),
                    "valid".green(),
                    network.to_string().yellow()
                );
            } else {
                println!(
                    "{}: {} is {} for {}",
                    "Address Validation".red().bold(),
                    address.cyan(),
                    "invalid".red(),
                    network.to_string().yellow()
                );
            }
        }

        Commands::Convert { amount, unit } => match unit.to_lowercase().as_str() {
            "btc" => {
                let satoshis = btc_to_satoshi(amount);
                println!(
                    "{}: {} BTC = {} satoshis",
                    "Conversion".green().bold(),
                    amount.to_string().cyan(),
                    satoshis.to_string().yellow()
                );
            }
            "sat" | "sats" => {
                let btc = satoshi_to_btc(amount as u64);
                println!(
                    "{}: {} satoshis = {} BTC",
                    "Conversion".green().bold(),
                    (amount as u64).to_string().cyan(),
                    btc.to_string().yellow()
                );
            }
            _ => {
                println!("{}: Unit must be 'btc' or 'sat'", "Error".red().bold());
            }
        },
    }

    Ok(())
}

fn print_psbt(psbt: &Psbt, network: Network) {
    let tx = &psbt.unsigned_tx;
    let seller_index = TxLayout::TWO_DUMMY.seller_index;

    println!("{}", "PSBT".green().bold());
    println!("{}", "═".repeat(50).bright_black());
    println!("{}: {}", "Unsigned Txid".yellow().bold(), tx.compute_txid());

    println!("{} ({})", "Inputs".yellow().bold(), tx.input.len());
    for (index, (txin, input)) in tx.input.iter().zip(&psbt.inputs).enumerate() {
        let finalized = input.final_script_witness.is_some() || input.final_script_sig.is_some();
        let status = if finalized {
            "signed".green()
        } else {
            "unsigned".red()
        };
        let sighash = input
            .sighash_type
            .map(|ty| format!(" [{ty}]"))
            .unwrap_or_default();
        let marker = if tx.input.len() > seller_index && index == seller_index {
            " (seller)".bright_blue().to_string()
        } else {
            String::new()
        };
        println!(
            "  #{index} {} {status}{sighash}{marker}",
            txin.previous_output.to_string().cyan()
        );
    }

    println!("{} ({})", "Outputs".yellow().bold(), tx.output.len());
    for (index, output) in tx.output.iter().enumerate() {
        let destination = Address::from_script(&output.script_pubkey, network)
            .map(|address| address.to_string())
            .unwrap_or_else(|_| output.script_pubkey.to_hex_string());
        println!(
            "  #{index} {} sats -> {}",
            output.value.to_sat().to_string().cyan(),
            destination
        );
    }
    println!("{}", "═".repeat(50).bright_black());
}
