use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser, Subcommand};
use log::warn;

use order_desk::data::{Ledger, LedgerStore, OrderRow};
use order_desk::mirror::{MirrorConfig, MirrorStatus, SheetsMirror};
use order_desk::orders::desk::OrderDesk;
use order_desk::orders::order::OrderForm;

/// Records customer orders in a local ledger and mirrors them to Google Sheets
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Ledger file, `.xlsx` for a workbook, anything else is CSV
    #[arg(long, env = "ORDER_DESK_LEDGER", default_value = "orders.xlsx", global = true)]
    ledger: PathBuf,

    /// Service account key used to reach the remote spreadsheet
    #[arg(long, env = "ORDER_DESK_CREDENTIALS", default_value = "credentials.json", global = true)]
    credentials: PathBuf,

    /// Title of the remote spreadsheet
    #[arg(long, env = "ORDER_DESK_SPREADSHEET", default_value = "Orders", global = true)]
    spreadsheet: String,

    /// Spreadsheet id, skips the lookup by title
    #[arg(long, env = "ORDER_DESK_SPREADSHEET_ID", global = true)]
    spreadsheet_id: Option<String>,

    /// Worksheet to append to, defaults to the first one
    #[arg(long, env = "ORDER_DESK_WORKSHEET", global = true)]
    worksheet: Option<String>,

    /// Only write the local ledger
    #[arg(
        long,
        env = "ORDER_DESK_NO_MIRROR",
        global = true,
        action = ArgAction::SetTrue,
        value_parser = FalseyValueParser::new()
    )]
    no_mirror: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the ledger if it does not exist
    Init,
    /// Save a new order
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        contact: String,
        /// Order details, `-` reads them from stdin
        #[arg(long)]
        details: String,
        #[arg(long, allow_hyphen_values = true)]
        amount: String,
    },
    /// Print every saved order as CSV
    List,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match &args.command {
        Command::Init => {
            Ledger::open(&args.ledger)
                .ensure_store_exists()
                .with_context(|| format!("failed to create ledger {}", args.ledger.display()))?;
        },
        Command::Add {
            name,
            contact,
            details,
            amount,
        } => {
            let details = if details == "-" { read_stdin()? } else { details.clone() };
            add_order(&args, OrderForm::new(name, contact, details, amount))?;
        },
        Command::List => list_orders(&args.ledger)?,
    }

    Ok(())
}

fn add_order(args: &Args, form: OrderForm) -> Result<()> {
    let mirror = if args.no_mirror { None } else { Some(SheetsMirror::new(mirror_config(args))?) };
    let mut desk = OrderDesk::open(Ledger::open(&args.ledger), mirror)
        .with_context(|| format!("failed to open ledger {}", args.ledger.display()))?;

    let receipt = desk.submit(&form)?;
    println!("Order has been saved! ({})", receipt.order.formatted_timestamp());
    match &receipt.mirror {
        MirrorStatus::Replicated => println!("Order details saved to Google Sheet!"),
        MirrorStatus::Skipped => {},
        MirrorStatus::Failed(err) => {
            warn!("order kept locally only");
            eprintln!("Failed to save to Google Sheets: {}", err);
        },
    }
    desk.clear();

    Ok(())
}

fn list_orders(ledger: &Path) -> Result<()> {
    let orders = Ledger::open(ledger)
        .load_all()
        .with_context(|| format!("failed to load orders from {}", ledger.display()))?;

    let mut csv_writer = csv::WriterBuilder::new().from_writer(std::io::stdout());
    for order in &orders {
        let record: OrderRow = order.into();
        csv_writer.serialize(record)?;
    }
    if orders.is_empty() {
        csv_writer.write_record(order_desk::data::HEADER)?;
    }

    csv_writer.flush()?;

    Ok(())
}

fn mirror_config(args: &Args) -> MirrorConfig {
    MirrorConfig {
        credentials_path: args.credentials.clone(),
        spreadsheet_title: args.spreadsheet.clone(),
        spreadsheet_id: args.spreadsheet_id.clone(),
        worksheet: args.worksheet.clone(),
        ..MirrorConfig::default()
    }
}

fn read_stdin() -> Result<String> {
    let mut details = String::new();
    std::io::stdin().read_to_string(&mut details).context("failed to read order details from stdin")?;
    Ok(details)
}
