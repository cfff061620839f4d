use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use mortgage_calc::logging::init_logging;
use mortgage_calc::query::{self, OfferQuery, QuotedOffer};
use mortgage_calc::{
    count_offers, create_offer, list_offers, query_offers, setup_database, validate_offer,
    validate_quote_request, AppConfig, OfferFields, OfferFilter, QuoteRequest, SortOrder,
};

#[derive(Debug, Parser)]
#[command(name = "mortgage-calc")]
#[command(about = "Mortgage offer catalog and quote calculator")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides the configured path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import offers from a CSV file with a header row
    Import { csv: PathBuf },

    /// List every stored offer
    List,

    /// Quote every offer eligible for a price and term
    Quote {
        #[arg(long)]
        price: u64,
        #[arg(long)]
        term: u32,
        #[arg(long, default_value_t = 0.0)]
        deposit: f64,
        /// Sort key, `-` prefix for descending (e.g. -rate)
        #[arg(long, allow_hyphen_values = true)]
        order: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }
    init_logging(&config.logging.level, config.logging.json);

    let conn = Connection::open(&config.database.path)
        .with_context(|| format!("Failed to open database {:?}", config.database.path))?;
    setup_database(&conn)?;

    match cli.command {
        Command::Import { csv } => run_import(&conn, &csv),
        Command::List => run_list(&conn),
        Command::Quote {
            price,
            term,
            deposit,
            order,
        } => run_quote(&conn, QuoteRequest { price, deposit, term }, order.as_deref()),
    }
}

fn run_import(conn: &Connection, csv_path: &Path) -> Result<()> {
    println!("📂 Importing offers from {:?}", csv_path);

    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;
    let mut imported = 0;
    let mut rejected = 0;

    for (index, record) in rdr.deserialize::<OfferFields>().enumerate() {
        // Header is line 1
        let line = index + 2;
        let fields = record.with_context(|| format!("Failed to parse offer on line {}", line))?;

        if let Err(errors) = validate_offer(&fields) {
            rejected += 1;
            for error in errors {
                tracing::warn!(line, %error, "Rejected offer");
            }
            continue;
        }

        create_offer(conn, &fields)?;
        imported += 1;
    }

    println!("✓ Imported: {} offers", imported);
    println!("✓ Rejected: {} offers", rejected);
    println!("✓ Database contains {} offers", count_offers(conn)?);

    Ok(())
}

fn run_list(conn: &Connection) -> Result<()> {
    let offers = list_offers(conn)?;
    if offers.is_empty() {
        println!("No offers stored yet. Run: mortgage-calc import <file.csv>");
        return Ok(());
    }

    let records: Vec<QuotedOffer> = offers.into_iter().map(QuotedOffer::from).collect();
    print_table(&records);
    Ok(())
}

fn run_quote(conn: &Connection, request: QuoteRequest, order: Option<&str>) -> Result<()> {
    validate_quote_request(&request).map_err(mortgage_calc::CalcError::from)?;

    let offer_query = OfferQuery {
        quote: Some(request),
        order: order.map(str::parse::<SortOrder>).transpose()?,
        page: None,
    };
    let filter = OfferFilter {
        price: Some(request.price),
        term: Some(request.term),
    };

    let offers = query_offers(conn, &filter)?;
    match query::run(offers, &offer_query) {
        Ok(records) => print_table(&records),
        Err(mortgage_calc::CalcError::NotFound(message)) => println!("{}", message),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

fn print_table(records: &[QuotedOffer]) {
    println!(
        "{:>4}  {:<24} {:>13} {:>9} {:>25} {:>12} {:>8}",
        "ID", "BANK", "RATE %", "TERM", "AMOUNT", "PAYMENT", "QUOTED %"
    );

    for record in records {
        let o = &record.offer;
        println!(
            "{:>4}  {:<24} {:>13} {:>9} {:>25} {:>12} {:>8}",
            o.id,
            o.bank_name,
            format!("{}-{}", o.rate_min, o.rate_max),
            format!("{}-{}", o.term_min, o.term_max),
            format!("{}-{}", o.payment_min, o.payment_max),
            record.payment.map(|p| format!("{:.2}", p)).unwrap_or_default(),
            record.rate.map(|r| format!("{:.2}", r)).unwrap_or_default(),
        );
    }
}
