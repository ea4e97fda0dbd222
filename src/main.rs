mod config;
mod db;
mod export;
mod extract;
mod fetch;
mod geo;
mod timing;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use clap::{Parser, Subcommand};
use reqwest::Client;
use rusqlite::Connection;
use tracing::{error, warn};

use config::Config;
use timing::timed;

#[derive(Parser)]
#[command(name = "availmap", about = "Store availability scraper and geocoder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover table documents embedded in the seed pages
    Init {
        /// Seed page URLs (default: the built-in campaign pages)
        #[arg(short, long)]
        url: Vec<String>,
    },
    /// Fetch table documents and extract store rows
    Scrape,
    /// Geocode every scraped address (all-or-nothing batch)
    Geocode,
    /// Scrape + geocode in one pipeline
    Run,
    /// Write the JSON artifacts the map frontend consumes
    Export {
        /// Output directory
        #[arg(short, long, default_value = "dist")]
        out: String,
    },
    /// Show pipeline statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = Config::default();

    let conn = db::connect()?;
    db::init_schema(&conn)?;
    let client = fetch::build_client(&config)?;

    let result = match cli.command {
        Commands::Init { url } => timed("init", cmd_init(&conn, &client, &config, url)).await,
        Commands::Scrape => timed("scrape", cmd_scrape(&conn, &client, &config)).await,
        Commands::Geocode => timed("geocode", cmd_geocode(&conn, &client, &config)).await,
        Commands::Run => {
            timed("scrape", cmd_scrape(&conn, &client, &config)).await?;
            timed("geocode", cmd_geocode(&conn, &client, &config)).await
        }
        Commands::Export { out } => timed("export", async { cmd_export(&conn, &out) }).await,
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Seed pages:   {}", s.seed_pages);
            println!("Documents:    {}", s.documents);
            println!("Fetched:      {}", s.fetched);
            println!("Fetch errors: {}", s.fetch_errors);
            println!("Stores:       {}", s.stores);
            println!("Coordinates:  {}", s.coords);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Fetch each seed page and queue the table documents it embeds.
async fn cmd_init(
    conn: &Connection,
    client: &Client,
    config: &Config,
    urls: Vec<String>,
) -> anyhow::Result<()> {
    let seeds = if urls.is_empty() {
        config.seed_urls.clone()
    } else {
        urls
    };

    for seed in &seeds {
        db::insert_seed_page(conn, seed)?;
        let page = fetch::fetch_document(client, seed).await?;
        let found = fetch::discover_table_urls(&page);
        if found.is_empty() {
            warn!("no table documents found in {}", seed);
            continue;
        }
        let inserted = db::insert_documents(conn, seed, &found)?;
        println!("{}: {} table documents ({} new)", seed, found.len(), inserted);
    }
    Ok(())
}

/// Fetch whatever documents are still pending, then extract store rows from
/// every fetched document.
async fn cmd_scrape(conn: &Connection, client: &Client, config: &Config) -> anyhow::Result<()> {
    let pending = db::fetch_unfetched_documents(conn)?;
    if !pending.is_empty() {
        println!("Fetching {} table documents...", pending.len());
        let stats = fetch::fetch_documents_streaming(conn, client, pending).await?;
        println!(
            "Fetched {} documents ({} ok, {} errors).",
            stats.total, stats.ok, stats.errors
        );
    }

    let documents = db::fetch_documents_with_body(conn)?;
    if documents.is_empty() {
        println!("No fetched documents. Run 'init' first.");
        return Ok(());
    }

    println!("Extracting store rows from {} documents...", documents.len());
    let (stores, failures) = extract_documents(conn, config, &documents)?;
    println!("Saved {} store rows ({} documents failed).", stores, failures);
    Ok(())
}

/// Parse fetched documents in parallel; a structural failure is fatal for
/// its document only and is recorded on the document row.
fn extract_documents(
    conn: &Connection,
    config: &Config,
    documents: &[db::FetchedDocument],
) -> anyhow::Result<(usize, usize)> {
    use rayon::prelude::*;

    let mut stores = 0usize;
    let mut failures = 0usize;

    for chunk in documents.chunks(100) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|doc| (doc, extract::scrape_store_records(&doc.html, config)))
            .collect();

        for (doc, result) in results {
            match result {
                Ok(records) => {
                    stores += records.len();
                    db::save_store_records(conn, &doc.url, &records)?;
                }
                Err(e) => {
                    failures += 1;
                    error!("extraction failed for {}: {:#}", doc.url, e);
                    db::save_document_error(conn, doc.id, &format!("{e:#}"))?;
                }
            }
        }
    }

    Ok((stores, failures))
}

async fn cmd_geocode(conn: &Connection, client: &Client, config: &Config) -> anyhow::Result<()> {
    let addresses = db::list_store_addresses(conn)?;
    if addresses.is_empty() {
        println!("No store rows. Run 'scrape' first.");
        return Ok(());
    }

    println!("Geocoding {} addresses...", addresses.len());
    let coords = geo::geocode_addresses(client, config, &addresses).await?;
    db::save_coordinates(conn, &coords)?;
    println!("Resolved {} coordinates.", coords.len());
    Ok(())
}

fn cmd_export(conn: &Connection, out: &str) -> anyhow::Result<()> {
    let dir = Path::new(out);

    let urls = db::list_document_urls(conn)?;
    let avail: BTreeMap<String, String> = db::list_store_avail(conn)?.into_iter().collect();
    let coords = export::coord_lookup(&db::list_coordinates(conn)?);

    for path in [
        export::write_artifact(dir, "document_url_list.json", &urls)?,
        export::write_artifact(dir, "store_avail_lookup.json", &avail)?,
        export::write_artifact(dir, "geo_coord_lookup.json", &coords)?,
    ] {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
