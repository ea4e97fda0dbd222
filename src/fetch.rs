use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use reqwest::Client;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::PendingDocument;

const CONCURRENCY: usize = 4;

/// `src` attribute of an iframe one escaping layer up: the campaign pages
/// serve the embed markup with its angle brackets and quotes already
/// entity-escaped (`&lt;iframe … src=&quot;…&quot;&gt;`).
static ESCAPED_IFRAME_SRC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)&lt;iframe\s.*?src=&quot;(.*?)&quot;.*?&gt;").unwrap());

/// Build the HTTP client shared by every stage.
pub fn build_client(config: &Config) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to build HTTP client")
}

/// Fetch a document as text, treating any non-2xx status as an error.
pub async fn fetch_document(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request failed: {url}"))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP {status} fetching {url}");
    }
    response
        .text()
        .await
        .with_context(|| format!("failed to read body: {url}"))
}

/// Table-document URLs a seed page embeds, in source order. The captured
/// `src` values still carry their own `&amp;` layer, which is undone here.
pub fn discover_table_urls(page: &str) -> Vec<String> {
    ESCAPED_IFRAME_SRC_RE
        .captures_iter(page)
        .map(|caps| caps[1].replace("&amp;", "&"))
        .collect()
}

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

struct FetchOutcome {
    doc_id: i64,
    html: Option<String>,
    error: Option<String>,
}

/// Fetch table documents concurrently, saving each body to the DB as it
/// arrives. A failed fetch records its error on the document row and does
/// not stop the rest of the queue.
pub async fn fetch_documents_streaming(
    conn: &Connection,
    client: &Client,
    documents: Vec<PendingDocument>,
) -> Result<FetchStats> {
    let semaphore = Arc::new(Semaphore::new(CONCURRENCY));
    let total = documents.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchOutcome>(CONCURRENCY * 2);

    for doc in documents {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let outcome = match fetch_document(&client, &doc.url).await {
                Ok(html) => FetchOutcome {
                    doc_id: doc.id,
                    html: Some(html),
                    error: None,
                },
                Err(e) => {
                    warn!("fetch failed for {}: {:#}", doc.url, e);
                    FetchOutcome {
                        doc_id: doc.id,
                        html: None,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            let _ = tx.send(outcome).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    // Prepare statements once, reuse for each row
    let mut body_stmt = conn.prepare(
        "UPDATE documents
         SET html = ?2, fetched = 1, fetched_at = datetime('now'), error = NULL
         WHERE id = ?1",
    )?;
    let mut error_stmt = conn.prepare(
        "UPDATE documents
         SET fetched = 1, fetched_at = datetime('now'), error = ?2
         WHERE id = ?1",
    )?;

    while let Some(outcome) = rx.recv().await {
        match (&outcome.html, &outcome.error) {
            (Some(html), _) => {
                ok += 1;
                body_stmt.execute(rusqlite::params![outcome.doc_id, html])?;
            }
            (None, error) => {
                errors += 1;
                error_stmt.execute(rusqlite::params![outcome.doc_id, error])?;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} documents ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}
