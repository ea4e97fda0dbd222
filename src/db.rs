use std::collections::HashMap;

use anyhow::Result;
use rusqlite::Connection;

use crate::extract::StoreRecord;
use crate::geo::GeoCoordinate;

const DB_PATH: &str = "data/availmap.sqlite";

pub fn connect() -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(DB_PATH).parent() {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS seed_pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            added_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS documents (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            seed_url   TEXT NOT NULL,
            html       TEXT,
            fetched    BOOLEAN NOT NULL DEFAULT 0,
            fetched_at TEXT,
            error      TEXT,
            added_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_documents_fetched ON documents(fetched);

        -- One row per store address; re-scraping overwrites (last write wins)
        CREATE TABLE IF NOT EXISTS stores (
            address      TEXT PRIMARY KEY,
            status       TEXT NOT NULL
                         CHECK(status IN ('AVAILABLE','OUT_OF_STOCK','NOT_AVAILABLE')),
            document_url TEXT NOT NULL,
            scraped_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS coords (
            address     TEXT PRIMARY KEY,
            lng         REAL NOT NULL,
            lat         REAL NOT NULL,
            resolved_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Discovery ──

pub fn insert_seed_page(conn: &Connection, url: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO seed_pages (url) VALUES (?1)",
        rusqlite::params![url],
    )?;
    Ok(())
}

pub fn insert_documents(conn: &Connection, seed_url: &str, urls: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt =
            tx.prepare("INSERT OR IGNORE INTO documents (url, seed_url) VALUES (?1, ?2)")?;
        for url in urls {
            count += stmt.execute(rusqlite::params![url, seed_url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Scraping ──

pub struct PendingDocument {
    pub id: i64,
    pub url: String,
}

pub struct FetchedDocument {
    pub id: i64,
    pub url: String,
    pub html: String,
}

pub fn fetch_unfetched_documents(conn: &Connection) -> Result<Vec<PendingDocument>> {
    let mut stmt = conn.prepare("SELECT id, url FROM documents WHERE fetched = 0 ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingDocument {
                id: row.get(0)?,
                url: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn fetch_documents_with_body(conn: &Connection) -> Result<Vec<FetchedDocument>> {
    let mut stmt =
        conn.prepare("SELECT id, url, html FROM documents WHERE html IS NOT NULL ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedDocument {
                id: row.get(0)?,
                url: row.get(1)?,
                html: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_document_error(conn: &Connection, id: i64, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE documents SET error = ?2 WHERE id = ?1",
        rusqlite::params![id, error],
    )?;
    Ok(())
}

pub fn save_store_records(
    conn: &Connection,
    document_url: &str,
    records: &[StoreRecord],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO stores (address, status, document_url, scraped_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(address) DO UPDATE SET
                 status = excluded.status,
                 document_url = excluded.document_url,
                 scraped_at = excluded.scraped_at",
        )?;
        for record in records {
            stmt.execute(rusqlite::params![
                record.address,
                record.status.as_str(),
                document_url
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Geocoding ──

pub fn list_store_addresses(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT address FROM stores ORDER BY address")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_coordinates(
    conn: &Connection,
    coords: &HashMap<String, GeoCoordinate>,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO coords (address, lng, lat, resolved_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(address) DO UPDATE SET
                 lng = excluded.lng,
                 lat = excluded.lat,
                 resolved_at = excluded.resolved_at",
        )?;
        for (address, coord) in coords {
            stmt.execute(rusqlite::params![address, coord.lng, coord.lat])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Export ──

pub fn list_document_urls(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT url FROM documents ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_store_avail(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT address, status FROM stores ORDER BY address")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_coordinates(conn: &Connection) -> Result<Vec<(String, GeoCoordinate)>> {
    let mut stmt = conn.prepare("SELECT address, lng, lat FROM coords ORDER BY address")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                GeoCoordinate {
                    lng: row.get(1)?,
                    lat: row.get(2)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub seed_pages: i64,
    pub documents: i64,
    pub fetched: i64,
    pub fetch_errors: i64,
    pub stores: i64,
    pub coords: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> {
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    };
    Ok(Stats {
        seed_pages: count("SELECT COUNT(*) FROM seed_pages")?,
        documents: count("SELECT COUNT(*) FROM documents")?,
        fetched: count("SELECT COUNT(*) FROM documents WHERE fetched = 1")?,
        fetch_errors: count("SELECT COUNT(*) FROM documents WHERE error IS NOT NULL")?,
        stores: count("SELECT COUNT(*) FROM stores")?,
        coords: count("SELECT COUNT(*) FROM coords")?,
    })
}
