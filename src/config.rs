use std::time::Duration;

/// Runtime configuration for the scrape/geocode pipeline.
///
/// Built once in the driver and passed by reference; tests substitute their
/// own endpoints and labels.
#[derive(Debug, Clone)]
pub struct Config {
    /// Campaign pages that embed the availability table documents.
    pub seed_urls: Vec<String>,
    /// Restaurant location-search endpoint (form POST).
    pub lookup_endpoint: String,
    /// Header label of the store-address column, matched exactly.
    pub address_label: String,
    /// Header label of the availability column, matched by containment --
    /// the live documents vary the text around it.
    pub avail_label: String,
    /// Cell phrase marking a store as in stock.
    pub avail_phrase: String,
    /// Cell phrase marking a store as out of stock.
    pub oos_phrase: String,
    /// Addresses geocoded per paced batch.
    pub lookup_chunk_size: usize,
    /// Pause between consecutive lookup batches.
    pub lookup_pace: Duration,
    /// Hard timeout for any single HTTP request.
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed_urls: vec![
                "https://www.mcdonalds.com.hk/ch/whats-new/mcgriddles-supply.html".to_string(),
            ],
            lookup_endpoint: "https://www.mcdonalds.com.hk/api/restaurant/search".to_string(),
            address_label: "地址".to_string(),
            avail_label: "供應情況".to_string(),
            avail_phrase: "尚有供應".to_string(),
            oos_phrase: "暫時缺貨".to_string(),
            lookup_chunk_size: 20,
            lookup_pace: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}
