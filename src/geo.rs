use std::collections::HashMap;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::Config;

/// A resolved store coordinate, `lng` before `lat` as the lookup endpoint
/// returns them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("lookup response for {address:?} has no `restaurants` array: {body}")]
    MissingRestaurants { address: String, body: String },
    #[error("lookup for {address:?} returned no candidates")]
    NoCandidates { address: String },
    #[error("nearest candidate for {address:?} lacks numeric lng/lat: {candidate}")]
    BadCandidate { address: String, candidate: String },
}

/// Resolve every address to a coordinate, `lookup_chunk_size` at a time with
/// a fixed pause between batches to stay under the endpoint's rate limits.
///
/// Lookups within a batch run concurrently and write disjoint keys; the map
/// is merged after each batch joins. Any single failure aborts the whole
/// run -- a partial coordinate map is never returned.
pub async fn geocode_addresses(
    client: &Client,
    config: &Config,
    addresses: &[String],
) -> Result<HashMap<String, GeoCoordinate>> {
    let pb = ProgressBar::new(addresses.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let mut coords = HashMap::with_capacity(addresses.len());

    for (batch, chunk) in addresses.chunks(config.lookup_chunk_size).enumerate() {
        if batch > 0 {
            tokio::time::sleep(config.lookup_pace).await;
        }
        debug!("looking up batch {} ({} addresses)", batch, chunk.len());

        let handles: Vec<_> = chunk
            .iter()
            .map(|address| {
                let client = client.clone();
                let endpoint = config.lookup_endpoint.clone();
                let address = address.clone();
                tokio::spawn(async move {
                    let coord = lookup_address(&client, &endpoint, &address).await?;
                    anyhow::Ok((address, coord))
                })
            })
            .collect();

        for handle in handles {
            let (address, coord) = handle.await??;
            coords.insert(address, coord);
            pb.inc(1);
        }
    }

    pb.finish_and_clear();
    info!("Resolved {} coordinates", coords.len());

    Ok(coords)
}

async fn lookup_address(client: &Client, endpoint: &str, address: &str) -> Result<GeoCoordinate> {
    let body: Value = client
        .post(endpoint)
        .form(&[("type", "location"), ("location", address)])
        .send()
        .await
        .with_context(|| format!("lookup request failed for {address:?}"))?
        .json()
        .await
        .with_context(|| format!("lookup response for {address:?} is not JSON"))?;

    Ok(parse_lookup_response(address, &body)?)
}

/// Pick the nearest candidate out of a lookup response and read its
/// coordinate, validating the response shape along the way.
fn parse_lookup_response(address: &str, body: &Value) -> Result<GeoCoordinate, FormatError> {
    let restaurants = body
        .get("restaurants")
        .and_then(Value::as_array)
        .ok_or_else(|| FormatError::MissingRestaurants {
            address: address.to_string(),
            body: body.to_string(),
        })?;

    let candidate = nearest_candidate(restaurants).ok_or_else(|| FormatError::NoCandidates {
        address: address.to_string(),
    })?;

    coordinate_of(candidate).ok_or_else(|| FormatError::BadCandidate {
        address: address.to_string(),
        candidate: candidate.to_string(),
    })
}

/// First candidate with the smallest `distance`; a missing distance counts
/// as infinitely far.
fn nearest_candidate(candidates: &[Value]) -> Option<&Value> {
    candidates
        .iter()
        .reduce(|best, c| if distance_of(c) < distance_of(best) { c } else { best })
}

fn distance_of(candidate: &Value) -> f64 {
    candidate
        .get("distance")
        .and_then(Value::as_f64)
        .unwrap_or(f64::INFINITY)
}

fn coordinate_of(candidate: &Value) -> Option<GeoCoordinate> {
    let lng = candidate.get("lng").and_then(Value::as_f64)?;
    let lat = candidate.get("lat").and_then(Value::as_f64)?;
    Some(GeoCoordinate { lng, lat })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nearest_ignores_missing_distance() {
        let body = json!({
            "restaurants": [
                { "distance": 5.0, "lng": 114.1, "lat": 22.3 },
                { "distance": 2.0, "lng": 114.2, "lat": 22.4 },
                { "lng": 114.3, "lat": 22.5 },
            ]
        });
        let coord = parse_lookup_response("addr", &body).unwrap();
        assert_eq!(coord, GeoCoordinate { lng: 114.2, lat: 22.4 });
    }

    #[test]
    fn first_of_tied_candidates_wins() {
        let body = json!({
            "restaurants": [
                { "distance": 1.0, "lng": 114.1, "lat": 22.3 },
                { "distance": 1.0, "lng": 114.9, "lat": 22.9 },
            ]
        });
        let coord = parse_lookup_response("addr", &body).unwrap();
        assert_eq!(coord.lng, 114.1);
    }

    #[test]
    fn missing_restaurants_is_a_format_error() {
        let body = json!({ "stores": [] });
        assert!(matches!(
            parse_lookup_response("addr", &body),
            Err(FormatError::MissingRestaurants { ref address, .. }) if address == "addr"
        ));
    }

    #[test]
    fn empty_candidate_list_is_a_format_error() {
        let body = json!({ "restaurants": [] });
        assert!(matches!(
            parse_lookup_response("addr", &body),
            Err(FormatError::NoCandidates { .. })
        ));
    }

    #[test]
    fn non_numeric_coordinate_is_a_format_error() {
        let body = json!({
            "restaurants": [{ "distance": 1.0, "lng": "114.1", "lat": 22.3 }]
        });
        assert!(matches!(
            parse_lookup_response("addr", &body),
            Err(FormatError::BadCandidate { .. })
        ));
    }

    #[test]
    fn missing_lat_is_a_format_error() {
        let body = json!({
            "restaurants": [{ "lng": 114.1 }]
        });
        assert!(matches!(
            parse_lookup_response("addr", &body),
            Err(FormatError::BadCandidate { .. })
        ));
    }

    #[test]
    fn batch_partition_is_ceiling_division() {
        let config = Config::default();
        let addresses: Vec<String> = (0..45).map(|i| format!("address {i}")).collect();
        let chunks: Vec<_> = addresses.chunks(config.lookup_chunk_size).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 20);
        assert_eq!(chunks[2].len(), 5);
    }
}
