use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::geo::GeoCoordinate;

/// On-disk envelope for the artifacts the map frontend consumes.
#[derive(Serialize)]
struct Artifact<T: Serialize> {
    generated_at: DateTime<Utc>,
    data: T,
}

pub fn write_artifact<T: Serialize>(dir: &Path, name: &str, data: T) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(name);
    let artifact = Artifact {
        generated_at: Utc::now(),
        data,
    };
    let json = serde_json::to_string_pretty(&artifact)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Coordinate map in the `{address: [lng, lat]}` shape the frontend reads.
pub fn coord_lookup(rows: &[(String, GeoCoordinate)]) -> BTreeMap<String, [f64; 2]> {
    rows.iter()
        .map(|(address, coord)| (address.clone(), [coord.lng, coord.lat]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coord_lookup_shape() {
        let rows = vec![(
            "香港九龍觀塘道1號".to_string(),
            GeoCoordinate {
                lng: 114.2254,
                lat: 22.3119,
            },
        )];
        let lookup = coord_lookup(&rows);
        assert_eq!(
            serde_json::to_value(&lookup).unwrap(),
            json!({ "香港九龍觀塘道1號": [114.2254, 22.3119] })
        );
    }
}
