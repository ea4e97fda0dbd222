pub mod fields;
pub mod table;

use anyhow::Result;

use crate::config::Config;
use fields::{AvailStatus, FieldSpec, HeaderMatch};

pub const ADDRESS_FIELD: &str = "address";
pub const AVAIL_FIELD: &str = "availability";

/// A store address with its classified availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub address: String,
    pub status: AvailStatus,
}

/// Extract every store row from one table document: tables → projected
/// rows → classified records.
///
/// Structural problems in the document are fatal; tables whose headers lack
/// the configured columns are skipped with a warning.
pub fn scrape_store_records(html: &str, config: &Config) -> Result<Vec<StoreRecord>> {
    let specs = [
        FieldSpec {
            name: ADDRESS_FIELD,
            matcher: HeaderMatch::Exact(config.address_label.clone()),
        },
        FieldSpec {
            name: AVAIL_FIELD,
            matcher: HeaderMatch::Contains(config.avail_label.clone()),
        },
    ];

    let mut records = Vec::new();
    for fragment in table::scrape_tables(html) {
        let fragment = fragment?;
        for mut row in fields::project(&fragment, &specs) {
            let (Some(address), Some(avail)) = (
                row.fields.remove(ADDRESS_FIELD),
                row.fields.remove(AVAIL_FIELD),
            ) else {
                continue;
            };
            let status = AvailStatus::classify(&avail, &config.avail_phrase, &config.oos_phrase);
            records.push(StoreRecord { address, status });
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_row_end_to_end() {
        let html = "<tbody>\
            <tr><td>地址</td><td>供應情況</td></tr>\
            <tr><td>香港九龍觀塘道1號</td><td>尚有供應</td></tr>\
            </tbody>";
        let records = scrape_store_records(html, &Config::default()).unwrap();
        assert_eq!(
            records,
            vec![StoreRecord {
                address: "香港九龍觀塘道1號".to_string(),
                status: AvailStatus::Available,
            }]
        );
    }

    #[test]
    fn header_without_address_label_yields_nothing() {
        let html = "<tbody>\
            <tr><td>分店</td><td>供應情況</td></tr>\
            <tr><td>旺角</td><td>尚有供應</td></tr>\
            </tbody>";
        let records = scrape_store_records(html, &Config::default()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn structural_error_is_fatal_for_the_document() {
        let html = "<tbody><tr><td>地址</td></tr></tbody>";
        assert!(scrape_store_records(html, &Config::default()).is_err());
    }

    #[test]
    fn multiple_tables_accumulate() {
        let html = "<tbody>\
            <tr><td>地址</td><td>供應情況</td></tr>\
            <tr><td>香港島皇后大道中9號</td><td>暫時缺貨</td></tr>\
            </tbody>\
            <tbody>\
            <tr><td>地址</td><td>供應情況</td></tr>\
            <tr><td>香港新界沙田正街18號</td><td>其他</td></tr>\
            </tbody>";
        let records = scrape_store_records(html, &Config::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, AvailStatus::OutOfStock);
        assert_eq!(records[1].status, AvailStatus::NotAvailable);
    }

    #[test]
    fn fixture_document() {
        let html = std::fs::read_to_string("tests/fixtures/supply_table.html").unwrap();
        let records = scrape_store_records(&html, &Config::default()).unwrap();
        assert_eq!(records.len(), 4);
        assert!(records
            .iter()
            .any(|r| r.address == "香港九龍觀塘觀塘道418號創紀之城5期" && r.status == AvailStatus::Available));
        assert!(records
            .iter()
            .any(|r| r.status == AvailStatus::OutOfStock));
    }
}
