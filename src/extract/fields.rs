use std::collections::BTreeMap;

use serde_json::json;
use tracing::warn;

use super::table::TableFragment;

/// How a field's header cell is matched against its configured label.
#[derive(Debug, Clone)]
pub enum HeaderMatch {
    Exact(String),
    Contains(String),
}

impl HeaderMatch {
    fn matches(&self, decoded_cell: &str) -> bool {
        match self {
            HeaderMatch::Exact(label) => decoded_cell.trim() == label,
            HeaderMatch::Contains(label) => decoded_cell.contains(label.as_str()),
        }
    }
}

/// A named column to project out of a table.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub matcher: HeaderMatch,
}

/// One content row projected into decoded field values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    /// The row's cells as a JSON array string, kept for diagnostics.
    pub raw_row: String,
    pub fields: BTreeMap<&'static str, String>,
}

/// Project a fragment's content rows through the requested columns.
///
/// A header that carries none of a spec's label skips the whole fragment
/// (warn, empty result). A row whose cell is absent or decodes empty is
/// dropped (warn); neither condition is fatal to the run.
pub fn project(fragment: &TableFragment, specs: &[FieldSpec]) -> Vec<FieldRow> {
    let mut columns = Vec::with_capacity(specs.len());
    for spec in specs {
        let pos = fragment
            .header_cells
            .iter()
            .position(|cell| spec.matcher.matches(&decode_entities(cell)));
        match pos {
            Some(pos) => columns.push(pos),
            None => {
                warn!(
                    "cannot find {} column in header row, {}",
                    spec.name,
                    json!({ "header_cells": fragment.header_cells })
                );
                return Vec::new();
            }
        }
    }

    fragment
        .content_rows
        .iter()
        .filter_map(|cells| project_row(cells, specs, &columns))
        .collect()
}

fn project_row(cells: &[String], specs: &[FieldSpec], columns: &[usize]) -> Option<FieldRow> {
    let raw_row = json!(cells).to_string();
    let mut fields = BTreeMap::new();
    for (spec, &pos) in specs.iter().zip(columns) {
        let value = cells.get(pos).map(|cell| clean_cell(cell)).unwrap_or_default();
        if value.is_empty() {
            warn!(
                "cannot obtain {} from table row, {}",
                spec.name,
                json!({ "content_row": cells, "column": pos })
            );
            return None;
        }
        fields.insert(spec.name, value);
    }
    Some(FieldRow { raw_row, fields })
}

/// Decode the entity set the availability documents actually use. `&amp;`
/// goes last so an outer escaping layer cannot double-decode.
pub fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn clean_cell(cell: &str) -> String {
    decode_entities(cell).replace("<br>", "").trim().to_string()
}

/// Store availability as classified from the availability column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailStatus {
    Available,
    OutOfStock,
    NotAvailable,
}

impl AvailStatus {
    /// Ordered containment against the two marker phrases; the in-stock
    /// phrase wins when both appear.
    pub fn classify(text: &str, avail_phrase: &str, oos_phrase: &str) -> Self {
        if text.contains(avail_phrase) {
            AvailStatus::Available
        } else if text.contains(oos_phrase) {
            AvailStatus::OutOfStock
        } else {
            AvailStatus::NotAvailable
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AvailStatus::Available => "AVAILABLE",
            AvailStatus::OutOfStock => "OUT_OF_STOCK",
            AvailStatus::NotAvailable => "NOT_AVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(header: &[&str], rows: &[&[&str]]) -> TableFragment {
        TableFragment {
            header_cells: header.iter().map(|c| c.to_string()).collect(),
            content_rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn specs() -> Vec<FieldSpec> {
        vec![
            FieldSpec {
                name: "address",
                matcher: HeaderMatch::Exact("地址".to_string()),
            },
            FieldSpec {
                name: "availability",
                matcher: HeaderMatch::Contains("供應情況".to_string()),
            },
        ]
    }

    #[test]
    fn projects_named_columns() {
        let f = fragment(
            &["分店", "地址", "供應情況 *"],
            &[&["旺角", "香港九龍旺角道1號", "尚有供應"]],
        );
        let rows = project(&f, &specs());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["address"], "香港九龍旺角道1號");
        assert_eq!(rows[0].fields["availability"], "尚有供應");
    }

    #[test]
    fn decodes_and_strips_markup() {
        let f = fragment(&["地址", "供應情況"], &[&["1&amp;2<br>樓", "尚有供應"]]);
        let rows = project(&f, &specs());
        assert_eq!(rows[0].fields["address"], "1&2樓");
    }

    #[test]
    fn matches_encoded_header() {
        let f = fragment(&["地址&nbsp;", "供應情況"], &[&["a", "b"]]);
        // "地址&nbsp;" decodes to "地址 ", trims to an exact match.
        assert_eq!(project(&f, &specs()).len(), 1);
    }

    #[test]
    fn missing_header_skips_fragment() {
        let f = fragment(&["分店", "供應情況"], &[&["旺角", "尚有供應"]]);
        assert!(project(&f, &specs()).is_empty());
    }

    #[test]
    fn empty_cell_drops_row_only() {
        let f = fragment(
            &["地址", "供應情況"],
            &[&["", "尚有供應"], &["香港九龍觀塘道1號", "尚有供應"]],
        );
        let rows = project(&f, &specs());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields["address"], "香港九龍觀塘道1號");
    }

    #[test]
    fn short_row_drops_row_only() {
        let f = fragment(&["地址", "供應情況"], &[&["只有地址"]]);
        assert!(project(&f, &specs()).is_empty());
    }

    #[test]
    fn projection_is_idempotent() {
        let f = fragment(
            &["地址", "供應情況"],
            &[&["香港九龍觀塘道1號", "尚有供應"], &["香港新界屯門鄉事會路2號", "暫時缺貨"]],
        );
        assert_eq!(project(&f, &specs()), project(&f, &specs()));
    }

    #[test]
    fn decode_handles_amp_last() {
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("a &amp; b &lt;c&gt;"), "a & b <c>");
    }

    #[test]
    fn classify_priority_order() {
        assert_eq!(
            AvailStatus::classify("尚有供應", "尚有供應", "暫時缺貨"),
            AvailStatus::Available
        );
        assert_eq!(
            AvailStatus::classify("暫時缺貨", "尚有供應", "暫時缺貨"),
            AvailStatus::OutOfStock
        );
        assert_eq!(
            AvailStatus::classify("不適用", "尚有供應", "暫時缺貨"),
            AvailStatus::NotAvailable
        );
        // Both phrases present: the in-stock check runs first.
        assert_eq!(
            AvailStatus::classify("尚有供應 (暫時缺貨)", "尚有供應", "暫時缺貨"),
            AvailStatus::Available
        );
    }
}
