use std::sync::LazyLock;

use regex::Regex;

static TBODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<tbody[^>]*>(.*?)</tbody>").unwrap());
static TR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<tr[^>]*>(.*?)</tr>").unwrap());
static TD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<td[^>]*>(.*?)</td>").unwrap());

/// One table's header row plus its content rows. Cells are verbatim markup;
/// entity decoding happens at projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFragment {
    pub header_cells: Vec<String>,
    pub content_rows: Vec<Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    #[error("table body has {rows} row(s), need a header row plus at least one content row")]
    TooFewRows { rows: usize },
    #[error("table row has no cells: {row:?}")]
    EmptyRow { row: String },
}

/// Scan `html` for table bodies, yielding one fragment per `<tbody>` block in
/// source order. A fresh call re-scans the input.
pub fn scrape_tables(
    html: &str,
) -> impl Iterator<Item = Result<TableFragment, StructureError>> + '_ {
    TBODY_RE
        .captures_iter(html)
        .map(|caps| parse_body(caps.get(1).map_or("", |m| m.as_str())))
}

fn parse_body(body: &str) -> Result<TableFragment, StructureError> {
    let rows: Vec<&str> = TR_RE
        .captures_iter(body)
        .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
        .collect();

    if rows.len() < 2 {
        return Err(StructureError::TooFewRows { rows: rows.len() });
    }

    let header_cells = cells_of(rows[0]);

    let mut content_rows = Vec::with_capacity(rows.len() - 1);
    for row in &rows[1..] {
        let cells = cells_of(row);
        if cells.is_empty() {
            return Err(StructureError::EmptyRow {
                row: row.to_string(),
            });
        }
        content_rows.push(cells);
    }

    Ok(TableFragment {
        header_cells,
        content_rows,
    })
}

fn cells_of(row: &str) -> Vec<String> {
    TD_RE
        .captures_iter(row)
        .map(|caps| caps.get(1).map_or("", |m| m.as_str()).to_string())
        .collect()
}
