use crate::models::{CodeError, TickerCode, TickerRecord};
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

// ── Listing page ──────────────────────────────────────────────────────────────

/// Why a `<tr>` of the listing table produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowSkip {
    #[error("row has no <td> cells")]
    NoCells,
    #[error("row has no name cell")]
    MissingName,
    #[error("row has no code link")]
    MissingCode,
    #[error(transparent)]
    InvalidCode(#[from] CodeError),
    #[error("{0} column not found")]
    MissingField(&'static str),
}

#[derive(Debug, Default)]
pub struct ListingPage {
    pub records: Vec<TickerRecord>,
    pub skipped: Vec<RowSkip>,
}

struct Selectors {
    table: Selector,
    header_cells: Selector,
    body_rows: Selector,
    td: Selector,
    any_cell: Selector,
    name: Selector,
    code: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        Ok(Self {
            table: sel("table.stock_table")?,
            header_cells: sel("thead tr:first-child th, thead tr:first-child td")?,
            body_rows: sel("tbody tr")?,
            td: sel("td")?,
            any_cell: sel("th, td")?,
            name: sel("th.tal")?,
            code: sel("td.tac a")?,
        })
    }
}

fn sel(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("selector {:?}: {:?}", s, e))
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Where a field lives inside a body row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    /// Index into all `th`/`td` cells, taken from the header row.
    Header(usize),
    /// Index into `td` cells counted from the front.
    Td(usize),
    /// Index into `td` cells counted from the back (1 = last).
    TdFromEnd(usize),
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    market: Column,
    per: Column,
    pbr: Column,
    header_width: Option<usize>,
}

impl ColumnMap {
    /// kabutan layout: market is the 2nd `td`, PER/PBR sit just before the
    /// trailing yield column.
    const POSITIONAL: ColumnMap = ColumnMap {
        market: Column::Td(1),
        per: Column::TdFromEnd(3),
        pbr: Column::TdFromEnd(2),
        header_width: None,
    };

    fn from_headers(headers: &[String]) -> Self {
        let find = |label: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(label))
                .map(Column::Header)
        };

        match (find("市場"), find("PER"), find("PBR")) {
            (Some(market), Some(per), Some(pbr)) => ColumnMap {
                market,
                per,
                pbr,
                header_width: Some(headers.len()),
            },
            _ => Self::POSITIONAL,
        }
    }

    /// Header indices only apply when the row lines up with the header
    /// cell-for-cell (no colspans, no extra cells).
    fn for_row(&self, row_width: usize) -> ColumnMap {
        match self.header_width {
            Some(w) if w == row_width => *self,
            _ => Self::POSITIONAL,
        }
    }
}

struct Row {
    cells: Vec<String>,
    tds: Vec<String>,
}

impl Row {
    fn get(&self, col: Column) -> Option<&str> {
        let cell = match col {
            Column::Header(i) => self.cells.get(i),
            Column::Td(i) => self.tds.get(i),
            Column::TdFromEnd(n) => self
                .tds
                .len()
                .checked_sub(n)
                .and_then(|i| self.tds.get(i)),
        };
        cell.map(String::as_str)
    }
}

/// Parse one page of the 52-week-high listing.
///
/// A record is emitted iff the row has `td` cells, a `th.tal` name cell and a
/// `td.tac a` code link whose text is a 4-digit code. Everything else lands in
/// `skipped`.
pub fn parse_listing_page(html: &str) -> Result<ListingPage> {
    let doc = Html::parse_document(html);
    let s = Selectors::new()?;
    let mut page = ListingPage::default();

    for table in doc.select(&s.table) {
        let headers: Vec<String> = table.select(&s.header_cells).map(text_of).collect();
        let columns = ColumnMap::from_headers(&headers);

        for tr in table.select(&s.body_rows) {
            match parse_listing_row(tr, &s, &columns) {
                Ok(record) => page.records.push(record),
                Err(skip) => page.skipped.push(skip),
            }
        }
    }

    Ok(page)
}

fn parse_listing_row(
    tr: ElementRef<'_>,
    s: &Selectors,
    columns: &ColumnMap,
) -> Result<TickerRecord, RowSkip> {
    let tds: Vec<String> = tr.select(&s.td).map(text_of).collect();
    if tds.is_empty() {
        return Err(RowSkip::NoCells);
    }

    let name = tr.select(&s.name).next().map(text_of).ok_or(RowSkip::MissingName)?;
    let code_text = tr.select(&s.code).next().map(text_of).ok_or(RowSkip::MissingCode)?;
    let code = TickerCode::parse(&code_text)?;

    let row = Row {
        cells: tr.select(&s.any_cell).map(text_of).collect(),
        tds,
    };
    let columns = columns.for_row(row.cells.len());
    let field = |col: Column, label: &'static str| {
        row.get(col)
            .map(str::to_string)
            .ok_or(RowSkip::MissingField(label))
    };

    Ok(TickerRecord {
        code,
        name,
        market: field(columns.market, "market")?,
        per: field(columns.per, "PER")?,
        pbr: field(columns.pbr, "PBR")?,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
