//! Dated CSV output.
//!
//! The file is UTF-8 with a byte-order mark so Excel opens the Japanese
//! columns correctly. A missing rating is an empty field.

use crate::models::RatedTicker;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub const COLUMNS: [&str; 6] = ["code", "name", "market", "PER", "PBR", "performance_rating"];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// `<prefix>_<YYYYMMDD>.csv`
pub fn output_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", prefix, date.format("%Y%m%d"))
}

/// Serialize `records` as CSV: header plus one line per record.
pub fn write_records<W: Write>(out: W, records: &[RatedTicker]) -> Result<W> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(COLUMNS)?;

    for r in records {
        let t = &r.record;
        wtr.write_record([
            t.code.as_str(),
            &t.name,
            &t.market,
            &t.per,
            &t.pbr,
            r.performance_rating.as_deref().unwrap_or(""),
        ])?;
    }

    wtr.into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV writer: {}", e.error()))
}

/// Write the enriched table to `<dir>/<prefix>_<YYYYMMDD>.csv`, creating `dir`
/// if needed. Returns the path written.
pub fn write_csv(
    dir: &Path,
    prefix: &str,
    date: NaiveDate,
    records: &[RatedTicker],
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output dir {}", dir.display()))?;

    let path = dir.join(output_file_name(prefix, date));
    let file = File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut buf = BufWriter::new(file);
    buf.write_all(UTF8_BOM)
        .with_context(|| format!("failed to write {}", path.display()))?;

    let mut buf = write_records(buf, records)
        .with_context(|| format!("failed to write {}", path.display()))?;
    buf.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    info!("Saved {} records to {}", records.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TickerCode, TickerRecord};

    fn rated(code: &str, name: &str, rating: Option<&str>) -> RatedTicker {
        RatedTicker::new(
            TickerRecord {
                code: TickerCode::parse(code).unwrap(),
                name: name.to_string(),
                market: "東Ｐ".to_string(),
                per: "15.2".to_string(),
                pbr: "1.30".to_string(),
            },
            rating.map(String::from),
        )
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 5).unwrap()
    }

    #[test]
    fn test_file_name_uses_compact_date() {
        assert_eq!(output_file_name("kabutan_52w", day()), "kabutan_52w_20260205.csv");
    }

    #[test]
    fn test_three_records_make_four_lines() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            rated("7203", "トヨタ自動車", Some("A")),
            rated("6758", "ソニーグループ", None),
            rated("1301", "極洋, 株式会社", Some("やや良い")),
        ];

        let path = write_csv(dir.path(), "kabutan_52w", day(), &records).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("kabutan_52w_20260205.csv")
        );

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));

        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "code,name,market,PER,PBR,performance_rating");
        assert_eq!(lines[1], "7203,トヨタ自動車,東Ｐ,15.2,1.30,A");
        assert_eq!(lines[2], "6758,ソニーグループ,東Ｐ,15.2,1.30,");
        assert_eq!(lines[3], "1301,\"極洋, 株式会社\",東Ｐ,15.2,1.30,やや良い");
    }

    #[test]
    fn test_empty_table_is_header_only() {
        let out = write_records(Vec::<u8>::new(), &[]).unwrap();
        assert_eq!(out, b"code,name,market,PER,PBR,performance_rating\n");
    }

    #[test]
    fn test_creates_missing_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("out").join("daily");

        let path = write_csv(&nested, "kabutan_52w", day(), &[rated("7203", "x", None)]).unwrap();

        assert!(path.starts_with(&nested));
        assert!(path.exists());
    }
}
