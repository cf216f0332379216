//! Monthly `(date, class, net_jobs)` panel: validation, CSV I/O and aggregation.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::{Scope, Stage};
use crate::types::{MonthlyRecord, MonthlySeries, PanelRow, first_of_month, truncate_to_month};
use crate::{Error, Result};

fn reader_scope() -> Scope {
    Scope::stage(Stage::PanelReader)
}

/// Validated employment panel, sorted by `(class, date)`.
///
/// Invariants: non-empty class labels, first-of-month dates, exactly one row per
/// `(date, class)`. Months may be missing for a class.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    rows: Vec<PanelRow>,
}

#[derive(Debug, Deserialize)]
struct CsvPanelRow {
    date: String,
    class: String,
    net_jobs: String,
}

impl Panel {
    /// Validate and sort `rows`.
    pub fn new(mut rows: Vec<PanelRow>) -> Result<Self> {
        for row in &rows {
            if row.class.trim().is_empty() {
                return Err(Error::malformed_panel(
                    reader_scope(),
                    format!("row dated {} has an empty class label", row.date),
                ));
            }
            if row.date.day() != 1 {
                return Err(Error::malformed_panel(
                    Scope::class(Stage::PanelReader, row.class.clone()),
                    format!("date {} is not first-of-month", row.date),
                ));
            }
        }

        rows.sort_by(|a, b| a.class.cmp(&b.class).then(a.date.cmp(&b.date)));
        for pair in rows.windows(2) {
            if pair[0].class == pair[1].class && pair[0].date == pair[1].date {
                return Err(Error::malformed_panel(
                    Scope::class(Stage::PanelReader, pair[0].class.clone()),
                    format!("duplicate (date, class) pair for {}", pair[0].date),
                ));
            }
        }
        Ok(Self { rows })
    }

    /// Sum raw monthly records into one row per `(date, class)`.
    ///
    /// Each record's date is built explicitly as the first of `(year, month)`.
    pub fn from_monthly_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = MonthlyRecord>,
    {
        let mut cells: BTreeMap<(String, NaiveDate), i64> = BTreeMap::new();
        for rec in records {
            let date = first_of_month(rec.year, rec.month).map_err(|_| {
                Error::malformed_panel(
                    Scope::class(Stage::PanelReader, rec.class.clone()),
                    format!("invalid year/month {}-{}", rec.year, rec.month),
                )
            })?;
            let cell = cells.entry((rec.class.clone(), date)).or_insert(0);
            *cell = cell.checked_add(rec.net_jobs).ok_or_else(|| {
                Error::malformed_panel(
                    Scope::class(Stage::PanelReader, rec.class.clone()),
                    format!("net_jobs sum overflows for {}", date.format("%Y-%m")),
                )
            })?;
        }
        let rows = cells
            .into_iter()
            .map(|((class, date), net_jobs)| PanelRow { date, class, net_jobs })
            .collect();
        Self::new(rows)
    }

    /// Read a `date,class,net_jobs` CSV.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut rows = Vec::new();
        for (i, result) in rdr.deserialize::<CsvPanelRow>().enumerate() {
            let line = i + 2;
            let raw = result.map_err(|e| {
                Error::malformed_panel(reader_scope(), format!("line {line}: {e}"))
            })?;
            let date = parse_panel_date(&raw.date).ok_or_else(|| {
                Error::malformed_panel(
                    reader_scope(),
                    format!("line {line}: unparseable date '{}'", raw.date),
                )
            })?;
            let net_jobs = parse_net_jobs(&raw.net_jobs).ok_or_else(|| {
                Error::malformed_panel(
                    reader_scope(),
                    format!("line {line}: net_jobs '{}' is not an integer", raw.net_jobs),
                )
            })?;
            rows.push(PanelRow { date, class: raw.class, net_jobs });
        }
        Self::new(rows)
    }

    /// Read a panel CSV from disk.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    /// Read raw `year,month,class,net_jobs` records and aggregate them.
    pub fn from_records_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();
        for (i, result) in rdr.deserialize::<MonthlyRecord>().enumerate() {
            let rec = result.map_err(|e| {
                Error::malformed_panel(reader_scope(), format!("line {}: {e}", i + 2))
            })?;
            records.push(rec);
        }
        Self::from_monthly_records(records)
    }

    /// Read and aggregate a raw records CSV from disk.
    pub fn from_records_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_records_csv_reader(std::io::BufReader::new(file))
    }

    /// Write the panel as `date,class,net_jobs` CSV, ordered by `(date, class)`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(["date", "class", "net_jobs"])?;
        let mut ordered: Vec<&PanelRow> = self.rows.iter().collect();
        ordered.sort_by(|a, b| a.date.cmp(&b.date).then(a.class.cmp(&b.class)));
        for row in ordered {
            wtr.write_record([
                row.date.format("%Y-%m-%d").to_string(),
                row.class.clone(),
                row.net_jobs.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Rows sorted by `(class, date)`.
    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the panel has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct class labels, sorted.
    pub fn classes(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.rows.iter().map(|r| r.class.as_str()).collect();
        set.into_iter().collect()
    }

    /// Earliest date across all classes.
    pub fn min_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).min()
    }

    /// Latest date across all classes.
    pub fn max_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|r| r.date).max()
    }

    /// One `net_jobs` series per class.
    pub fn series_by_class(&self) -> BTreeMap<String, MonthlySeries> {
        let mut grouped: BTreeMap<String, (Vec<NaiveDate>, Vec<f64>)> = BTreeMap::new();
        for row in &self.rows {
            let entry = grouped.entry(row.class.clone()).or_default();
            entry.0.push(row.date);
            entry.1.push(row.net_jobs as f64);
        }
        grouped
            .into_iter()
            .filter_map(|(class, (dates, values))| {
                // Rows are sorted and unique per class, so construction cannot fail.
                MonthlySeries::new(dates, values).ok().map(|s| (class, s))
            })
            .collect()
    }
}

/// Parse an ISO-like date at month granularity, truncating to the first of the month.
pub fn parse_panel_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(truncate_to_month(d));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(truncate_to_month(dt.date()));
        }
    }
    let (y, m) = s.split_once('-')?;
    first_of_month(y.parse().ok()?, m.parse().ok()?).ok()
}

/// 2⁶³: floats in `[-2⁶³, 2⁶³)` convert to `i64` exactly.
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

fn parse_net_jobs(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    // pandas writes integer columns that once held NaN as "12.0".
    let v: f64 = s.parse().ok()?;
    let in_range = (-I64_BOUND..I64_BOUND).contains(&v);
    (in_range && v.fract() == 0.0).then_some(v as i64)
}
