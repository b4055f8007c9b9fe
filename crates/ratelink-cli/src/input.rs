//! Load the business dataset from CSV.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, bail};
use rand::Rng;
use rand::seq::SliceRandom;
use ratelink_core::InputRecord;

/// Header names of the four columns the crawl needs.
#[derive(Debug, Clone)]
pub struct Columns {
    pub id: String,
    pub name: String,
    pub address: String,
    pub postcode: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub rows: usize,
    /// Rows with an empty id, name, address or postcode.
    pub incomplete: usize,
    pub duplicates: usize,
}

fn column_index(headers: &csv::StringRecord, column: &str) -> anyhow::Result<usize> {
    match headers.iter().position(|h| h.trim() == column) {
        Some(idx) => Ok(idx),
        None => bail!("input has no column named {column:?}"),
    }
}

/// Read records from CSV. Rows missing any selected field are dropped, as
/// are rows repeating an earlier ID.
pub fn read_records<R: Read>(
    reader: R,
    columns: &Columns,
) -> anyhow::Result<(Vec<InputRecord>, LoadStats)> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("reading CSV header")?.clone();
    let idx = [
        column_index(&headers, &columns.id)?,
        column_index(&headers, &columns.name)?,
        column_index(&headers, &columns.address)?,
        column_index(&headers, &columns.postcode)?,
    ];

    let mut stats = LoadStats::default();
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for row in rdr.records() {
        let row = row.context("reading CSV row")?;
        stats.rows += 1;

        let fields: Vec<&str> = idx.iter().map(|&i| row.get(i).unwrap_or("").trim()).collect();
        if fields.iter().any(|f| f.is_empty()) {
            stats.incomplete += 1;
            continue;
        }
        if !seen.insert(fields[0].to_string()) {
            stats.duplicates += 1;
            continue;
        }
        records.push(InputRecord::new(fields[0], fields[1], fields[2], fields[3]));
    }

    Ok((records, stats))
}

/// Keep a random sample of `n` records; all of them when `n` is not smaller.
pub fn sample<R: Rng + ?Sized>(
    mut records: Vec<InputRecord>,
    n: usize,
    rng: &mut R,
) -> Vec<InputRecord> {
    if n < records.len() {
        records.shuffle(rng);
        records.truncate(n);
    }
    records
}

/// Load the dataset at `path`, optionally sampling `sample_size` records.
pub fn load_records(
    path: &Path,
    columns: &Columns,
    sample_size: Option<usize>,
) -> anyhow::Result<Vec<InputRecord>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let (records, stats) =
        read_records(file, columns).with_context(|| format!("reading {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        rows = stats.rows,
        incomplete = stats.incomplete,
        duplicates = stats.duplicates,
        records = records.len(),
        "loaded input"
    );

    Ok(match sample_size {
        Some(n) => {
            let sampled = sample(records, n, &mut rand::thread_rng());
            tracing::info!(sample = sampled.len(), "sampled input");
            sampled
        }
        None => records,
    })
}
