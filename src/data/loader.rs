//! CSV loading for feature tables and regime tables.
//!
//! Feature files carry a `timestamp` column (RFC 3339 or integer epoch
//! seconds), the target column, and every other column as a feature.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use csv::{ReaderBuilder, Writer};
use ndarray::Array2;
use std::path::Path;
use tracing::info;

use super::regime::RegimeFeatures;
use crate::types::Dataset;

const TIMESTAMP_COLUMN: &str = "timestamp";
const ROW_INDEX_COLUMN: &str = "row_index";

pub fn load_dataset<P: AsRef<Path>>(path: P, target_column: &str) -> Result<Dataset> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open data file: {:?}", path))?;

    let headers = reader.headers()?.clone();
    let ts_idx = column_index(&headers, TIMESTAMP_COLUMN)?;
    let target_idx = column_index(&headers, target_column)?;
    let feature_idx: Vec<usize> = (0..headers.len())
        .filter(|&i| i != ts_idx && i != target_idx)
        .collect();
    if feature_idx.is_empty() {
        return Err(anyhow!("{:?} has no feature columns", path));
    }
    let feature_names: Vec<String> = feature_idx.iter().map(|&i| headers[i].to_string()).collect();

    let mut timestamps = Vec::new();
    let mut targets = Vec::new();
    let mut values = Vec::new();

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {}", line + 1))?;
        timestamps.push(parse_timestamp(&record[ts_idx]).with_context(|| format!("Row {}", line + 1))?);
        targets.push(parse_f64(&record[target_idx], target_column, line)?);
        for &i in &feature_idx {
            values.push(parse_f64(&record[i], &headers[i], line)?);
        }
    }

    let features = Array2::from_shape_vec((timestamps.len(), feature_names.len()), values)?;
    let dataset = Dataset::new(timestamps, feature_names, features, targets)?;
    info!(
        "Loaded {} rows x {} features from {:?} ({:.1}% positive)",
        dataset.len(),
        dataset.n_features(),
        path,
        dataset.positive_rate() * 100.0
    );
    Ok(dataset)
}

/// Regime table: a `row_index` column plus one column per regime feature
pub fn load_regime<P: AsRef<Path>>(path: P) -> Result<RegimeFeatures> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open regime file: {:?}", path))?;

    let headers = reader.headers()?.clone();
    let idx_col = column_index(&headers, ROW_INDEX_COLUMN)?;
    let value_cols: Vec<usize> = (0..headers.len()).filter(|&i| i != idx_col).collect();
    let names: Vec<String> = value_cols.iter().map(|&i| headers[i].to_string()).collect();

    let mut row_index = Vec::new();
    let mut values = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read regime row {}", line + 1))?;
        let idx: usize = record[idx_col]
            .parse()
            .with_context(|| format!("Invalid row_index '{}' on line {}", &record[idx_col], line + 1))?;
        row_index.push(idx);
        for &i in &value_cols {
            values.push(parse_f64(&record[i], &headers[i], line)?);
        }
    }

    let values = Array2::from_shape_vec((row_index.len(), names.len()), values)?;
    info!("Loaded regime table: {} rows, columns {:?}", row_index.len(), names);
    Ok(RegimeFeatures {
        row_index,
        names,
        values,
    })
}

/// Write a dataset in the layout `load_dataset` reads, with RFC 3339 timestamps
pub fn write_dataset<P: AsRef<Path>>(path: P, dataset: &Dataset, target_column: &str) -> Result<()> {
    let path = path.as_ref();
    let mut writer = Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;

    let mut header = vec![TIMESTAMP_COLUMN.to_string()];
    header.extend(dataset.feature_names().iter().cloned());
    header.push(target_column.to_string());
    writer.write_record(&header)?;

    let features = dataset.features();
    for (i, ts) in dataset.timestamps().iter().enumerate() {
        let mut record = Vec::with_capacity(header.len());
        record.push(ts.to_rfc3339());
        record.extend(features.row(i).iter().map(|v| v.to_string()));
        record.push(dataset.targets()[i].to_string());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    info!("Wrote {} rows to {:?}", dataset.len(), path);
    Ok(())
}

pub fn write_regime<P: AsRef<Path>>(path: P, regime: &RegimeFeatures) -> Result<()> {
    let path = path.as_ref();
    let mut writer = Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut header = vec![ROW_INDEX_COLUMN.to_string()];
    header.extend(regime.names.iter().cloned());
    writer.write_record(&header)?;
    for (i, row) in regime.row_index.iter().enumerate() {
        let mut record = vec![row.to_string()];
        record.extend(regime.values.row(i).iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| anyhow!("Missing required column '{}'", name))
}

fn parse_f64(raw: &str, column: &str, line: usize) -> Result<f64> {
    raw.parse::<f64>()
        .with_context(|| format!("Invalid number '{}' in column '{}' on row {}", raw, column, line + 1))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| anyhow!("Epoch seconds out of range: {}", secs));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}'", raw))
}
