use crate::data::{Column, Table};
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, warn};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(anyhow::anyhow!("Cannot determine format of gzipped file {:?}", path))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(anyhow::anyhow!("Unsupported file format: {:?}", path)),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Table loader configuration
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Whether file has header
    pub has_header: bool,
    /// Maximum number of rows to load (0 = unlimited)
    pub max_rows: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            has_header: true,
            max_rows: 0,
        }
    }
}

/// Reads delimited files into column-oriented tables.
///
/// A column becomes numeric when every value parses as a number, otherwise it
/// is kept as text.
pub struct TableLoader {
    config: LoaderConfig,
}

impl TableLoader {
    /// Create new loader with default config
    pub fn new() -> Self {
        Self {
            config: LoaderConfig::default(),
        }
    }

    /// Create new loader with custom config
    pub fn with_config(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Load a table from file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Table> {
        let path = path.as_ref();
        info!("Loading table from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let table = if format.is_gzipped() {
            self.parse_table(BufReader::new(GzDecoder::new(file)), format)?
        } else {
            self.parse_table(BufReader::new(file), format)?
        };

        info!(
            "Loaded {} rows x {} columns from {:?}",
            table.num_rows(),
            table.num_columns(),
            path
        );
        Ok(table)
    }

    /// Parse a table from any reader
    pub fn parse_table<R: Read>(&self, reader: R, format: FileFormat) -> Result<Table> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(self.config.has_header)
            .from_reader(reader);

        let mut headers = if self.config.has_header {
            csv_reader
                .headers()?
                .iter()
                .map(|s| s.trim().to_string())
                .collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (row, result) in csv_reader.records().enumerate() {
            if self.config.max_rows > 0 && row >= self.config.max_rows {
                warn!("Reached maximum row limit: {}", self.config.max_rows);
                break;
            }
            let record = result.with_context(|| format!("Failed to parse record {}", row + 1))?;

            if headers.is_empty() {
                headers = (0..record.len()).map(|i| i.to_string()).collect();
                raw = vec![Vec::new(); headers.len()];
            }
            if record.len() != headers.len() {
                anyhow::bail!(
                    "Record {} has {} fields, expected {}",
                    row + 1,
                    record.len(),
                    headers.len()
                );
            }
            for (values, field) in raw.iter_mut().zip(record.iter()) {
                values.push(field.trim().to_string());
            }
        }

        let mut table = Table::new();
        for (name, values) in headers.into_iter().zip(raw) {
            table.push_column(infer_column(name, values))?;
        }
        Ok(table)
    }
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn infer_column(name: String, values: Vec<String>) -> Column {
    let parsed: Option<Vec<f64>> = values.iter().map(|v| v.parse::<f64>().ok()).collect();
    match parsed {
        Some(numbers) if !values.is_empty() => Column::numeric(name, numbers),
        _ => {
            debug!("Column {} kept as text", name);
            Column::text(name, values)
        }
    }
}

/// Load a label file: the first column of a headed table, as `f32`
pub fn load_labels<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let table = TableLoader::new().load(path)?;
    let column = table
        .columns()
        .first()
        .with_context(|| format!("Label file {:?} has no columns", path))?;
    let labels = column
        .to_f32()
        .with_context(|| format!("Labels in {:?} must be numeric", path))?;
    info!("Loaded {} labels from {:?}", labels.len(), path);
    Ok(labels)
}
