//! Opening-code (ECO) reference table.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

const CODE_COLUMN: &str = "ECO";
const DESCRIPTION_COLUMN: &str = "Desc";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EcoCatalog {
    descriptions: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum EcoError {
    #[error("failed to open ECO file {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("ECO table is missing required column {0}")]
    MissingColumn(&'static str),
}

impl EcoCatalog {
    pub fn from_path(path: &Path) -> Result<Self, EcoError> {
        let file = fs::File::open(path).map_err(|source| EcoError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_reader(file)?;

        info!(
            component = "eco",
            event = "eco.catalog.loaded",
            path = %path.display(),
            codes = catalog.len()
        );

        Ok(catalog)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, EcoError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = csv_reader.headers()?.clone();
        let code_idx = column_index(&headers, CODE_COLUMN)?;
        let desc_idx = column_index(&headers, DESCRIPTION_COLUMN)?;

        let mut descriptions = HashMap::new();
        for record in csv_reader.records() {
            let record = record?;
            let (Some(code), Some(desc)) = (record.get(code_idx), record.get(desc_idx)) else {
                continue;
            };
            descriptions
                .entry(code.to_string())
                .or_insert_with(|| desc.to_string());
        }

        Ok(Self { descriptions })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut descriptions = HashMap::new();
        for (code, desc) in pairs {
            descriptions.entry(code.into()).or_insert_with(|| desc.into());
        }
        Self { descriptions }
    }

    pub fn describe(&self, code: &str) -> Option<&str> {
        self.descriptions.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}

fn column_index(headers: &csv::StringRecord, name: &'static str) -> Result<usize, EcoError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or(EcoError::MissingColumn(name))
}
