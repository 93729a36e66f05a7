//! Immutable item-factor store.
//!
//! Holds the offline-trained item embedding, the identifier/index mapping and
//! the Gram matrix `XᵗX` shared by every preference solve.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;

use faer::{linalg::matmul::matmul, Accum, Mat, MatRef, Par};
use thiserror::Error;

use crate::models::Resolution;

pub mod npy;

pub use npy::NpyError;

/// File name of the item-factor array inside a model directory
pub const FACTORS_FILE: &str = "item_factors.npy";
/// File name of the identifier list inside a model directory
pub const ITEMS_FILE: &str = "items.csv";

/// Errors raised while loading or assembling a [`FactorStore`]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid factor array {path}: {source}")]
    Array {
        path: PathBuf,
        #[source]
        source: NpyError,
    },

    #[error("factor array has {rows} rows but {identifiers} identifiers were listed")]
    CountMismatch { rows: usize, identifiers: usize },

    #[error("identifier {identifier:?} appears on lines {first} and {second}")]
    DuplicateIdentifier {
        identifier: String,
        first: usize,
        second: usize,
    },

    #[error("empty identifier on line {line}")]
    EmptyIdentifier { line: usize },

    #[error("factor dimension must be positive")]
    ZeroDimension,

    #[error("{len} factor values do not divide into rows of dimension {dimension}")]
    RaggedFactors { len: usize, dimension: usize },

    #[error("non-finite factor value at row {row}, column {col}")]
    NonFinite { row: usize, col: usize },
}

/// Item-factor matrix plus identifier lookup, immutable once built.
///
/// Row `i` of the matrix is the latent vector of the item whose identifier is
/// `identifiers[i]`. Reads take `&self`, so a store wrapped in an `Arc` can be
/// shared by any number of request threads without locking.
#[derive(Debug)]
pub struct FactorStore {
    identifiers: Vec<String>,
    index: HashMap<String, usize>,
    /// Row-major, `identifiers.len() × dimension`
    factors: Vec<f64>,
    dimension: usize,
    /// Row-major `dimension × dimension`
    gram: Vec<f64>,
}

impl FactorStore {
    /// Loads `item_factors.npy` and `items.csv` from a model directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, LoadError> {
        let dir = dir.as_ref();
        Self::load_files(dir.join(FACTORS_FILE), dir.join(ITEMS_FILE))
    }

    /// Loads a store from an explicit array file and identifier file.
    pub fn load_files(
        factors_path: impl AsRef<Path>,
        items_path: impl AsRef<Path>,
    ) -> Result<Self, LoadError> {
        let factors_path = factors_path.as_ref();
        let items_path = items_path.as_ref();
        let start = Instant::now();

        let file = File::open(factors_path).map_err(|source| LoadError::Io {
            path: factors_path.to_path_buf(),
            source,
        })?;
        let matrix = npy::read_matrix(BufReader::new(file)).map_err(|source| match source {
            NpyError::Io(source) => LoadError::Io {
                path: factors_path.to_path_buf(),
                source,
            },
            source => LoadError::Array {
                path: factors_path.to_path_buf(),
                source,
            },
        })?;

        let text = fs::read_to_string(items_path).map_err(|source| LoadError::Io {
            path: items_path.to_path_buf(),
            source,
        })?;
        let identifiers = parse_identifiers(&text);

        if identifiers.len() != matrix.rows {
            return Err(LoadError::CountMismatch {
                rows: matrix.rows,
                identifiers: identifiers.len(),
            });
        }

        let store = Self::from_parts(identifiers, matrix.data, matrix.cols)?;

        tracing::info!(
            items = store.size(),
            dimension = store.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            factors = %factors_path.display(),
            "Loaded item factor store"
        );

        Ok(store)
    }

    /// Builds a store from in-memory parts.
    ///
    /// `factors` is row-major with `dimension` columns and one row per
    /// identifier. Fails on a zero dimension, a row/identifier count mismatch,
    /// non-finite values, empty identifiers or duplicate identifiers.
    pub fn from_parts(
        identifiers: Vec<String>,
        factors: Vec<f64>,
        dimension: usize,
    ) -> Result<Self, LoadError> {
        if dimension == 0 {
            return Err(LoadError::ZeroDimension);
        }
        if factors.len() % dimension != 0 {
            return Err(LoadError::RaggedFactors {
                len: factors.len(),
                dimension,
            });
        }
        let rows = factors.len() / dimension;
        if rows != identifiers.len() {
            return Err(LoadError::CountMismatch {
                rows,
                identifiers: identifiers.len(),
            });
        }
        if let Some(pos) = factors.iter().position(|v| !v.is_finite()) {
            return Err(LoadError::NonFinite {
                row: pos / dimension,
                col: pos % dimension,
            });
        }

        let index = build_index(&identifiers)?;
        let gram = gramian(&factors, rows, dimension);

        Ok(Self {
            identifiers,
            index,
            factors,
            dimension,
            gram,
        })
    }

    /// Catalog index of `identifier`, if the model knows it.
    pub fn lookup(&self, identifier: &str) -> Option<usize> {
        self.index.get(identifier).copied()
    }

    /// Resolves caller identifiers to a feedback set, dropping unknown ones.
    pub fn resolve<S: AsRef<str>>(&self, identifiers: &[S]) -> Resolution {
        Resolution::from_lookups(identifiers.iter().map(|identifier| {
            let identifier = identifier.as_ref();
            (identifier, self.lookup(identifier))
        }))
    }

    /// Latent vector of the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.size()`.
    pub fn vector(&self, index: usize) -> &[f64] {
        let start = index * self.dimension;
        &self.factors[start..start + self.dimension]
    }

    /// Identifier of the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.size()`.
    pub fn identifier(&self, index: usize) -> &str {
        &self.identifiers[index]
    }

    /// The whole factor matrix, row-major.
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }

    /// `XᵗX`, row-major `dimension × dimension`.
    pub fn gram(&self) -> &[f64] {
        &self.gram
    }

    /// Number of items N.
    pub fn size(&self) -> usize {
        self.identifiers.len()
    }

    /// Factor dimension F.
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// One identifier per line; `\n` and `\r\n` endings are stripped and a final
/// newline does not add an entry.
fn parse_identifiers(text: &str) -> Vec<String> {
    text.lines().map(str::to_string).collect()
}

fn build_index(identifiers: &[String]) -> Result<HashMap<String, usize>, LoadError> {
    let mut index = HashMap::with_capacity(identifiers.len());
    for (row, identifier) in identifiers.iter().enumerate() {
        if identifier.is_empty() {
            return Err(LoadError::EmptyIdentifier { line: row + 1 });
        }
        if let Some(first) = index.insert(identifier.clone(), row) {
            return Err(LoadError::DuplicateIdentifier {
                identifier: identifier.clone(),
                first: first + 1,
                second: row + 1,
            });
        }
    }
    Ok(index)
}

fn gramian(factors: &[f64], rows: usize, dimension: usize) -> Vec<f64> {
    let x = MatRef::from_row_major_slice(factors, rows, dimension);
    let xt = x.transpose();

    let mut g = Mat::<f64>::zeros(dimension, dimension);
    matmul(g.as_mut(), Accum::Replace, xt, x, 1.0f64, Par::rayon(0));

    let mut out = vec![0.0f64; dimension * dimension];
    for a in 0..dimension {
        for b in 0..dimension {
            out[a * dimension + b] = g[(a, b)];
        }
    }
    out
}
