//! Per-label bandwidth datasets and the comparisons built from them.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::parser::{ExtractError, Pair, read_pairs};

/// Problems with the shape of the `--input FNAME LABEL` arguments.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("{expected} input files must be given, got {got}")]
    WrongCount { expected: usize, got: usize },

    #[error("at least one input file must be given")]
    Missing,

    #[error("--input takes a file name and a label")]
    Unpaired,

    #[error("already have an input file with label {0}")]
    DuplicateLabel(String),
}

/// A file to read measurements from and the label its points get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledInput {
    pub path: PathBuf,
    pub label: String,
}

impl LabeledInput {
    /// Pairs up flat `FNAME LABEL FNAME LABEL ...` values.
    ///
    /// With `expected` set, exactly that many inputs must be present;
    /// otherwise at least one. Labels must be unique.
    pub fn from_args(values: &[String], expected: Option<usize>) -> Result<Vec<Self>, InputError> {
        if values.len() % 2 != 0 {
            return Err(InputError::Unpaired);
        }
        let got = values.len() / 2;
        match expected {
            Some(expected) if got != expected => {
                return Err(InputError::WrongCount { expected, got });
            }
            None if got == 0 => return Err(InputError::Missing),
            _ => {}
        }

        let mut seen = HashSet::new();
        values
            .chunks_exact(2)
            .map(|chunk| {
                let label = chunk[1].clone();
                if !seen.insert(label.clone()) {
                    return Err(InputError::DuplicateLabel(label));
                }
                Ok(Self {
                    path: PathBuf::from(&chunk[0]),
                    label,
                })
            })
            .collect()
    }
}

/// Bandwidth per fingerprint for one labeled input.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub label: String,
    bandwidths: HashMap<String, u64>,
}

impl Dataset {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bandwidths: HashMap::new(),
        }
    }

    /// Records a pair. A repeated fingerprint overwrites the earlier value.
    pub fn insert(&mut self, pair: Pair) {
        if self.bandwidths.contains_key(&pair.fingerprint) {
            let short: String = pair.fingerprint.chars().take(8).collect();
            warn!(fingerprint = %short, label = %self.label, "Already saw fingerprint, overwriting");
        }
        self.bandwidths.insert(pair.fingerprint, pair.bandwidth);
    }

    pub fn from_pairs<I>(label: impl Into<String>, pairs: I) -> Result<Self, ExtractError>
    where
        I: IntoIterator<Item = Result<Pair, ExtractError>>,
    {
        let mut dataset = Self::new(label);
        for pair in pairs {
            dataset.insert(pair?);
        }
        Ok(dataset)
    }

    /// Reads every pair from a v3bw file.
    #[tracing::instrument(skip(path), fields(path = %path.display()))]
    pub fn load(path: &Path, label: &str) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let dataset = Self::from_pairs(label, read_pairs(BufReader::new(file)))
            .with_context(|| format!("reading {}", path.display()))?;
        info!(count = dataset.len(), label, "Read fingerprints");
        Ok(dataset)
    }

    pub fn load_all(inputs: &[LabeledInput]) -> Result<Vec<Self>> {
        inputs
            .iter()
            .map(|input| Self::load(&input.path, &input.label))
            .collect()
    }

    pub fn get(&self, fingerprint: &str) -> Option<u64> {
        self.bandwidths.get(fingerprint).copied()
    }

    pub fn len(&self) -> usize {
        self.bandwidths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bandwidths.is_empty()
    }

    pub fn fingerprints(&self) -> impl Iterator<Item = &str> {
        self.bandwidths.keys().map(String::as_str)
    }
}

fn shared<'a>(x: &'a Dataset, y: &'a Dataset) -> impl Iterator<Item = (&'a String, (u64, u64))> {
    x.bandwidths
        .iter()
        .filter_map(|(fp, &xbw)| y.get(fp).map(|ybw| (fp, (xbw, ybw))))
}

/// Fingerprints measured by both datasets, mapped to `(x, y)` bandwidths.
pub fn intersection_points(x: &Dataset, y: &Dataset) -> BTreeMap<String, (u64, u64)> {
    let points: BTreeMap<_, _> = shared(x, y).map(|(fp, xy)| (fp.clone(), xy)).collect();
    info!(
        x = %x.label,
        y = %y.label,
        shared = points.len(),
        "Datasets share fingerprints"
    );
    points
}

/// `(sort, other)` bandwidth pairs over shared fingerprints, highest `sort`
/// value first.
pub fn sorted_pairs(sort: &Dataset, other: &Dataset) -> Vec<(u64, u64)> {
    let mut pairs: Vec<_> = shared(sort, other).map(|(_, xy)| xy).collect();
    pairs.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    pairs
}

/// Fingerprints present in every dataset.
pub fn common_fingerprints(datasets: &[Dataset]) -> BTreeSet<String> {
    let Some((first, rest)) = datasets.split_first() else {
        return BTreeSet::new();
    };
    first
        .fingerprints()
        .filter(|fp| rest.iter().all(|d| d.get(fp).is_some()))
        .map(str::to_string)
        .collect()
}

/// One row per common fingerprint holding each dataset's bandwidth in
/// dataset order, sorted descending by the dataset at `sort_index`.
pub fn rows_sorted_by(datasets: &[Dataset], sort_index: usize) -> Vec<Vec<u64>> {
    let mut rows: Vec<Vec<u64>> = common_fingerprints(datasets)
        .iter()
        .map(|fp| datasets.iter().filter_map(|d| d.get(fp)).collect())
        .collect();
    rows.sort_by(|a, b| b[sort_index].cmp(&a[sort_index]));
    rows
}
