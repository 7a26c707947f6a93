use crate::vetch_common::*;

use candle_gnn::error::Error;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One folder-per-sample dataset.
///
/// The folder must contain `features.tsv[.gz]` (one spot per row) and
/// `coordinates.tsv[.gz]` (n x 2); `labels.tsv[.gz]` with one label per
/// spot is optional. `.csv[.gz]` variants are also accepted.
#[derive(Debug)]
pub struct SampleData {
    /// raw expression (n x g)
    pub features_ng: Mat,
    /// spatial coordinates (n x 2)
    pub coordinates_n2: Mat,
    /// ground-truth domain labels, if provided
    pub labels: Option<Vec<Box<str>>>,
}

impl SampleData {
    pub fn num_spots(&self) -> usize {
        self.features_ng.nrows()
    }

    pub fn num_genes(&self) -> usize {
        self.features_ng.ncols()
    }

    /// number of distinct labels; overrides the configured cluster count
    pub fn num_label_classes(&self) -> Option<usize> {
        self.labels
            .as_ref()
            .map(|labels| labels.iter().collect::<HashSet<_>>().len())
    }
}

fn locate(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["tsv", "tsv.gz", "csv", "csv.gz"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|file| file.is_file())
}

fn path_str(file: &Path) -> anyhow::Result<&str> {
    match file.to_str() {
        Some(file) => Ok(file),
        None => Err(Error::Data(format!("non-unicode path {:?}", file)).into()),
    }
}

/// Read a sample folder, checking shapes before any training starts.
pub fn read_sample_folder(data_dir: &str) -> anyhow::Result<SampleData> {
    let dir = Path::new(data_dir);
    if !dir.is_dir() {
        return Err(Error::Data(format!("`{}` is not a directory", data_dir)).into());
    }

    let features_file = locate(dir, "features").ok_or_else(|| {
        Error::Data(format!("no `features.tsv[.gz]` or `.csv[.gz]` in {}", data_dir))
    })?;
    let coordinates_file = locate(dir, "coordinates").ok_or_else(|| {
        Error::Data(format!(
            "no `coordinates.tsv[.gz]` or `.csv[.gz]` in {}",
            data_dir
        ))
    })?;

    let features_ng = Mat::from_tsv(path_str(&features_file)?)?;
    let coordinates = Mat::from_tsv(path_str(&coordinates_file)?)?;

    if coordinates.ncols() < 2 {
        return Err(Error::Data(format!(
            "coordinates have {} column(s), need x and y",
            coordinates.ncols()
        ))
        .into());
    }
    // extra columns (e.g. array row/col indices) are ignored
    let coordinates_n2 = coordinates.columns(0, 2).into_owned();

    if features_ng.nrows() != coordinates_n2.nrows() {
        return Err(Error::Data(format!(
            "{} feature rows vs {} coordinate rows",
            features_ng.nrows(),
            coordinates_n2.nrows()
        ))
        .into());
    }

    let labels = match locate(dir, "labels") {
        Some(labels_file) => {
            let lines: Vec<Box<str>> = read_lines(path_str(&labels_file)?)?
                .into_iter()
                .filter(|line| !line.is_empty())
                .collect();
            if lines.len() != features_ng.nrows() {
                return Err(Error::Data(format!(
                    "{} labels vs {} spots",
                    lines.len(),
                    features_ng.nrows()
                ))
                .into());
            }
            Some(lines)
        }
        None => None,
    };

    info!(
        "read {} spots x {} features from {}",
        features_ng.nrows(),
        features_ng.ncols(),
        data_dir
    );

    Ok(SampleData {
        features_ng,
        coordinates_n2,
        labels,
    })
}
