//! Labeled dataset enumeration, deterministic shuffle and train/validation split.
//!
//! A dataset root holds one directory per class (an angle such as `45.000`,
//! or `silence`). Every file below a class directory whose name contains
//! `raw_` is one window of that class, at any depth.

mod stream;

use std::{
    fs,
    path::{Path, PathBuf},
};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;
use walkdir::WalkDir;

use crate::constants::{DATASET_FILE_MARKER, VALID_SPLIT};

pub use stream::{Batch, ExampleStream, StreamOptions};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("walking {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("decode: {0}")]
    Decode(#[from] crate::audio::DecodeError),
    #[error("dataset directory {0} has no class sub-directories")]
    NoClasses(PathBuf),
    #[error("class directory name {0:?} is not valid UTF-8")]
    ClassName(PathBuf),
}

/// One window file and its integer class label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Example {
    pub path: PathBuf,
    pub label: u32,
}

/// The class directories of a dataset root, in enumeration order.
#[derive(Clone, Debug)]
pub struct ClassDir {
    pub name: String,
    pub files: Vec<PathBuf>,
}

/// Enumerate the class directories below `root` and their window files.
///
/// Classes are returned in lexicographic order of their directory names,
/// files in lexicographic path order, so the result does not depend on
/// the filesystem's directory ordering.
pub fn enumerate_classes(root: &Path) -> Result<Vec<ClassDir>, DatasetError> {
    let mut names = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| DatasetError::ClassName(entry.path()))?;
        names.push(name);
    }
    if names.is_empty() {
        return Err(DatasetError::NoClasses(root.to_path_buf()));
    }
    names.sort();

    names
        .into_iter()
        .map(|name| {
            log::info!("Processing dataset {name}");
            let files = window_files(&root.join(&name))?;
            Ok(ClassDir { name, files })
        })
        .collect()
}

fn window_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|source| DatasetError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file()
            && entry
                .file_name()
                .to_string_lossy()
                .contains(DATASET_FILE_MARKER)
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// All windows of a dataset root with labels assigned by class order.
#[derive(Clone, Debug)]
pub struct LabeledDataset {
    pub class_names: Vec<String>,
    pub examples: Vec<Example>,
}

/// Training / validation partition of a [`LabeledDataset`].
#[derive(Clone, Debug)]
pub struct DatasetSplit {
    pub class_names: Vec<String>,
    pub train: Vec<Example>,
    pub validation: Vec<Example>,
}

impl LabeledDataset {
    /// Scan `root` and label every window by its class directory's index.
    pub fn from_dir(root: &Path) -> Result<Self, DatasetError> {
        let classes = enumerate_classes(root)?;
        let mut class_names = Vec::with_capacity(classes.len());
        let mut examples = Vec::new();
        for (label, class) in classes.into_iter().enumerate() {
            examples.extend(class.files.into_iter().map(|path| Example {
                path,
                label: label as u32,
            }));
            class_names.push(class.name);
        }
        log::info!(
            "Found {} files belonging to {} classes.",
            examples.len(),
            class_names.len()
        );
        Ok(Self {
            class_names,
            examples,
        })
    }

    /// Shuffle the (path, label) pairs with a seeded RNG.
    ///
    /// Pairs move together, so a path never loses its label, and the same
    /// seed always yields the same order.
    pub fn shuffled(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.examples.shuffle(&mut rng);
        self
    }

    /// Hold out the last `floor(fraction · n)` examples for validation.
    pub fn split(self, fraction: f32) -> DatasetSplit {
        let n = self.examples.len();
        let num_val = ((fraction * n as f32) as usize).min(n);
        let mut train = self.examples;
        let validation = train.split_off(n - num_val);
        log::info!("Using {} files for training.", train.len());
        log::info!("Using {} files for validation.", validation.len());
        DatasetSplit {
            class_names: self.class_names,
            train,
            validation,
        }
    }

    /// Scan, shuffle with `seed` and split with the default validation fraction.
    pub fn prepare(root: &Path, seed: u64) -> Result<DatasetSplit, DatasetError> {
        Ok(Self::from_dir(root)?.shuffled(seed).split(VALID_SPLIT))
    }
}
