//! Fitted item vectors keyed by item id.
//!
//! Written as a pair of files sharing a prefix:
//!
//! - `<prefix>.npy`: `f32` matrix, one row per item in first-seen order
//! - `<prefix>_id2idx.json`: object mapping each item id to its row index

use crate::error::{ColdVecError, Result};
use crate::storage::npy;
use ndarray::Array2;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Insertion-ordered collection of item vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSet {
    dim: usize,
    ids: Vec<String>,
    index: HashMap<String, usize>,
    data: Vec<f32>,
}

impl EmbeddingSet {
    /// Creates an empty set of `dim`-dimensional vectors.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            ids: Vec::new(),
            index: HashMap::new(),
            data: Vec::new(),
        }
    }

    /// Adds a vector unless the id is already present.
    ///
    /// Returns `Ok(false)` for a duplicate id; the first vector is kept.
    pub fn insert(&mut self, id: String, vector: &[f32]) -> Result<bool> {
        if vector.len() != self.dim {
            return Err(ColdVecError::DimensionMismatch {
                expected: self.dim,
                actual: vector.len(),
            });
        }
        if self.index.contains_key(&id) {
            return Ok(false);
        }
        self.index.insert(id.clone(), self.ids.len());
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        Ok(true)
    }

    /// Row index of an item.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Vector of an item.
    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.index_of(id)
            .map(|row| &self.data[row * self.dim..(row + 1) * self.dim])
    }

    /// Item ids in row order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Vector dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Copies the vectors into a dense `len x dim` matrix.
    pub fn to_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.len(), self.dim), |(r, c)| self.data[r * self.dim + c])
    }

    /// Path of the matrix file for a prefix.
    pub fn matrix_path<P: AsRef<Path>>(prefix: P) -> PathBuf {
        with_suffix(prefix.as_ref(), ".npy")
    }

    /// Path of the id map file for a prefix.
    pub fn index_path<P: AsRef<Path>>(prefix: P) -> PathBuf {
        with_suffix(prefix.as_ref(), "_id2idx.json")
    }

    /// Writes the matrix and id map next to each other.
    pub fn save<P: AsRef<Path>>(&self, prefix: P) -> Result<()> {
        let prefix = prefix.as_ref();
        if let Some(parent) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(Self::index_path(prefix))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &OrderedIndex(&self.ids))?;
        writer.flush()?;

        npy::write_matrix(Self::matrix_path(prefix), &self.to_array())
    }

    /// Reads a set previously written by [`EmbeddingSet::save`].
    pub fn load<P: AsRef<Path>>(prefix: P) -> Result<Self> {
        let prefix = prefix.as_ref();
        let index_path = Self::index_path(prefix);
        if !index_path.exists() {
            return Err(ColdVecError::FileNotFound(index_path));
        }
        let reader = BufReader::new(File::open(&index_path)?);
        let index: HashMap<String, usize> = serde_json::from_reader(reader)?;
        let matrix = npy::read_matrix(Self::matrix_path(prefix))?;

        if index.len() != matrix.nrows() {
            return Err(ColdVecError::Serialization(format!(
                "id map has {} entries but matrix has {} rows",
                index.len(),
                matrix.nrows()
            )));
        }

        let mut ids: Vec<Option<String>> = vec![None; index.len()];
        for (id, &row) in &index {
            match ids.get_mut(row) {
                Some(slot @ None) => *slot = Some(id.clone()),
                _ => {
                    return Err(ColdVecError::Serialization(format!(
                        "invalid row index {} for item {}",
                        row, id
                    )))
                }
            }
        }

        Ok(Self {
            dim: matrix.ncols(),
            ids: ids.into_iter().flatten().collect(),
            index,
            data: matrix.iter().copied().collect(),
        })
    }
}

/// Serializes ids as a JSON object in row order.
struct OrderedIndex<'a>(&'a [String]);

impl Serialize for OrderedIndex<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (row, id) in self.0.iter().enumerate() {
            map.serialize_entry(id, &row)?;
        }
        map.end()
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_seen_wins() {
        let mut set = EmbeddingSet::new(2);
        assert!(set.insert("a".to_string(), &[1.0, 2.0]).unwrap());
        assert!(set.insert("b".to_string(), &[3.0, 4.0]).unwrap());
        assert!(!set.insert("a".to_string(), &[9.0, 9.0]).unwrap());

        assert_eq!(set.len(), 2);
        assert_eq!(set.index_of("a"), Some(0));
        assert_eq!(set.index_of("b"), Some(1));
        assert_eq!(set.get("a"), Some(&[1.0f32, 2.0][..]));
        assert_eq!(set.ids(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut set = EmbeddingSet::new(3);
        let err = set.insert("a".to_string(), &[1.0]).unwrap_err();
        assert!(matches!(
            err,
            ColdVecError::DimensionMismatch { expected: 3, actual: 1 }
        ));
        assert!(set.is_empty());
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            EmbeddingSet::matrix_path("result/embed"),
            PathBuf::from("result/embed.npy")
        );
        assert_eq!(
            EmbeddingSet::index_path("result/embed"),
            PathBuf::from("result/embed_id2idx.json")
        );
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("out").join("embed");

        let mut set = EmbeddingSet::new(2);
        set.insert("z".to_string(), &[0.5, -0.5]).unwrap();
        set.insert("a".to_string(), &[1.0, 1.5]).unwrap();
        set.save(&prefix).unwrap();

        let json = fs::read_to_string(EmbeddingSet::index_path(&prefix)).unwrap();
        assert_eq!(json, r#"{"z":0,"a":1}"#);

        let loaded = EmbeddingSet::load(&prefix).unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_save_empty() {
        let dir = tempdir().unwrap();
        let prefix = dir.path().join("empty");

        EmbeddingSet::new(4).save(&prefix).unwrap();
        let loaded = EmbeddingSet::load(&prefix).unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dim(), 4);
    }
}
