//! NumPy `.npy` array files.
//!
//! The pretrained context matrix and vocabulary weights come out of the offline
//! trainer as `.npy` files, and the fitted item matrix is written back in the
//! same format so downstream tooling can `np.load` it directly.
//!
//! ## Format Layout
//!
//! ```text
//! +----------------------------+
//! | Magic (6 bytes) "\x93NUMPY"|
//! +----------------------------+
//! | Version (2 bytes)          |
//! +----------------------------+
//! | Header length (u16 or u32) |
//! +----------------------------+
//! | Header dict (ASCII)        |
//! | padded to 64 bytes         |
//! +----------------------------+
//! | Array data                 |
//! | (C order, little-endian)   |
//! +----------------------------+
//! ```
//!
//! Only C-ordered, little-endian numeric arrays are supported.

use crate::error::{ColdVecError, Result};
use memmap2::{Mmap, MmapOptions};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Magic prefix of every `.npy` file.
const MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Header alignment required by the format.
const HEADER_ALIGN: usize = 64;

/// Element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    /// `<f4`
    F32,
    /// `<f8`
    F64,
    /// `|i1`
    I8,
    /// `|u1`
    U8,
    /// `<i4`
    I32,
    /// `<u4`
    U32,
    /// `<i8`
    I64,
    /// `<u8`
    U64,
}

impl DType {
    /// Parses a numpy `descr` string such as `<f4`.
    pub fn parse(descr: &str) -> Result<Self> {
        let mut chars = descr.chars();
        let order = chars.next();
        if !matches!(order, Some('<') | Some('|') | Some('=')) {
            return Err(ColdVecError::InvalidArrayFormat(format!(
                "unsupported byte order in dtype '{}'",
                descr
            )));
        }
        match chars.as_str() {
            "f4" => Ok(DType::F32),
            "f8" => Ok(DType::F64),
            "i1" => Ok(DType::I8),
            "u1" => Ok(DType::U8),
            "i4" => Ok(DType::I32),
            "u4" => Ok(DType::U32),
            "i8" => Ok(DType::I64),
            "u8" => Ok(DType::U64),
            other => Err(ColdVecError::InvalidArrayFormat(format!(
                "unsupported dtype '{}'",
                other
            ))),
        }
    }

    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DType::I8 | DType::U8 => 1,
            DType::F32 | DType::I32 | DType::U32 => 4,
            DType::F64 | DType::I64 | DType::U64 => 8,
        }
    }
}

/// Parsed array header.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyHeader {
    /// Element type.
    pub dtype: DType,
    /// Array shape; empty for a scalar.
    pub shape: Vec<usize>,
    /// Column-major layout flag.
    pub fortran_order: bool,
}

impl NpyHeader {
    /// Total number of elements, or `None` if it overflows `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Size of the data section in bytes, or `None` if it overflows `usize`.
    fn data_len(&self) -> Option<usize> {
        self.num_elements()?.checked_mul(self.dtype.size())
    }

    /// Parses the Python dict literal stored in the file header.
    fn from_dict(dict: &str) -> Result<Self> {
        let descr = dict_value(dict, "descr")
            .and_then(quoted)
            .ok_or_else(|| bad_header("missing 'descr'"))?;
        let fortran = dict_value(dict, "fortran_order")
            .ok_or_else(|| bad_header("missing 'fortran_order'"))?;
        let fortran_order = if fortran.starts_with("True") {
            true
        } else if fortran.starts_with("False") {
            false
        } else {
            return Err(bad_header("invalid 'fortran_order'"));
        };
        let shape_str = dict_value(dict, "shape")
            .and_then(|v| v.strip_prefix('('))
            .and_then(|v| v.split(')').next())
            .ok_or_else(|| bad_header("missing 'shape'"))?;
        let shape = shape_str
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.trim_end_matches('L')
                    .parse::<usize>()
                    .map_err(|_| bad_header("invalid 'shape'"))
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(Self {
            dtype: DType::parse(descr)?,
            shape,
            fortran_order,
        })
    }
}

fn bad_header(msg: &str) -> ColdVecError {
    ColdVecError::InvalidArrayFormat(format!("header: {}", msg))
}

/// Returns the text following `'key':` in a dict literal.
fn dict_value<'a>(dict: &'a str, key: &str) -> Option<&'a str> {
    ["'", "\""].iter().find_map(|q| {
        let needle = format!("{q}{key}{q}");
        let start = dict.find(&needle)? + needle.len();
        let rest = dict[start..].trim_start().strip_prefix(':')?;
        Some(rest.trim_start())
    })
}

/// Returns the contents of a leading quoted string.
fn quoted(s: &str) -> Option<&str> {
    let q = s.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &s[1..];
    rest.find(q).map(|end| &rest[..end])
}

macro_rules! decode_le {
    ($bytes:expr, $ty:ty, $out:ty) => {
        $bytes
            .chunks_exact(std::mem::size_of::<$ty>())
            .map(|c| {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(c);
                <$ty>::from_le_bytes(buf) as $out
            })
            .collect()
    };
}

macro_rules! decode_all {
    ($bytes:expr, $dtype:expr, $out:ty) => {
        match $dtype {
            DType::F32 => decode_le!($bytes, f32, $out),
            DType::F64 => decode_le!($bytes, f64, $out),
            DType::I8 => decode_le!($bytes, i8, $out),
            DType::U8 => decode_le!($bytes, u8, $out),
            DType::I32 => decode_le!($bytes, i32, $out),
            DType::U32 => decode_le!($bytes, u32, $out),
            DType::I64 => decode_le!($bytes, i64, $out),
            DType::U64 => decode_le!($bytes, u64, $out),
        }
    };
}

/// A memory-mapped `.npy` file.
pub struct NpyArray {
    mmap: Mmap,
    header: NpyHeader,
    data_offset: usize,
    data_len: usize,
}

impl NpyArray {
    /// Opens and validates an array file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ColdVecError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        if mmap.len() < 10 || &mmap[0..6] != MAGIC {
            return Err(ColdVecError::InvalidArrayFormat(
                "Invalid magic number".to_string(),
            ));
        }

        let major = mmap[6];
        let (header_len, header_start) = match major {
            1 => (u16::from_le_bytes([mmap[8], mmap[9]]) as usize, 10),
            2 | 3 => {
                if mmap.len() < 12 {
                    return Err(bad_header("truncated"));
                }
                (
                    u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]) as usize,
                    12,
                )
            }
            v => {
                return Err(ColdVecError::InvalidArrayFormat(format!(
                    "Unsupported version: {}",
                    v
                )))
            }
        };

        let data_offset = header_start + header_len;
        if mmap.len() < data_offset {
            return Err(bad_header("truncated"));
        }
        let dict = std::str::from_utf8(&mmap[header_start..data_offset])
            .map_err(|_| bad_header("not valid text"))?;
        let header = NpyHeader::from_dict(dict)?;

        if header.fortran_order {
            return Err(ColdVecError::InvalidArrayFormat(
                "Fortran-ordered arrays are not supported".to_string(),
            ));
        }

        let expected = header
            .data_len()
            .ok_or_else(|| bad_header("shape overflows"))?;
        if mmap.len() - data_offset < expected {
            return Err(ColdVecError::InvalidArrayFormat(format!(
                "expected {} data bytes, found {}",
                expected,
                mmap.len() - data_offset
            )));
        }

        Ok(Self {
            mmap,
            header,
            data_offset,
            data_len: expected,
        })
    }

    /// Returns the array shape.
    pub fn shape(&self) -> &[usize] {
        &self.header.shape
    }

    fn data(&self) -> &[u8] {
        &self.mmap[self.data_offset..self.data_offset + self.data_len]
    }

    /// Decodes all elements as `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        decode_all!(self.data(), self.header.dtype, f32)
    }

    /// Decodes all elements as `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        decode_all!(self.data(), self.header.dtype, f64)
    }
}

/// Reads a 2-D array as an `f32` matrix.
pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let array = NpyArray::open(path)?;
    let (rows, cols) = match *array.shape() {
        [rows, cols] => (rows, cols),
        ref other => {
            return Err(ColdVecError::InvalidArrayFormat(format!(
                "expected a 2-D array, got shape {:?}",
                other
            )))
        }
    };
    Array2::from_shape_vec((rows, cols), array.to_f32_vec())
        .map_err(|e| ColdVecError::InvalidArrayFormat(e.to_string()))
}

/// Reads a 1-D array (or a single-column 2-D array) as `f64` values.
pub fn read_vector<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let array = NpyArray::open(path)?;
    match *array.shape() {
        [_] | [_, 1] => Ok(array.to_f64_vec()),
        ref other => Err(ColdVecError::InvalidArrayFormat(format!(
            "expected a 1-D array, got shape {:?}",
            other
        ))),
    }
}

/// Writes an `f32` matrix as a version 1.0 `.npy` file.
pub fn write_matrix<P: AsRef<Path>>(path: P, matrix: &Array2<f32>) -> Result<()> {
    let (rows, cols) = matrix.dim();
    let mut writer = create_with_header(path, "<f4", &format!("({}, {})", rows, cols))?;
    for value in matrix.iter() {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes `f64` values as a 1-D version 1.0 `.npy` file.
pub fn write_vector<P: AsRef<Path>>(path: P, values: &[f64]) -> Result<()> {
    let mut writer = create_with_header(path, "<f8", &format!("({},)", values.len()))?;
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

fn create_with_header<P: AsRef<Path>>(
    path: P,
    descr: &str,
    shape: &str,
) -> Result<BufWriter<File>> {
    let mut dict = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
        descr, shape
    );
    // magic + version + u16 length + dict + trailing newline
    let unpadded = MAGIC.len() + 2 + 2 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    dict.extend(std::iter::repeat(' ').take(padding));
    dict.push('\n');

    let header_len = u16::try_from(dict.len())
        .map_err(|_| ColdVecError::InvalidArrayFormat("header too long".to_string()))?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(dict.as_bytes())?;
    Ok(writer)
}
