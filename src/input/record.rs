//! Parsing of `item_id<TAB>token,token,...` records.

use crate::config::InputConfig;
use crate::error::{ColdVecError, Result};
use log::info;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One item to fit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Item identifier, carried through to the output map.
    pub item_id: String,
    /// Token ids describing the item, in file order.
    pub token_ids: Vec<usize>,
}

impl Job {
    /// Creates a new job.
    pub fn new(item_id: impl Into<String>, token_ids: Vec<usize>) -> Self {
        Self {
            item_id: item_id.into(),
            token_ids,
        }
    }
}

/// Parses one record; returns `None` for records that should be dropped.
///
/// A record is dropped when it does not split into exactly two fields, when
/// either field is empty or carries a null marker, or when a token is not a
/// non-negative integer. Double quotes are stripped from the token list.
pub fn parse_line(line: &str, config: &InputConfig) -> Option<Job> {
    let line = line.trim();
    let mut fields = line.split(config.separator);
    let (item_id, tokens) = match (fields.next(), fields.next(), fields.next()) {
        (Some(id), Some(tokens), None) => (id, tokens),
        _ => return None,
    };

    if config.is_null(item_id) || config.is_null(tokens) {
        return None;
    }

    let tokens = tokens.replace('"', "");
    let token_ids = tokens
        .split(',')
        .map(|t| t.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .ok()?;

    Some(Job::new(item_id, token_ids))
}

/// Reads and parses every record of an input file.
///
/// Lines are parsed in parallel; the returned jobs keep file order. Lines that
/// are not valid UTF-8 are dropped like any other malformed record.
pub fn load_jobs<P: AsRef<Path>>(path: P, config: &InputConfig) -> Result<Vec<Job>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ColdVecError::FileNotFound(path.to_path_buf()));
    }

    let reader = BufReader::new(File::open(path)?);
    let lines: Vec<Vec<u8>> = reader.split(b'\n').collect::<std::io::Result<_>>()?;

    let jobs: Vec<Job> = lines
        .par_iter()
        .filter_map(|line| {
            let line = std::str::from_utf8(line).ok()?;
            parse_line(line, config)
        })
        .collect();

    info!(
        "Loaded {} records from {} ({} dropped)",
        jobs.len(),
        path.display(),
        lines.len() - jobs.len()
    );
    Ok(jobs)
}
