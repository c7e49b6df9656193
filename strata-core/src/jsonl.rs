//! Newline-delimited JSON input and atomic artifact output.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{Result, StrataError};

/// Records read from an input file.
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    /// NDJSON lines that failed to decode and were skipped.
    pub skipped: usize,
}

/// Read records from a `.jsonl` (one record per line) or `.json` (array) file.
///
/// Blank NDJSON lines are ignored, undecodable ones are logged and counted.
/// A `.json` file must decode as a whole.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    if !path.is_file() {
        return Err(StrataError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("jsonl") => read_lines(path),
        Some("json") => {
            let reader = BufReader::new(File::open(path)?);
            let records: Vec<T> =
                serde_json::from_reader(reader).map_err(|e| StrataError::MalformedInput {
                    path: path.to_path_buf(),
                    line: 0,
                    message: e.to_string(),
                })?;
            Ok(Loaded {
                records,
                skipped: 0,
            })
        }
        _ => Err(StrataError::UnknownFormat {
            path: path.to_path_buf(),
        }),
    }
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut loaded = Loaded {
        records: Vec::new(),
        skipped: 0,
    };
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => loaded.records.push(record),
            Err(e) => {
                warn!(path = %path.display(), line = idx + 1, error = %e, "skipping malformed line");
                loaded.skipped += 1;
            }
        }
    }
    Ok(loaded)
}

/// Temporary sibling used while `path` is being written.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write records as NDJSON to a temporary sibling of `path`.
///
/// Returns the temporary path and the record count. Nothing is visible at
/// `path` until [`commit`] is called.
pub fn write_staged<'a, T, I>(path: &Path, records: I) -> Result<(PathBuf, usize)>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path(path);
    let result = (|| -> Result<usize> {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        let mut count = 0;
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
            count += 1;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(count)
    })();
    match result {
        Ok(count) => Ok((tmp, count)),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Move a staged file into place.
pub fn commit(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).map_err(|source| StrataError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

/// Write records as NDJSON to `path`, atomically.
pub fn write_records<'a, T, I>(path: &Path, records: I) -> Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let (tmp, count) = write_staged(path, records)?;
    commit(&tmp, path)?;
    info!(path = %path.display(), records = count, "wrote artifact");
    Ok(count)
}
