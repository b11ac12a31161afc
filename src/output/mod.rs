//! # Output store for tracklet and track id-sets
//!
//! Both engines emit their results as sets of detection identities. The
//! [`IdSetStore`] is the shared sink with three interchangeable modes selected
//! by [`OutputMethod`]:
//!
//! * `ReturnResults` — in-memory only, the caller takes the full collection;
//! * `IdsFile` — unbuffered streaming, every append is persisted immediately;
//! * `IdsFileWithCache` — appends accumulate in memory and are flushed to the
//!   file once the estimated buffer size crosses the configured threshold,
//!   with a final forced purge at run end.
//!
//! The persisted encoding is line-oriented — one space-separated id-set per
//! line — and reloadable without loss via [`read_id_sets`]. Purging is pure
//! append-only concatenation, so for a fixed push sequence the persisted
//! bytes do not depend on the buffer threshold.
//!
//! An unrecognized method name is a configuration error raised at parse time,
//! never a silent default.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::str::FromStr;

use camino::Utf8Path;
use itertools::Itertools;
use smallvec::SmallVec;

use crate::constants::DetectionId;
use crate::daylink_errors::DaylinkError;

/// A sorted set of detection identities, inline-optimized for the common
/// two-detection tracklet case.
pub type IdSet = SmallVec<[DetectionId; 4]>;

/// How the engines deliver their results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMethod {
    /// Keep everything in memory; the caller retains the collection.
    ReturnResults,
    /// Stream to a file, persisting every append immediately.
    IdsFile,
    /// Stream to a file through a size-bounded in-memory cache.
    IdsFileWithCache,
}

impl FromStr for OutputMethod {
    type Err = DaylinkError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "return-results" => Ok(OutputMethod::ReturnResults),
            "ids-file" => Ok(OutputMethod::IdsFile),
            "ids-file-with-cache" => Ok(OutputMethod::IdsFileWithCache),
            other => Err(DaylinkError::UnknownOutputMethod(other.to_string())),
        }
    }
}

/// Buffered/streaming sink for id-sets.
///
/// Single-writer by construction: it is only ever appended to from inside the
/// formation engine's merge lock or from the linking master.
#[derive(Debug)]
pub struct IdSetStore {
    records: Vec<IdSet>,
    writer: Option<BufWriter<File>>,
    /// Purge threshold in estimated bytes; 0 means purge on every push.
    buffer_bytes: usize,
    buffered_bytes: usize,
    persisted_records: usize,
}

impl IdSetStore {
    /// In-memory store; [`IdSetStore::into_records`] yields the results.
    pub fn in_memory() -> Self {
        IdSetStore {
            records: Vec::new(),
            writer: None,
            buffer_bytes: usize::MAX,
            buffered_bytes: 0,
            persisted_records: 0,
        }
    }

    /// Unbuffered streaming store: every append is persisted immediately.
    pub fn streaming(path: &Utf8Path) -> Result<Self, DaylinkError> {
        Self::to_file(path, 0)
    }

    /// Buffered streaming store purging once the estimated in-memory size
    /// crosses `buffer_bytes`.
    pub fn buffered(path: &Utf8Path, buffer_bytes: usize) -> Result<Self, DaylinkError> {
        Self::to_file(path, buffer_bytes)
    }

    fn to_file(path: &Utf8Path, buffer_bytes: usize) -> Result<Self, DaylinkError> {
        let file = File::create(path)?;
        Ok(IdSetStore {
            records: Vec::new(),
            writer: Some(BufWriter::new(file)),
            buffer_bytes,
            buffered_bytes: 0,
            persisted_records: 0,
        })
    }

    /// Build a store from an [`OutputMethod`] and its parameters.
    ///
    /// Arguments
    /// ---------
    /// * `method`: the delivery mode
    /// * `path`: output file, required by the two file modes
    /// * `buffer_bytes`: purge threshold for `IdsFileWithCache`
    ///
    /// Return
    /// ------
    /// * the configured store, or an `InvalidConfiguration` error when a file
    ///   mode is requested without a path
    pub fn from_method(
        method: OutputMethod,
        path: Option<&Utf8Path>,
        buffer_bytes: usize,
    ) -> Result<Self, DaylinkError> {
        fn require_path(path: Option<&Utf8Path>) -> Result<&Utf8Path, DaylinkError> {
            path.ok_or_else(|| {
                DaylinkError::InvalidConfiguration(
                    "file output method requires an output path".into(),
                )
            })
        }
        match method {
            OutputMethod::ReturnResults => Ok(Self::in_memory()),
            OutputMethod::IdsFile => Self::streaming(require_path(path)?),
            OutputMethod::IdsFileWithCache => Self::buffered(require_path(path)?, buffer_bytes),
        }
    }

    /// Append one id-set.
    ///
    /// In the file modes the record may be persisted now (unbuffered, or the
    /// buffer threshold was crossed) or on a later purge; it is never lost.
    pub fn push(&mut self, ids: &[DetectionId]) -> Result<(), DaylinkError> {
        self.records.push(IdSet::from_slice(ids));
        self.buffered_bytes +=
            std::mem::size_of::<IdSet>() + ids.len() * std::mem::size_of::<DetectionId>();
        if self.writer.is_some() && self.buffered_bytes > self.buffer_bytes {
            self.purge()?;
        }
        Ok(())
    }

    /// Flush every buffered record to persistent storage and clear the buffer.
    ///
    /// A no-op for the in-memory mode. Must be called once at run end for the
    /// file modes; it is also invoked internally at each threshold crossing,
    /// atomically with respect to other appends (the store is single-writer).
    pub fn purge(&mut self) -> Result<(), DaylinkError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        for record in &self.records {
            writeln!(writer, "{}", record.iter().join(" "))?;
        }
        writer.flush()?;
        self.persisted_records += self.records.len();
        self.records.clear();
        self.buffered_bytes = 0;
        Ok(())
    }

    /// Total records appended so far, persisted or still buffered.
    pub fn len(&self) -> usize {
        self.persisted_records + self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take the in-memory result collection (the `ReturnResults` contract).
    pub fn into_records(self) -> Vec<IdSet> {
        self.records
    }
}

/// Reload persisted id-sets, one line per set.
///
/// Arguments
/// ---------
/// * `path`: a file previously produced through an [`IdSetStore`]
///
/// Return
/// ------
/// * the id-sets in file order, or a parse error naming the offending line
pub fn read_id_sets(path: &Utf8Path) -> Result<Vec<Vec<DetectionId>>, DaylinkError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(|token| {
                    token.parse::<DetectionId>().map_err(|_| {
                        DaylinkError::IdSetParseError(format!("bad id {token:?} in {line:?}"))
                    })
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod output_tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn temp_path(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_unknown_method_is_an_error() {
        let err = "ids-database".parse::<OutputMethod>();
        assert!(matches!(err, Err(DaylinkError::UnknownOutputMethod(_))));
    }

    #[test]
    fn test_file_method_requires_path() {
        let err = IdSetStore::from_method(OutputMethod::IdsFile, None, 0);
        assert!(matches!(err, Err(DaylinkError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_from_method_builds_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "method.ids");

        let mut store =
            IdSetStore::from_method(OutputMethod::IdsFileWithCache, Some(&path), usize::MAX)
                .unwrap();
        store.push(&[1, 2]).unwrap();
        store.purge().unwrap();

        assert_eq!(read_id_sets(&path).unwrap(), vec![vec![1, 2]]);
    }

    #[test]
    fn test_in_memory_round_trip() {
        let mut store = IdSetStore::in_memory();
        store.push(&[3, 7]).unwrap();
        store.push(&[1, 2, 5]).unwrap();
        store.purge().unwrap();
        let records = store.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_slice(), &[3, 7]);
        assert_eq!(records[1].as_slice(), &[1, 2, 5]);
    }

    #[test]
    fn test_streaming_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = temp_path(&dir, "tracklets.ids");

        let mut store = IdSetStore::streaming(&path).unwrap();
        store.push(&[10, 20]).unwrap();
        store.push(&[30, 40]).unwrap();
        store.purge().unwrap();

        let sets = read_id_sets(&path).unwrap();
        assert_eq!(sets, vec![vec![10, 20], vec![30, 40]]);
    }

    #[test]
    fn test_buffer_threshold_does_not_change_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let small = temp_path(&dir, "small_buffer.ids");
        let large = temp_path(&dir, "large_buffer.ids");

        let sets: Vec<Vec<DetectionId>> =
            (0..100).map(|i| vec![i, i + 1000, i + 2000]).collect();

        let mut store = IdSetStore::buffered(&small, 64).unwrap();
        for ids in &sets {
            store.push(ids).unwrap();
        }
        store.purge().unwrap();

        let mut store = IdSetStore::buffered(&large, usize::MAX).unwrap();
        for ids in &sets {
            store.push(ids).unwrap();
        }
        store.purge().unwrap();

        let a = std::fs::read(&small).unwrap();
        let b = std::fs::read(&large).unwrap();
        assert_eq!(a, b);
        assert_eq!(read_id_sets(&large).unwrap(), sets);
    }
}
