use std::collections::{BTreeMap, BinaryHeap, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info, warn};

use crate::error::LogdirError;
use crate::record::Record;
use crate::source::filename::date_from_basename;

type RowIter = csv::DeserializeRecordsIntoIter<File, BTreeMap<String, String>>;

/// Parse an intra-day ISO-8601 time of day the way Python's
/// `datetime.time.fromisoformat` does: `HH:MM:SS[.ffffff]` or the
/// shorter `HH:MM` form, whichever matches first. `NaiveTime`'s own
/// `FromStr` only accepts the first of these, which would reject a
/// valid `09:05`-style column the reference happily parses.
fn parse_iso_time(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
}

struct ActiveReader {
    path: PathBuf,
    iter: RowIter,
    count: u64,
}

/// One pending row from an open file of the active date, ordered by its
/// intra-day time so the per-date merge can always pop the oldest.
struct HeapEntry {
    time: NaiveTime,
    reader_idx: usize,
    record: Record,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.reader_idx) == (other.time, other.reader_idx)
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.time, self.reader_idx).cmp(&(other.time, other.reader_idx))
    }
}

/// Presents one directory of dated CSV log files as a single, date-sorted,
/// timestamp-sorted, single-pass record stream. See spec.md §4.1.
pub struct LogdirStream {
    source_id: String,
    remaining_dates: VecDeque<NaiveDate>,
    files_by_date: BTreeMap<NaiveDate, Vec<PathBuf>>,
    active_date: Option<NaiveDate>,
    active_readers: Vec<ActiveReader>,
    heap: BinaryHeap<std::cmp::Reverse<HeapEntry>>,
    total_count: u64,
    poisoned: bool,
}

impl LogdirStream {
    /// Scan `path` for files whose basename yields a recognisable date,
    /// grouping them by date. Files that match no pattern are logged at
    /// `warn` and excluded, per spec.md §4.1.
    pub fn new(path: &Path, source_id: Option<String>) -> Result<Self, LogdirError> {
        let source_id = source_id.unwrap_or_else(|| path.display().to_string());

        let mut files_by_date: BTreeMap<NaiveDate, Vec<PathBuf>> = BTreeMap::new();
        let mut file_count = 0u32;

        let entries = std::fs::read_dir(path).map_err(|source| LogdirError::ReadDir {
            path: path.to_path_buf(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| LogdirError::ReadDir {
                path: path.to_path_buf(),
                source,
            })?;
            let entry_path = entry.path();
            if !entry_path.is_file() {
                continue;
            }
            let basename = entry_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match date_from_basename(&basename) {
                Some(date) => {
                    debug!(source = %source_id, file = %basename, %date, "found input file");
                    files_by_date.entry(date).or_default().push(entry_path);
                    file_count += 1;
                }
                None => {
                    warn!(source = %source_id, file = %basename, "skipping file: unrecognised date pattern");
                }
            }
        }

        info!(
            source = %source_id,
            files = file_count,
            dates = files_by_date.len(),
            "found input files"
        );

        let remaining_dates = files_by_date.keys().copied().collect();

        Ok(Self {
            source_id,
            remaining_dates,
            files_by_date,
            active_date: None,
            active_readers: Vec::new(),
            heap: BinaryHeap::new(),
            total_count: 0,
            poisoned: false,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Open every file belonging to the next date and seed the heap with
    /// each file's first row. Returns `Ok(false)` when there are no more
    /// dates (end of stream).
    fn open_next_date(&mut self) -> Result<bool, LogdirError> {
        // release the previous date's handles before opening the next one
        self.active_readers.clear();

        let Some(date) = self.remaining_dates.pop_front() else {
            info!(source = %self.source_id, records = self.total_count, "stream exhausted");
            return Ok(false);
        };

        debug!(source = %self.source_id, %date, "processing date");
        self.active_date = Some(date);

        let paths = self.files_by_date.remove(&date).unwrap_or_default();
        for path in paths {
            let file = File::open(&path).map_err(|source| LogdirError::OpenFile {
                path: path.clone(),
                source,
            })?;
            let reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
            let mut iter = reader.into_deserialize::<BTreeMap<String, String>>();
            debug!(source = %self.source_id, path = %path.display(), "opened reader");

            let reader_idx = self.active_readers.len();
            let first_row = Self::pull_row(&mut iter, &path)?;

            match first_row {
                Some(row) => {
                    let time = Self::extract_time(&row, &path)?;
                    self.active_readers.push(ActiveReader {
                        path: path.clone(),
                        iter,
                        count: 1,
                    });
                    self.heap.push(std::cmp::Reverse(HeapEntry {
                        time,
                        reader_idx,
                        record: Record::from_fields(row),
                    }));
                }
                None => {
                    info!(source = %self.source_id, path = %path.display(), records = 0, "reader closed");
                    self.active_readers.push(ActiveReader {
                        path,
                        iter,
                        count: 0,
                    });
                }
            }
        }

        Ok(true)
    }

    fn pull_row(
        iter: &mut RowIter,
        path: &Path,
    ) -> Result<Option<BTreeMap<String, String>>, LogdirError> {
        match iter.next() {
            None => Ok(None),
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(source)) => Err(LogdirError::Csv {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn extract_time(row: &BTreeMap<String, String>, path: &Path) -> Result<NaiveTime, LogdirError> {
        let raw = row
            .get("timestamp")
            .ok_or_else(|| LogdirError::MissingTimestamp {
                path: path.to_path_buf(),
            })?;
        parse_iso_time(raw).map_err(|source| LogdirError::BadTimestamp {
            path: path.to_path_buf(),
            value: raw.clone(),
            source,
        })
    }

    fn step(&mut self) -> Result<Option<Record>, LogdirError> {
        loop {
            if self.heap.is_empty() {
                if !self.open_next_date()? {
                    return Ok(None);
                }
                continue;
            }

            let std::cmp::Reverse(HeapEntry {
                time,
                reader_idx,
                mut record,
            }) = self.heap.pop().unwrap();

            let path = self.active_readers[reader_idx].path.clone();
            match Self::pull_row(&mut self.active_readers[reader_idx].iter, &path)? {
                Some(row) => {
                    let next_time = Self::extract_time(&row, &path)?;
                    self.active_readers[reader_idx].count += 1;
                    self.heap.push(std::cmp::Reverse(HeapEntry {
                        time: next_time,
                        reader_idx,
                        record: Record::from_fields(row),
                    }));
                }
                None => {
                    info!(
                        source = %self.source_id,
                        path = %path.display(),
                        records = self.active_readers[reader_idx].count,
                        "reader closed"
                    );
                }
            }

            if record.trade_id().is_none() {
                return Err(LogdirError::MissingTrade { path });
            }

            let date = self
                .active_date
                .expect("active date set while heap non-empty");
            record.set_timestamp(NaiveDateTime::new(date, time));

            self.total_count += 1;
            return Ok(Some(record));
        }
    }
}

impl Iterator for LogdirStream {
    type Item = Result<Record, LogdirError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.poisoned {
            return None;
        }
        match self.step() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.poisoned = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        let mut f = File::create(path).unwrap();
        write!(f, "{}", contents).unwrap();
    }

    #[test]
    fn hh_mm_timestamp_without_seconds_is_accepted() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "20260101.csv",
            "timestamp,trade,symbol,price,quantity\n09:05,T1,AAPL,100,10\n",
        );

        let stream = LogdirStream::new(dir.path(), None).unwrap();
        let records: Vec<Record> = stream.map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].timestamp().unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(9, 5, 0)
                .unwrap()
        );
    }

    #[test]
    fn single_file_single_date() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "20260101.csv",
            "timestamp,trade,symbol,price,quantity\n\
             10:00:00,T1,AAPL,100,10\n\
             10:00:05,T2,MSFT,200,5\n",
        );

        let stream = LogdirStream::new(dir.path(), None).unwrap();
        let records: Vec<Record> = stream.map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].trade_id(), Some("T1"));
        assert_eq!(
            records[0].timestamp().unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap()
        );
        assert_eq!(records[1].trade_id(), Some("T2"));
    }

    #[test]
    fn merges_multiple_files_same_date_by_time() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "20260101_a.csv",
            "timestamp,trade,symbol,price,quantity\n10:00:05,T2,MSFT,200,5\n",
        );
        write_file(
            dir.path(),
            "20260101_b.csv",
            "timestamp,trade,symbol,price,quantity\n10:00:00,T1,AAPL,100,10\n",
        );

        let stream = LogdirStream::new(dir.path(), None).unwrap();
        let records: Vec<Record> = stream.map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].trade_id(), Some("T1"));
        assert_eq!(records[1].trade_id(), Some("T2"));
    }

    #[test]
    fn processes_dates_in_ascending_order() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "20260102.csv",
            "timestamp,trade,symbol,price,quantity\n09:00:00,T_DAY2,AAPL,100,10\n",
        );
        write_file(
            dir.path(),
            "20260101.csv",
            "timestamp,trade,symbol,price,quantity\n23:00:00,T_DAY1,AAPL,100,10\n",
        );

        let stream = LogdirStream::new(dir.path(), None).unwrap();
        let records: Vec<Record> = stream.map(|r| r.unwrap()).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].trade_id(), Some("T_DAY1"));
        assert_eq!(records[1].trade_id(), Some("T_DAY2"));
        assert!(records[0].timestamp().unwrap() < records[1].timestamp().unwrap());
    }

    #[test]
    fn unrecognised_filename_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        write_file(
            dir.path(),
            "20260101.csv",
            "timestamp,trade,symbol,price,quantity\n10:00:00,T1,AAPL,100,10\n",
        );
        write_file(dir.path(), "README.txt", "not a log file");

        let stream = LogdirStream::new(dir.path(), None).unwrap();
        let records: Vec<Record> = stream.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_timestamp_column_is_fatal() {
        let dir = tempdir().unwrap();
        write_file(dir.path(), "20260101.csv", "trade,symbol\nT1,AAPL\n");

        let mut stream = LogdirStream::new(dir.path(), None).unwrap();
        let first = stream.next().unwrap();
        assert!(first.is_err());
    }

    #[test]
    fn empty_directory_yields_empty_stream() {
        let dir = tempdir().unwrap();
        let stream = LogdirStream::new(dir.path(), None).unwrap();
        let records: Vec<_> = stream.collect();
        assert!(records.is_empty());
    }
}
