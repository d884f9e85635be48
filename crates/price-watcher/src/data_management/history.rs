use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::data_management::store::{lock, PriceLog, PriceStore};
use crate::types::{AssetPair, PricePoint, PriceWatcherError, Result};

const HEADER: &str = "id,created_at,token0,token1,price";

/// Price history persisted as an append-only CSV file.
///
/// Existing rows are loaded on `open`; queries are answered from memory and
/// every insert appends one row and flushes it. A point becomes visible to
/// readers only once its row is on disk.
pub struct CsvPriceStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    log: PriceLog,
    writer: Option<BufWriter<File>>,
    // file length after the last complete row
    committed: u64,
}

fn store_err(path: &Path, e: impl std::fmt::Display) -> PriceWatcherError {
    PriceWatcherError::Store(format!("{}: {}", path.display(), e))
}

impl CsvPriceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut log = PriceLog::default();
        let exists = path.exists();
        if exists {
            let file = File::open(&path).map_err(|e| store_err(&path, e))?;
            for (lineno, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| store_err(&path, e))?;
                if line.trim().is_empty() || (lineno == 0 && line.trim() == HEADER) {
                    continue;
                }
                let point = parse_row(&line).map_err(|e| store_err(&path, format!("line {}: {}", lineno + 1, e)))?;
                log.restore(point);
            }
        }

        let needs_header = !exists || std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| store_err(&path, e))?;
        let mut writer = BufWriter::new(file);
        if needs_header {
            writeln!(writer, "{}", HEADER).map_err(|e| store_err(&path, e))?;
            writer.flush().map_err(|e| store_err(&path, e))?;
        }
        let committed = writer.get_ref().metadata().map_err(|e| store_err(&path, e))?.len();
        info!(path = %path.display(), rows = log.len(), "opened price history");
        Ok(Self { path, inner: Mutex::new(Inner { log, writer: Some(writer), committed }) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the file. Later inserts fail; reads keep working.
    pub fn close(&self) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        if let Some(mut writer) = inner.writer.take() {
            writer.flush().map_err(|e| store_err(&self.path, e))?;
            debug!(path = %self.path.display(), "closed price history");
        }
        Ok(())
    }
}

fn parse_row(line: &str) -> std::result::Result<PricePoint, String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 columns, found {}", fields.len()));
    }
    let id = fields[0].parse::<u64>().map_err(|e| format!("bad id {:?}: {}", fields[0], e))?;
    let created_at = DateTime::parse_from_rfc3339(fields[1])
        .map_err(|e| format!("bad timestamp {:?}: {}", fields[1], e))?
        .with_timezone(&Utc);
    let price = Decimal::from_str(fields[4]).map_err(|e| format!("bad price {:?}: {}", fields[4], e))?;
    Ok(PricePoint { id, pair: AssetPair::new(fields[2], fields[3]), price, created_at })
}

fn check_field(value: &str) -> Result<()> {
    if value.is_empty() || value.contains([',', '\n', '\r']) {
        return Err(PriceWatcherError::Store(format!("asset identifier {:?} cannot be stored", value)));
    }
    Ok(())
}

/// Drop whatever is still buffered and cut the file back to its last complete
/// row, so a failed write leaves no torn line behind.
fn discard_partial(writer: BufWriter<File>, committed: u64) -> BufWriter<File> {
    let (file, _unwritten) = writer.into_parts();
    if let Err(e) = file.set_len(committed) {
        warn!(error = %e, committed, "could not truncate partial price row");
    }
    BufWriter::new(file)
}

impl PriceStore for CsvPriceStore {
    fn insert(&self, pair: &AssetPair, price: Decimal) -> Result<PricePoint> {
        check_field(&pair.base)?;
        check_field(&pair.quote)?;
        let mut inner = lock(&self.inner)?;
        let Inner { log, writer, committed } = &mut *inner;
        let mut out = writer
            .take()
            .ok_or_else(|| PriceWatcherError::Store("price history is closed".to_string()))?;

        let created_at = Utc::now();
        let row = format!(
            "{},{},{},{},{}\n",
            log.peek_id(),
            created_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            pair.base,
            pair.quote,
            price
        );
        match out.write_all(row.as_bytes()).and_then(|_| out.flush()) {
            Ok(()) => {
                *committed += row.len() as u64;
                *writer = Some(out);
                Ok(log.push_point(pair.clone(), price, created_at))
            }
            Err(e) => {
                *writer = Some(discard_partial(out, *committed));
                Err(store_err(&self.path, e))
            }
        }
    }

    fn last_for_pair(&self, pair: &AssetPair) -> Result<PricePoint> {
        lock(&self.inner)?.log.last_for_pair(pair)
    }

    fn all_for_pair(&self, pair: &AssetPair) -> Result<Vec<PricePoint>> {
        Ok(lock(&self.inner)?.log.all_for_pair(pair))
    }

    fn in_range(&self, pair: &AssetPair, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<PricePoint>> {
        Ok(lock(&self.inner)?.log.in_range(pair, start, end))
    }
}

impl Drop for CsvPriceStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    /// Store whose file rejects every write with ENOSPC.
    fn full_disk_store() -> Option<CsvPriceStore> {
        let file = OpenOptions::new().append(true).open("/dev/full").ok()?;
        Some(CsvPriceStore {
            path: PathBuf::from("/dev/full"),
            inner: Mutex::new(Inner { log: PriceLog::default(), writer: Some(BufWriter::new(file)), committed: 0 }),
        })
    }

    #[test]
    fn failed_write_is_not_visible() {
        let Some(store) = full_disk_store() else { return };
        let pair = AssetPair::new("weth", "dai");
        for _ in 0..3 {
            assert!(matches!(store.insert(&pair, Decimal::ONE), Err(PriceWatcherError::Store(_))));
        }
        assert!(store.all_for_pair(&pair).unwrap().is_empty());
        assert!(matches!(store.last_for_pair(&pair), Err(PriceWatcherError::NotFound(_))));
        let inner = lock(&store.inner).unwrap();
        assert_eq!(inner.log.peek_id(), 1);
        assert!(inner.writer.as_ref().unwrap().buffer().is_empty());
    }
}
