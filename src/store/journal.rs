use crate::memory::LedgerOp;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only JSONL file of [`LedgerOp`]s, one per line.
pub(crate) struct Journal {
    path: PathBuf,
    file: File,
}

/// Position and hash of a freshly written line.
pub(crate) struct Appended {
    pub end_offset: u64,
    pub line_hash: String,
}

/// xxh64 of a line's bytes (without the trailing newline), hex-encoded.
pub(crate) fn line_hash(line: &[u8]) -> String {
    let hash = xxhash_rust::xxh64::xxh64(line, 0);
    format!("{:016x}", hash)
}

impl Journal {
    pub(crate) fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Journal { path, file })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `op` as one line, append it and sync to disk.
    pub(crate) fn append(&mut self, op: &LedgerOp) -> io::Result<Appended> {
        let start = self.file.seek(SeekFrom::End(0))?;
        let json =
            serde_json::to_string(op).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(self.file, "{json}")?;
        self.file.sync_data()?;
        Ok(Appended {
            end_offset: start + json.len() as u64 + 1,
            line_hash: line_hash(json.as_bytes()),
        })
    }

    pub(crate) fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Cut the file back to `len` bytes, dropping an incomplete tail.
    pub(crate) fn truncate(&mut self, len: u64) -> io::Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_data()
    }

    /// Iterate ops starting at byte `offset`, yielding
    /// `(op, next_offset, line_hash)`. Blank lines are skipped; a final line
    /// without its newline is treated as not yet written.
    pub(crate) fn read_from(
        &self,
        offset: u64,
    ) -> io::Result<impl Iterator<Item = io::Result<(LedgerOp, u64, String)>>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        Ok(OpIterator {
            reader: BufReader::new(file),
            pos: offset,
            buf: Vec::new(),
        })
    }

    /// Hash of the line that ends right before `offset`, or `None` if
    /// `offset` is 0 or past the end of the file.
    pub(crate) fn line_hash_before(&self, offset: u64) -> io::Result<Option<String>> {
        if offset == 0 {
            return Ok(None);
        }
        let mut file = File::open(&self.path)?;
        if offset > file.metadata()?.len() {
            return Ok(None);
        }

        // offset - 1 is the newline closing the line we want
        let end = offset - 1;
        let start = line_start(&mut file, end)?;
        file.seek(SeekFrom::Start(start))?;
        let mut line = vec![0u8; (end - start) as usize];
        file.read_exact(&mut line)?;
        Ok(Some(line_hash(&line)))
    }
}

const SCAN_CHUNK: usize = 8 * 1024;

/// Position just past the last newline before `end`, or 0 if the line
/// starts the file. Walks backwards a chunk at a time, so a line of any
/// length is found whole.
fn line_start(file: &mut File, end: u64) -> io::Result<u64> {
    let mut chunk = vec![0u8; SCAN_CHUNK];
    let mut hi = end;
    while hi > 0 {
        let lo = hi.saturating_sub(SCAN_CHUNK as u64);
        let window = &mut chunk[..(hi - lo) as usize];
        file.seek(SeekFrom::Start(lo))?;
        file.read_exact(window)?;
        if let Some(pos) = window.iter().rposition(|&b| b == b'\n') {
            return Ok(lo + pos as u64 + 1);
        }
        hi = lo;
    }
    Ok(0)
}

struct OpIterator {
    reader: BufReader<File>,
    pos: u64,
    buf: Vec<u8>,
}

impl Iterator for OpIterator {
    type Item = io::Result<(LedgerOp, u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            let read = match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => return Some(Err(e)),
            };
            // no newline yet: a torn write
            let Some(line) = self.buf.strip_suffix(b"\n") else {
                return None;
            };
            self.pos += read as u64;

            if line.is_empty() {
                continue;
            }
            return Some(
                serde_json::from_slice::<LedgerOp>(line)
                    .map(|op| (op, self.pos, line_hash(line)))
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Vehicle;
    use std::fs;

    fn put(id: &str) -> LedgerOp {
        LedgerOp::VehiclePut {
            vehicle: Vehicle::new(id, "car", 50.0, 0.0, 10.0),
        }
    }

    #[test]
    fn append_reports_offsets_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path().join("ledger.jsonl")).unwrap();
        let first = journal.append(&put("a")).unwrap();
        let second = journal.append(&put("b")).unwrap();
        assert_eq!(second.end_offset, journal.len().unwrap());

        let read: Vec<_> = journal
            .read_from(0)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].1, first.end_offset);
        assert_eq!(read[0].2, first.line_hash);
        assert_eq!(read[1].0, put("b"));

        assert_eq!(
            journal.line_hash_before(second.end_offset).unwrap(),
            Some(second.line_hash)
        );
        assert_eq!(journal.line_hash_before(0).unwrap(), None);
    }

    #[test]
    fn torn_tail_is_not_yielded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut journal = Journal::open(&path).unwrap();
        let first = journal.append(&put("a")).unwrap();

        let mut raw = fs::OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(br#"{"op":"vehicle_put","vehi"#).unwrap();
        drop(raw);

        let read: Vec<_> = journal
            .read_from(0)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(read.len(), 1);

        journal.truncate(first.end_offset).unwrap();
        assert_eq!(journal.len().unwrap(), first.end_offset);
    }

    #[test]
    fn garbage_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        fs::write(&path, "not json\n").unwrap();
        let journal = Journal::open(&path).unwrap();
        let first = journal.read_from(0).unwrap().next().unwrap();
        assert_eq!(first.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn hash_of_line_longer_than_scan_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::open(dir.path().join("ledger.jsonl")).unwrap();
        journal.append(&put("a")).unwrap();
        let long = LedgerOp::VehiclePut {
            vehicle: Vehicle::new("b", "x".repeat(3 * SCAN_CHUNK + 17), 50.0, 0.0, 10.0),
        };
        let appended = journal.append(&long).unwrap();
        assert_eq!(
            journal.line_hash_before(appended.end_offset).unwrap(),
            Some(appended.line_hash)
        );

        // the long line also hashes whole when it starts the file
        let other = tempfile::tempdir().unwrap();
        let mut first = Journal::open(other.path().join("ledger.jsonl")).unwrap();
        let appended = first.append(&long).unwrap();
        assert_eq!(
            first.line_hash_before(appended.end_offset).unwrap(),
            Some(appended.line_hash)
        );
    }
}
