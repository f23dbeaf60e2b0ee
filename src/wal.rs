//! Write-ahead log of hotel events.
//!
//! Each record is `[u32 len][bincode Event][u32 crc32]`, little endian.
//! A commit is written as one frame and fsynced before it is acknowledged.
//! The file only ever holds whole commits: a torn tail left by a crash is
//! cut off when the log is recovered, and a commit that fails mid-write is
//! rolled back to the previous length.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::limits::MAX_EVENT_BYTES;
use crate::model::Event;

const HEADER_BYTES: u64 = 4;
const CRC_BYTES: u64 = 4;

fn encode_event(frame: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_EVENT_BYTES {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("event of {} bytes exceeds {MAX_EVENT_BYTES}", payload.len()),
        ));
    }
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// Read one record. `None` means the log ends here: clean EOF, a torn
/// record, or bytes that fail the length cap, CRC or decode.
fn read_record(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_EVENT_BYTES {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    let mut crc_buf = [0u8; 4];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }

    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, HEADER_BYTES + len as u64 + CRC_BYTES)))
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Valid prefix of a log file.
#[derive(Debug, Default)]
pub struct Replayed {
    pub events: Vec<Event>,
    /// Byte length of the whole records in `events`.
    pub valid_len: u64,
    /// Bytes after `valid_len` that did not form a valid record.
    pub discarded: u64,
}

pub struct Wal {
    file: File,
    path: PathBuf,
    /// Length of the file up to the last acknowledged commit.
    len: u64,
    appends_since_compact: u64,
    /// Set when a failed commit could not be rolled back. Later commits
    /// would land after garbage and be lost on replay, so they are refused.
    poisoned: bool,
}

impl Wal {
    /// Read every valid record from `path` without modifying it.
    pub fn replay(path: &Path) -> io::Result<Replayed> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Replayed::default()),
            Err(e) => return Err(e),
        };
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut replayed = Replayed::default();
        while let Some((event, size)) = read_record(&mut reader)? {
            replayed.events.push(event);
            replayed.valid_len += size;
        }
        replayed.discarded = file_len - replayed.valid_len;
        Ok(replayed)
    }

    /// Replay `path` and open it for appending. Any invalid tail is cut off
    /// first so new commits follow the last valid record.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let replayed = Self::replay(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if replayed.discarded > 0 {
            tracing::warn!(
                path = %path.display(),
                valid_len = replayed.valid_len,
                discarded = replayed.discarded,
                "truncating invalid WAL tail"
            );
            file.set_len(replayed.valid_len)?;
            file.sync_all()?;
        }

        let wal = Self {
            file,
            path: path.to_path_buf(),
            len: replayed.valid_len,
            appends_since_compact: 0,
            poisoned: false,
        };
        Ok((wal, replayed.events))
    }

    /// Durably append `events` as one unit. On error nothing of the
    /// commit remains in the file.
    pub fn commit<'a>(&mut self, events: impl IntoIterator<Item = &'a Event>) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("WAL is unwritable after a failed rollback"));
        }

        let mut frame = Vec::new();
        let mut count = 0;
        for event in events {
            encode_event(&mut frame, event)?;
            count += 1;
        }
        if frame.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.write_frame(&frame) {
            self.rollback();
            return Err(e);
        }
        self.len += frame.len() as u64;
        self.appends_since_compact += count;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.write_all(frame)?;
        self.file.sync_data()
    }

    fn rollback(&mut self) {
        let restored = self
            .file
            .set_len(self.len)
            .and_then(|()| self.file.sync_all());
        if let Err(e) = restored {
            tracing::error!(
                path = %self.path.display(),
                len = self.len,
                "WAL rollback failed, refusing further commits: {e}"
            );
            self.poisoned = true;
        }
    }

    /// Replace the log with `events` through a temp file and rename.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        let mut frame = Vec::new();
        for event in events {
            encode_event(&mut frame, event)?;
        }
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&frame)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        sync_parent_dir(&self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = frame.len() as u64;
        self.appends_since_compact = 0;
        self.poisoned = false;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}
