//! Append-only, line-oriented sample logs.

use super::CsvRow;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Writes one flushed line per sample after an optional header.
pub struct SampleLog<W: Write> {
    writer: W,
    written: usize,
}

impl SampleLog<File> {
    /// Open `path` for appending. The header is written only if the file is
    /// new or empty.
    pub fn open(path: impl AsRef<Path>, header: &str) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        if file.metadata()?.len() == 0 {
            Self::with_header(file, header)
        } else {
            Ok(Self::without_header(file))
        }
    }
}

impl<W: Write> SampleLog<W> {
    /// Start a fresh log on `writer`.
    pub fn with_header(mut writer: W, header: &str) -> io::Result<Self> {
        writeln!(writer, "{}", header)?;
        writer.flush()?;
        Ok(Self { writer, written: 0 })
    }

    /// Continue an existing log.
    pub fn without_header(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Append one record.
    pub fn append<T: CsvRow>(&mut self, record: &T) -> io::Result<()> {
        writeln!(self.writer, "{}", record.row())?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Records appended through this handle.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::WakeTimingSample;
    use std::env;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn unique_path() -> std::path::PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        env::temp_dir().join(format!("sample-log-test-{}-{}.csv", std::process::id(), id))
    }

    #[test]
    fn test_header_then_rows() {
        let mut log = SampleLog::with_header(Vec::new(), "elapsed_ms").unwrap();
        log.append(&WakeTimingSample { elapsed_ms: 312 }).unwrap();
        log.append(&WakeTimingSample { elapsed_ms: 298 }).unwrap();
        assert_eq!(log.written(), 2);
        assert_eq!(
            String::from_utf8(log.into_inner()).unwrap(),
            "elapsed_ms\n312\n298\n"
        );
    }

    #[test]
    fn test_reopen_does_not_repeat_header() {
        let path = unique_path();
        {
            let mut log = SampleLog::open(&path, "elapsed_ms").unwrap();
            log.append(&WakeTimingSample { elapsed_ms: 1 }).unwrap();
        }
        {
            let mut log = SampleLog::open(&path, "elapsed_ms").unwrap();
            log.append(&WakeTimingSample { elapsed_ms: 2 }).unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "elapsed_ms\n1\n2\n");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let path = unique_path();
        fs::write(&path, b"").unwrap();
        SampleLog::open(&path, "elapsed_ms").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "elapsed_ms\n");
        let _ = fs::remove_file(&path);
    }
}
