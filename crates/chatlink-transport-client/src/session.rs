use std::path::{Path, PathBuf};

use chatlink_core::UploadError;
use tokio::fs::File;

/// Book-keeping for one file transfer.
///
/// `bytes_sent` never exceeds `file_size`, and [`record_sent`] reports each
/// integer percentage at most once, in increasing order.
///
/// [`record_sent`]: UploadSession::record_sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    bytes_sent: u64,
    last_percent: u8,
}

impl UploadSession {
    pub fn new(path: PathBuf, file_name: String, file_size: u64) -> Self {
        Self { path, file_name, file_size, bytes_sent: 0, last_percent: 0 }
    }

    /// Check the upload preconditions on disk and open the file.
    pub(crate) async fn open(path: &Path, limit: u64) -> Result<(Self, File), UploadError> {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(UploadError::FileNotFound { path: path.to_owned() }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(UploadError::FileNotFound { path: path.to_owned() })
            }
            Err(e) => return Err(UploadError::Io { reason: format!("reading metadata: {}", e) }),
        };

        let size = meta.len();
        if size > limit {
            return Err(UploadError::FileTooLarge { size, limit });
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let file = File::open(path)
            .await
            .map_err(|e| UploadError::Io { reason: format!("opening file: {}", e) })?;

        Ok((Self::new(path.to_owned(), file_name, size), file))
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn last_percent(&self) -> u8 {
        self.last_percent
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_sent == self.file_size
    }

    /// Account for `n` more bytes on the wire. Returns the new percentage
    /// when it has grown since the last report.
    pub fn record_sent(&mut self, n: u64) -> Option<u8> {
        debug_assert!(self.bytes_sent + n <= self.file_size);
        self.bytes_sent = (self.bytes_sent + n).min(self.file_size);
        self.bump_percent()
    }

    /// Final report once every byte is out. Only yields something for an
    /// empty file, which never reaches 100% through [`record_sent`](Self::record_sent).
    pub fn finish(&mut self) -> Option<u8> {
        if self.is_complete() {
            self.bump_percent()
        } else {
            None
        }
    }

    fn bump_percent(&mut self) -> Option<u8> {
        let pct = if self.file_size == 0 {
            100
        } else {
            (self.bytes_sent * 100 / self.file_size) as u8
        };
        if pct > self.last_percent {
            self.last_percent = pct;
            Some(pct)
        } else {
            None
        }
    }
}
