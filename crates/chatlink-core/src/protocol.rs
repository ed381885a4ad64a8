//! Wire constants shared with the chat server.
//!
//! Both connections are plain UTF-8 byte streams with no length prefixes and
//! no delimiters; every control string below is written as-is.

/// Token written by the messaging connection right after connect.
pub const MSG_HANDSHAKE_TOKEN: &str = "HANDSHAKE_REQUEST";
/// Token written by the upload connection right after connect.
pub const UPLOAD_HANDSHAKE_TOKEN: &str = "FILE_UPLOAD_HANDSHAKE";
/// Suffix of the acknowledgment variant a server may answer with.
pub const HANDSHAKE_OK_SUFFIX: &str = "_OK";

pub const UPLOAD_START: &str = "FILE_UPLOAD_START";
pub const UPLOAD_END: &str = "FILE_UPLOAD_END";
pub const UPLOAD_READY: &str = "FILE_UPLOAD_READY";
pub const UPLOAD_SUCCESS: &str = "FILE_UPLOAD_SUCCESS";
pub const FIELD_SEPARATOR: char = '|';

/// Largest file accepted for upload: 2 GiB.
pub const MAX_UPLOAD_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Read buffer of the messaging receive loop.
pub const RECV_BUFFER_SIZE: usize = 4096;
/// Read buffer for handshake and upload replies.
pub const REPLY_BUFFER_SIZE: usize = 1024;
/// Upload chunk size.
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// `FILE_UPLOAD_START|<username>|<fileName>|<fileSizeBytes>`
pub fn upload_start_line(username: &str, file_name: &str, file_size: u64) -> String {
    format!(
        "{UPLOAD_START}{sep}{username}{sep}{file_name}{sep}{file_size}",
        sep = FIELD_SEPARATOR
    )
}

/// The `_OK` acknowledgment variant of a handshake token.
pub fn handshake_ok(token: &str) -> String {
    format!("{token}{HANDSHAKE_OK_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_line_layout() {
        assert_eq!(
            upload_start_line("alice", "report.pdf", 1234),
            "FILE_UPLOAD_START|alice|report.pdf|1234"
        );
    }

    #[test]
    fn ok_variant() {
        assert_eq!(handshake_ok(UPLOAD_HANDSHAKE_TOKEN), "FILE_UPLOAD_HANDSHAKE_OK");
        assert_eq!(MAX_UPLOAD_BYTES, 2_147_483_648);
    }
}
