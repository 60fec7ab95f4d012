use bytes::BytesMut;
use memchr::memchr;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::telnet::TelnetFilter;

const READ_CHUNK: usize = 4 * 1024;

/// Buffered line reader over a raw telnet stream.
///
/// Socket chunks pass through a [`TelnetFilter`] before line splitting, so
/// IAC noise never reaches the world. Lines are yielded with the trailing
/// `\n` (and optional `\r`) removed, decoded as lossy UTF-8.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    filter: TelnetFilter,
    buf: Vec<u8>,
    replies: Vec<u8>,
    scan_from: usize,
    max_line_len: usize,
}

impl<R> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            filter: TelnetFilter::new(),
            buf: Vec::with_capacity(READ_CHUNK),
            replies: Vec::new(),
            scan_from: 0,
            max_line_len: 8 * 1024,
        }
    }

    pub fn max_line_len(mut self, max: usize) -> Self {
        self.max_line_len = max.max(1);
        self
    }

    /// Negotiation refusals accumulated since the last call. The caller is
    /// expected to write these back to the peer.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Read one line.
    ///
    /// Returns:
    /// - `Ok(Some(line))` for a complete line (may be empty),
    /// - `Ok(None)` on clean EOF with no buffered text.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        let mut chunk = BytesMut::with_capacity(READ_CHUNK);
        loop {
            if let Some(i) = memchr(b'\n', &self.buf[self.scan_from..]) {
                let mut line: Vec<u8> = self.buf.drain(..self.scan_from + i + 1).collect();
                self.scan_from = 0;
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            self.scan_from = self.buf.len();

            if self.buf.len() > self.max_line_len {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "line too long",
                ));
            }

            chunk.clear();
            let n = self.inner.read_buf(&mut chunk).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "eof while reading line",
                ));
            }
            self.filter.feed(&chunk, &mut self.buf, &mut self.replies);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telnet::{DO, IAC, WONT};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_crlf_and_lf_lines() {
        let (a, b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut b = b;
            b.write_all(b"north\r\nsay hi\n").await.unwrap();
        });

        let mut lr = LineReader::new(a);
        assert_eq!(lr.read_line().await.unwrap().unwrap(), "north");
        assert_eq!(lr.read_line().await.unwrap().unwrap(), "say hi");
    }

    #[tokio::test]
    async fn strips_iac_and_queues_refusals() {
        let (a, b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut b = b;
            b.write_all(&[IAC, DO, 1]).await.unwrap();
            b.write_all(b"who\r\n").await.unwrap();
        });

        let mut lr = LineReader::new(a);
        assert_eq!(lr.read_line().await.unwrap().unwrap(), "who");
        assert_eq!(lr.take_replies(), vec![IAC, WONT, 1]);
        assert!(lr.take_replies().is_empty());
    }

    #[tokio::test]
    async fn line_split_across_reads() {
        let (a, b) = tokio::io::duplex(8);
        tokio::spawn(async move {
            let mut b = b;
            b.write_all(b"inven").await.unwrap();
            b.write_all(b"tory\r\n").await.unwrap();
        });

        let mut lr = LineReader::new(a);
        assert_eq!(lr.read_line().await.unwrap().unwrap(), "inventory");
    }

    #[tokio::test]
    async fn overlong_line_errors() {
        let (a, b) = tokio::io::duplex(64);
        tokio::spawn(async move {
            let mut b = b;
            let _ = b.write_all(&[b'x'; 64]).await;
        });

        let mut lr = LineReader::new(a).max_line_len(16);
        let err = lr.read_line().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn clean_eof_returns_none() {
        let (a, b) = tokio::io::duplex(8);
        drop(b);
        let mut lr = LineReader::new(a);
        assert!(lr.read_line().await.unwrap().is_none());
    }
}
