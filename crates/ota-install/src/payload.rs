//! Package streaming.
//!
//! The package is read in bounded chunks straight from disk into the response
//! body. The stream reports its outcome to the status owner exactly once:
//! after the last byte is handed out, on the first read error, or when the
//! response is dropped early.

use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use actix_web::web::Bytes;
use futures_util::Stream;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::error::PayloadError;
use crate::status::{Status, StatusReporter};

pub const CHUNK_SIZE: usize = 64 * 1024;

pub struct PayloadStream {
    inner: ReaderStream<tokio::io::Take<tokio::fs::File>>,
    reporter: StatusReporter,
    expected: u64,
    sent: u64,
    finished: bool,
}

impl PayloadStream {
    /// Open the package for streaming. Open failures are returned, not
    /// reported; the caller answers the request and reports them.
    pub async fn open(path: &Path, reporter: StatusReporter) -> Result<Self, PayloadError> {
        let open_err = |err: std::io::Error| PayloadError::Open {
            path: path.to_path_buf(),
            message: err.to_string(),
        };
        let file = tokio::fs::File::open(path).await.map_err(open_err)?;
        let meta = file.metadata().await.map_err(open_err)?;
        if !meta.is_file() {
            return Err(PayloadError::Open {
                path: path.to_path_buf(),
                message: "not a regular file".to_string(),
            });
        }
        let expected = meta.len();
        let mut stream = Self {
            inner: ReaderStream::with_capacity(file.take(expected), CHUNK_SIZE),
            reporter,
            expected,
            sent: 0,
            finished: false,
        };
        if expected == 0 {
            stream.finish(Ok(0));
        }
        Ok(stream)
    }

    /// Length the response will declare.
    pub fn len(&self) -> u64 {
        self.expected
    }

    pub fn is_empty(&self) -> bool {
        self.expected == 0
    }

    fn finish(&mut self, outcome: Result<u64, PayloadError>) {
        if self.finished {
            return;
        }
        self.finished = true;
        match &outcome {
            Ok(bytes) => tracing::info!(bytes = *bytes, "payload delivered"),
            Err(err) => tracing::warn!(error = %err, "payload transfer failed"),
        }
        self.reporter.transition(Status::Completed(outcome));
    }
}

impl Stream for PayloadStream {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                if this.sent >= this.expected {
                    let sent = this.sent;
                    this.finish(Ok(sent));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                let sent = this.sent;
                this.finish(Err(PayloadError::Read {
                    sent,
                    message: err.to_string(),
                }));
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if this.sent < this.expected {
                    let (sent, expected) = (this.sent, this.expected);
                    this.finish(Err(PayloadError::Truncated { sent, expected }));
                    return Poll::Ready(Some(Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "package shorter than its declared length",
                    ))));
                }
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for PayloadStream {
    fn drop(&mut self) {
        if !self.finished {
            let sent = self.sent;
            self.finish(Err(PayloadError::ClientDisconnected { sent }));
        }
    }
}

/// Single-chunk body for manifest and image responses that notices when the
/// response is dropped without the bytes ever being taken.
pub struct GuardedBody {
    body: Option<Bytes>,
    path: String,
    reporter: StatusReporter,
}

impl GuardedBody {
    pub fn new(body: impl Into<Bytes>, path: &str, reporter: StatusReporter) -> Self {
        Self {
            body: Some(body.into()),
            path: path.to_string(),
            reporter,
        }
    }

    pub fn len(&self) -> u64 {
        self.body.as_ref().map(|b| b.len() as u64).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Stream for GuardedBody {
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.get_mut().body.take().map(Ok))
    }
}

impl Drop for GuardedBody {
    fn drop(&mut self) {
        if self.body.as_ref().is_some_and(|b| !b.is_empty()) {
            self.reporter.client_disconnected(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use tokio::sync::mpsc;

    use super::*;
    use crate::status::StatusCommand;

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "ota-install-payload-{}-{}",
            uuid::Uuid::new_v4(),
            name
        ));
        std::fs::write(&path, contents).expect("write temp file");
        path
    }

    fn reporter() -> (StatusReporter, mpsc::UnboundedReceiver<StatusCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StatusReporter::new(tx), rx)
    }

    fn completed(rx: &mut mpsc::UnboundedReceiver<StatusCommand>) -> Result<u64, PayloadError> {
        match rx.try_recv() {
            Ok(StatusCommand::Transition(Status::Completed(outcome))) => outcome,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[actix_web::test]
    async fn streams_large_file_in_bounded_chunks() {
        let contents: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let path = temp_file("large.ipa", &contents);
        let (reporter, mut rx) = reporter();

        let mut stream = PayloadStream::open(&path, reporter).await.unwrap();
        assert_eq!(stream.len(), contents.len() as u64);
        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            received.extend_from_slice(&chunk);
        }
        drop(stream);

        assert_eq!(received, contents);
        assert_eq!(completed(&mut rx), Ok(contents.len() as u64));
        assert!(rx.try_recv().is_err(), "outcome reported more than once");
        let _ = std::fs::remove_file(&path);
    }

    #[actix_web::test]
    async fn missing_file_fails_to_open() {
        let (reporter, mut rx) = reporter();
        let path = std::env::temp_dir().join("ota-install-payload-missing.ipa");
        let err = PayloadStream::open(&path, reporter).await.err().unwrap();
        assert!(matches!(err, PayloadError::Open { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[actix_web::test]
    async fn dropping_mid_stream_reports_disconnect() {
        let contents = vec![7u8; CHUNK_SIZE * 2];
        let path = temp_file("partial.ipa", &contents);
        let (reporter, mut rx) = reporter();

        let mut stream = PayloadStream::open(&path, reporter).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        drop(stream);

        assert_eq!(
            completed(&mut rx),
            Err(PayloadError::ClientDisconnected {
                sent: first.len() as u64
            })
        );
        let _ = std::fs::remove_file(&path);
    }

    #[actix_web::test]
    async fn empty_package_completes_immediately() {
        let path = temp_file("empty.ipa", b"");
        let (reporter, mut rx) = reporter();
        let mut stream = PayloadStream::open(&path, reporter).await.unwrap();
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(completed(&mut rx), Ok(0));
        let _ = std::fs::remove_file(&path);
    }

    #[actix_web::test]
    async fn guarded_body_reports_only_when_unsent() {
        let (reporter, mut rx) = reporter();
        let mut body = GuardedBody::new(Bytes::from_static(b"manifest"), "/m.plist", reporter.clone());
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"manifest"));
        assert!(body.next().await.is_none());
        drop(body);
        assert!(rx.try_recv().is_err());

        drop(GuardedBody::new(Bytes::from_static(b"icon"), "/app57x57.png", reporter));
        match rx.try_recv() {
            Ok(StatusCommand::ClientDisconnected(path)) => assert_eq!(path, "/app57x57.png"),
            other => panic!("expected disconnect, got {other:?}"),
        }
    }
}
