//! Connection abstraction
//!
//! A TCP stream is split into a `FrameReader`, owned by whichever task reads
//! from the peer, and a `FrameWriter`, which is cheap to clone so the hub can
//! hand it to every task that needs to write to that peer.
//!
//! There is no delimiter on the wire: one successful read is one frame.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

/// Split a stream into its reading and writing halves
pub fn split(stream: TcpStream, read_buffer_size: usize) -> (FrameReader, FrameWriter) {
    let (reader, writer) = stream.into_split();
    (
        FrameReader::new(reader, read_buffer_size),
        FrameWriter::new(writer),
    )
}

/// Result of a bounded read
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame(String),
    /// Nothing arrived in time; not an error
    Idle,
    /// The peer closed its side
    Closed,
}

/// Reading half of a connection
#[derive(Debug)]
pub struct FrameReader<R = OwnedReadHalf> {
    inner: R,
    buf: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R, read_buffer_size: usize) -> Self {
        Self {
            inner,
            buf: vec![0; read_buffer_size.max(1)],
        }
    }

    /// Read one frame; `None` once the peer has closed.
    ///
    /// Bytes are decoded lossily: a multi-byte character cut by the buffer
    /// boundary shows up as a replacement character.
    pub async fn read_frame(&mut self) -> io::Result<Option<String>> {
        let n = self.inner.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.buf[..n]).into_owned()))
    }

    /// Read one frame, giving up after `wait`
    pub async fn read_frame_timeout(&mut self, wait: Duration) -> io::Result<ReadOutcome> {
        match tokio::time::timeout(wait, self.read_frame()).await {
            Ok(Ok(Some(frame))) => Ok(ReadOutcome::Frame(frame)),
            Ok(Ok(None)) => Ok(ReadOutcome::Closed),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(ReadOutcome::Idle),
        }
    }
}

/// Writing half of a connection
///
/// Clones share the same socket; writes are serialized so two frames never
/// interleave on the wire. Closing never waits for a write in progress: the
/// close signal aborts it and later sends fail straight away.
#[derive(Debug)]
pub struct FrameWriter<W = OwnedWriteHalf> {
    inner: Arc<Mutex<W>>,
    closed: Arc<watch::Sender<bool>>,
}

impl<W> Clone for FrameWriter<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            inner: Arc::new(Mutex::new(inner)),
            closed: Arc::new(closed),
        }
    }

    /// Write one frame and flush it
    ///
    /// Fails with `ConnectionAborted` if the writer is closed before or
    /// while the frame is written.
    pub async fn send(&self, frame: &str) -> io::Result<()> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(aborted());
        }

        tokio::select! {
            result = async {
                let mut inner = self.inner.lock().await;
                inner.write_all(frame.as_bytes()).await?;
                inner.flush().await
            } => result,
            () = async {
                let _ = closed.wait_for(|closed| *closed).await;
            } => Err(aborted()),
        }
    }

    /// Shut down the write side; errors are swallowed
    pub async fn close(&self) {
        self.closed.send_replace(true);
        // In-flight sends drop the lock as soon as they see the signal.
        let mut inner = self.inner.lock().await;
        let _ = inner.shutdown().await;
    }
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed")
}
