//! Connection management.
//!
//! A connection is split in two after the handshake: a [`RequestWriter`]
//! that assigns ref_nos and writes request lines, and a [`FrameReader`]
//! that owns the read half and turns bytes into replies and async messages.
//! Both share the [`RequestTable`] of outstanding requests.

use crate::error::ClientError;
use lyskom_protocol::{
    AsyncMessage, Call, Decoder, Encoder, Frame, ProtocolError, Reply, Request, DEFAULT_PORT,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Notify};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address, `host:port`.
    pub addr: String,
    /// User identification sent in the handshake, conventionally `user%host`.
    pub user: String,
    /// Connection timeout, covering TCP connect and handshake.
    pub connect_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            user: "lyskom".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Creates a config for `host` on the default Protocol A port.
    pub fn for_host(host: &str) -> Self {
        Self::new(format!("{}:{}", host, DEFAULT_PORT))
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// Completion channel of one request.
pub type Waiter = oneshot::Sender<Result<Reply, ClientError>>;

/// An entry in the outstanding table.
pub struct OutstandingRequest {
    pub call: Call,
    pub waiter: Waiter,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<u32, OutstandingRequest>,
    closed: bool,
}

/// Outstanding requests keyed by ref_no.
///
/// Once closed, every new insert fails so that no request registered after
/// teardown can wait forever. A table lives exactly as long as its
/// connection, so an open table means a live connection.
#[derive(Default)]
pub struct RequestTable {
    state: Mutex<TableState>,
    closed: Notify,
}

impl RequestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ref_no: u32, call: Call, waiter: Waiter) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(ClientError::ConnectionLost);
        }
        state
            .entries
            .insert(ref_no, OutstandingRequest { call, waiter });
        Ok(())
    }

    /// Returns the call a ref_no was sent with.
    pub fn call_for(&self, ref_no: u32) -> Option<Call> {
        self.state.lock().entries.get(&ref_no).map(|entry| entry.call)
    }

    pub fn take(&self, ref_no: u32) -> Option<OutstandingRequest> {
        self.state.lock().entries.remove(&ref_no)
    }

    /// Closes the table and fails every outstanding request with
    /// connection-lost. Idempotent.
    pub fn fail_all(&self) {
        let entries: Vec<OutstandingRequest> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.entries.drain().map(|(_, entry)| entry).collect()
        };
        self.closed.notify_waiters();
        if !entries.is_empty() {
            tracing::debug!("Failing {} outstanding requests", entries.len());
        }
        for entry in entries {
            let _ = entry.waiter.send(Err(ClientError::ConnectionLost));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Completes once the table has been closed.
    pub async fn closed(&self) {
        let notified = self.closed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if !self.is_closed() {
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A handshaken connection, not yet split.
pub struct Connection {
    reader: FrameReader,
    writer: RequestWriter,
}

impl Connection {
    /// Opens a TCP connection and performs the handshake, both bounded by
    /// the connect timeout.
    pub async fn open(config: &ConnectionConfig) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.addr);

        tokio::time::timeout(config.connect_timeout, async {
            let stream = TcpStream::connect(&config.addr).await?;
            stream.set_nodelay(true).ok();
            tracing::debug!("TCP connected");
            Self::handshake(stream, config).await
        })
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
    }

    /// Performs the Protocol A handshake over an established stream.
    pub async fn handshake<S>(stream: S, config: &ConnectionConfig) -> Result<Self, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let table = Arc::new(RequestTable::new());
        let mut writer = RequestWriter::new(Box::new(write_half), table.clone());
        let mut reader = FrameReader::new(Box::new(read_half), table, config.read_buffer_size);

        tracing::debug!("Sending handshake as {:?}", config.user);
        let hello = Encoder::encode_handshake(config.user.as_bytes());
        writer.write_raw(&hello).await?;
        reader.expect_handshake().await?;
        tracing::debug!("Handshake complete");

        Ok(Self { reader, writer })
    }

    pub fn into_split(self) -> (FrameReader, RequestWriter) {
        (self.reader, self.writer)
    }
}

/// Write side: ref_no allocation and request serialisation.
pub struct RequestWriter {
    writer: BoxedWriter,
    table: Arc<RequestTable>,
    last_ref_no: u32,
}

impl RequestWriter {
    fn new(writer: BoxedWriter, table: Arc<RequestTable>) -> Self {
        Self {
            writer,
            table,
            last_ref_no: 0,
        }
    }

    /// Registers `waiter` under a fresh ref_no and writes the request.
    ///
    /// The entry is recorded before the first byte is written, so the reply
    /// can never overtake its registration. A failed or partial write leaves
    /// the server out of step with us, so it closes the table and the caller
    /// sees connection-lost like every other outstanding request. A write
    /// still blocked when the table is closed is abandoned.
    pub async fn send(&mut self, request: &Request, waiter: Waiter) -> Result<u32, ClientError> {
        let ref_no = self
            .last_ref_no
            .checked_add(1)
            .ok_or(ClientError::RefNoExhausted)?;
        self.table.insert(ref_no, request.call, waiter)?;
        self.last_ref_no = ref_no;

        let encoded = Encoder::encode_request(ref_no, request);
        tracing::debug!(
            "Sending request ref_no={} call={} ({} bytes)",
            ref_no,
            request.call,
            encoded.len()
        );
        let table = self.table.clone();
        tokio::select! {
            result = self.write_raw(&encoded) => {
                if let Err(e) = result {
                    tracing::warn!("Write of ref_no={} failed: {}", ref_no, e);
                    table.fail_all();
                    return Err(ClientError::ConnectionLost);
                }
            }
            _ = table.closed() => {
                tracing::debug!("Connection closed while sending ref_no={}", ref_no);
                return Err(ClientError::ConnectionLost);
            }
        }
        Ok(ref_no)
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<(), ClientError> {
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub fn table(&self) -> &Arc<RequestTable> {
        &self.table
    }

    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// What the reader produced from one frame.
pub enum Incoming {
    /// A reply for an outstanding request, already removed from the table.
    Reply {
        ref_no: u32,
        waiter: Waiter,
        result: Result<Reply, ClientError>,
    },
    Async(AsyncMessage),
}

/// Read side: buffered, incremental frame decoding.
pub struct FrameReader {
    reader: BoxedReader,
    decoder: Decoder,
    table: Arc<RequestTable>,
    read_buf: Vec<u8>,
}

impl FrameReader {
    fn new(reader: BoxedReader, table: Arc<RequestTable>, buffer_size: usize) -> Self {
        Self {
            reader,
            decoder: Decoder::with_capacity(buffer_size),
            table,
            read_buf: vec![0u8; buffer_size],
        }
    }

    /// Reads once from the transport into the decoder.
    async fn fill(&mut self) -> Result<(), ClientError> {
        let n = self.reader.read(&mut self.read_buf).await?;
        if n == 0 {
            tracing::debug!("Connection closed by peer");
            return Err(ClientError::ConnectionLost);
        }
        tracing::trace!("Received {} bytes", n);
        self.decoder.extend(&self.read_buf[..n]);
        Ok(())
    }

    /// Waits until at least `n` unread bytes are buffered.
    pub async fn ensure(&mut self, n: usize) -> Result<(), ClientError> {
        while self.decoder.buffered() < n {
            self.fill().await?;
        }
        Ok(())
    }

    async fn expect_handshake(&mut self) -> Result<(), ClientError> {
        loop {
            match self.decoder.decode_handshake() {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(ProtocolError::BadHandshake(reply)) => {
                    return Err(ClientError::Handshake(format!(
                        "unexpected server greeting {:?}",
                        reply
                    )))
                }
                Err(e) => return Err(e.into()),
            }
            self.fill().await.map_err(|e| match e {
                ClientError::ConnectionLost => {
                    ClientError::Handshake("connection closed during handshake".to_string())
                }
                other => other,
            })?;
        }
    }

    /// Reads the next frame.
    ///
    /// Any error is fatal for the connection: the stream cannot be
    /// resynchronised after a framing error.
    pub async fn read_frame(&mut self) -> Result<Incoming, ClientError> {
        loop {
            let table = &self.table;
            if let Some(frame) = self.decoder.decode_frame(|ref_no| table.call_for(ref_no))? {
                return self.resolve(frame);
            }
            self.fill().await?;
        }
    }

    fn resolve(&self, frame: Frame) -> Result<Incoming, ClientError> {
        let (ref_no, result) = match frame {
            Frame::Async(msg) => return Ok(Incoming::Async(msg)),
            Frame::Ok { ref_no, reply } => (ref_no, Ok(reply)),
            Frame::Error {
                ref_no,
                code,
                detail,
            } => (ref_no, Err(ClientError::Server { code, detail })),
        };
        // The entry was present when the frame was parsed; only teardown
        // can have removed it since.
        let entry = self.table.take(ref_no).ok_or(ClientError::ConnectionLost)?;
        tracing::debug!("Reply for ref_no={} call={}", ref_no, entry.call);
        Ok(Incoming::Reply {
            ref_no,
            waiter: entry.waiter,
            result,
        })
    }

    pub fn table(&self) -> &Arc<RequestTable> {
        &self.table
    }
}
