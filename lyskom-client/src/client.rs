//! Request client.
//!
//! Many callers may have requests in flight on one connection. Sending is
//! serialised by the writer lock; each caller then waits only on its own
//! oneshot. A reader task owns the read half and completes those oneshots;
//! async messages go through an unbounded queue to a dispatcher task so that
//! slow handlers never stall reply delivery.

use crate::connection::{
    Connection, ConnectionConfig, FrameReader, Incoming, RequestTable, RequestWriter,
};
use crate::dispatch::{dispatch_loop, HandlerTable};
use crate::error::ClientError;
use lyskom_protocol::{AsyncMessage, Reply, Request};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Async request client for one LysKOM connection.
pub struct Client {
    config: ConnectionConfig,
    handlers: Arc<HandlerTable>,
    writer: tokio::sync::Mutex<Option<RequestWriter>>,
    /// Outstanding requests of the current connection. Kept outside the
    /// writer lock so that teardown never waits behind a blocked write.
    table: Mutex<Option<Arc<RequestTable>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Creates a new client (not yet connected). `handlers` receive async
    /// messages for the lifetime of the client.
    pub fn new(config: ConnectionConfig, handlers: HandlerTable) -> Self {
        Self {
            config,
            handlers: Arc::new(handlers),
            writer: tokio::sync::Mutex::new(None),
            table: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// Connects to the configured server.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        let connection = Connection::open(&self.config).await?;
        self.start(connection).await
    }

    /// Connects over an already established stream.
    pub async fn connect_with<S>(&self, stream: S) -> Result<(), ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        let connection = Connection::handshake(stream, &self.config).await?;
        self.start(connection).await
    }

    async fn start(&self, connection: Connection) -> Result<(), ClientError> {
        let (reader, writer) = connection.into_split();
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        let mut writer_guard = self.writer.lock().await;
        self.abort_tasks();
        // Installed before the reader runs; a reader that fails at once
        // closes this same table.
        *self.table.lock() = Some(writer.table().clone());
        *writer_guard = Some(writer);

        let reader_task = tokio::spawn(read_loop(reader, push_tx));
        let dispatch_task = tokio::spawn(dispatch_loop(push_rx, self.handlers.clone()));
        self.tasks.lock().extend([reader_task, dispatch_task]);

        tracing::debug!("Connected to {}", self.config.addr);
        Ok(())
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Returns whether the connection is up.
    pub fn is_connected(&self) -> bool {
        self.table
            .lock()
            .as_ref()
            .map_or(false, |table| !table.is_closed())
    }

    /// Sends a request and waits for its reply.
    pub async fn request(&self, request: Request) -> Result<Reply, ClientError> {
        let (tx, rx) = oneshot::channel();
        let ref_no = {
            let mut writer_guard = self.writer.lock().await;
            let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
            match writer.send(&request, tx).await {
                Ok(ref_no) => ref_no,
                Err(e) => {
                    if writer.table().is_closed() {
                        // The stream may hold a partial request
                        *writer_guard = None;
                    }
                    return Err(e);
                }
            }
        };
        tracing::debug!("Request ref_no={} sent, waiting for reply", ref_no);

        rx.await.map_err(|_| ClientError::ConnectionLost)?
    }

    /// Sends a request and converts the reply to the type the call returns.
    pub async fn request_as<T>(&self, request: Request) -> Result<T, ClientError>
    where
        T: TryFrom<Reply, Error = Reply>,
    {
        let call = request.call;
        let reply = self.request(request).await?;
        T::try_from(reply).map_err(|other| {
            tracing::warn!("Unexpected reply to {}: {:?}", call, other);
            ClientError::UnexpectedReply { call }
        })
    }

    /// Closes the connection. Outstanding requests fail with
    /// connection-lost, including one whose write is still blocked.
    /// Calling this more than once is harmless.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        if let Some(table) = self.table.lock().take() {
            table.fail_all();
        }
        self.abort_tasks();

        if let Some(mut writer) = self.writer.lock().await.take() {
            tracing::debug!("Shutting down writer");
            writer.shutdown().await;
        }

        tracing::debug!("Connection closed");
        Ok(())
    }

    /// Returns the number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.table.lock().as_ref().map_or(0, |table| table.len())
    }
}

/// Reads frames until the connection fails, completing waiters and queueing
/// async messages. On exit the request table is closed, which marks the
/// connection dead and fails every outstanding request; dropping the queue
/// sender lets the dispatcher finish once it has drained.
async fn read_loop(mut reader: FrameReader, push: mpsc::UnboundedSender<AsyncMessage>) {
    tracing::debug!("read_loop started");
    let err = loop {
        match reader.read_frame().await {
            Ok(Incoming::Reply { waiter, result, .. }) => {
                let _ = waiter.send(result);
            }
            Ok(Incoming::Async(msg)) => {
                tracing::debug!("read_loop: async message {}", msg.kind());
                if push.send(msg).is_err() {
                    tracing::debug!("read_loop: dispatcher gone");
                }
            }
            Err(e) => break e,
        }
    };

    match err {
        ClientError::ConnectionLost => tracing::debug!("read_loop: connection closed"),
        other => tracing::warn!("read_loop: connection failed: {}", other),
    }
    reader.table().fail_all();
}
