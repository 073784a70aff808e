//! The TCP session with the hub.

use std::io;
use std::pin::pin;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either};
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::codec::{Frame, FrameDecoder};
use crate::errors::Error;
use crate::history::{MessageHistory, MessageType};
use crate::runtime::{
    self, AsyncTcpReader, AsyncTcpStream, AsyncTcpWriter, JoinHandle, Mutex, TcpReader, TcpStream,
    TcpWriter,
};

type Result<T> = std::result::Result<T, Error>;

/// How long `disconnect` waits for the receive loop before aborting it.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Lifecycle of the hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Consumer of everything the receive loop produces.
pub(crate) trait FrameHandler: Send + Sync + 'static {
    /// Called for every decoded frame, in arrival order.
    fn handle_frame(&self, frame: Frame);

    /// Called once when an established session ends.
    fn handle_disconnect(&self, reason: &Error);
}

/// Connection settings the transport needs.
#[derive(Debug, Clone)]
pub(crate) struct TransportOptions {
    pub address: String,
    pub connect_timeout: Duration,
    pub read_buffer_size: usize,
    pub max_frame_len: usize,
}

struct Link {
    state: ConnectionState,
    // Bumped on every connect and disconnect; a receive loop only tears
    // down the session it was spawned for.
    epoch: u64,
}

/// The running receive loop and the signal that stops it.
struct ReceiveTask {
    handle: JoinHandle<()>,
    stop: oneshot::Sender<()>,
}

/// Owns the single connection to the hub.
///
/// Dropping the transport stops its receive loop, which releases the socket.
pub(crate) struct Transport {
    options: TransportOptions,
    link: Arc<StdMutex<Link>>,
    writer: Arc<Mutex<Option<TcpWriter>>>,
    receiver: StdMutex<Option<ReceiveTask>>,
    connect_lock: Mutex<()>,
    handler: Arc<dyn FrameHandler>,
    history: Arc<Mutex<MessageHistory>>,
}

impl Transport {
    pub fn new(
        options: TransportOptions,
        handler: Arc<dyn FrameHandler>,
        history: Arc<Mutex<MessageHistory>>,
    ) -> Self {
        Transport {
            options,
            link: Arc::new(StdMutex::new(Link {
                state: ConnectionState::Disconnected,
                epoch: 0,
            })),
            writer: Arc::new(Mutex::new(None)),
            receiver: StdMutex::new(None),
            connect_lock: Mutex::new(()),
            handler,
            history,
        }
    }

    pub fn address(&self) -> &str {
        &self.options.address
    }

    pub fn state(&self) -> ConnectionState {
        lock(&self.link).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open the connection and start the receive loop.
    ///
    /// Does nothing if the session is already connected.
    pub async fn connect(&self) -> Result<()> {
        let _connecting = self.connect_lock.lock().await;
        {
            let mut link = lock(&self.link);
            if link.state == ConnectionState::Connected {
                debug!("already connected to {}", self.options.address);
                return Ok(());
            }
            link.state = ConnectionState::Connecting;
        }

        debug!("connecting to {}", self.options.address);
        let stream = match runtime::timeout(
            self.options.connect_timeout,
            TcpStream::connect(&self.options.address),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(self.connect_failed(e)),
            Err(_) => {
                return Err(self.connect_failed(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timeout",
                )));
            }
        };
        let (reader, writer) = stream.into_split();

        // Writer and link change together so a stale loop cannot clear the
        // new writer.
        let epoch = {
            let mut guard = self.writer.lock().await;
            *guard = Some(writer);
            let mut link = lock(&self.link);
            link.epoch += 1;
            link.state = ConnectionState::Connected;
            link.epoch
        };

        let (stop, stopped) = oneshot::channel();
        let receive = ReceiveLoop {
            reader,
            stopped,
            decoder: FrameDecoder::with_max_frame_len(self.options.max_frame_len),
            buffer_size: self.options.read_buffer_size,
            epoch,
            link: Arc::clone(&self.link),
            writer: Arc::clone(&self.writer),
            handler: Arc::clone(&self.handler),
            history: Arc::clone(&self.history),
        };
        let handle = runtime::spawn(receive.run());
        // A previous loop already ended on its own; its handle is finished.
        lock(&self.receiver).replace(ReceiveTask { handle, stop });

        info!("connected to hub at {}", self.options.address);
        Ok(())
    }

    /// Write one encoded frame. Concurrent sends are serialized.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(Error::NotConnected);
        };
        trace!("sending {} bytes", bytes.len());
        writer
            .write_all(bytes)
            .await
            .map_err(|e| Error::connection("send", e))
    }

    /// Close the connection and stop the receive loop.
    ///
    /// Does nothing if the session is not connected.
    pub async fn disconnect(&self) -> Result<()> {
        let _connecting = self.connect_lock.lock().await;
        let was_connected = {
            let mut link = lock(&self.link);
            let was_connected = link.state == ConnectionState::Connected;
            link.state = ConnectionState::Disconnected;
            link.epoch += 1;
            was_connected
        };

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer
            && let Err(e) = writer.shutdown().await
        {
            debug!("shutdown of hub connection failed: {e}");
        }

        let receiver = lock(&self.receiver).take();
        if let Some(ReceiveTask { mut handle, stop }) = receiver {
            let _ = stop.send(());
            if runtime::timeout(JOIN_TIMEOUT, &mut handle).await.is_err() {
                warn!("receive loop did not stop within {JOIN_TIMEOUT:?}; aborting it");
                handle.abort();
            }
        }

        if was_connected {
            info!("disconnected from hub at {}", self.options.address);
            self.handler
                .handle_disconnect(&Error::disconnected("disconnected by client"));
        }
        Ok(())
    }

    fn connect_failed(&self, err: io::Error) -> Error {
        lock(&self.link).state = ConnectionState::Disconnected;
        error!("failed to connect to {}: {err}", self.options.address);
        Error::connection("connect", err)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        {
            let mut link = lock(&self.link);
            link.state = ConnectionState::Disconnected;
            link.epoch += 1;
        }
        // The loop owns the read half and shares the writer; once it is gone
        // both halves of the socket are closed.
        if let Some(ReceiveTask { handle, stop }) = lock(&self.receiver).take() {
            trace!("closing hub connection to {}", self.options.address);
            let _ = stop.send(());
            handle.abort();
        }
    }
}

/// Background task reading frames for one connection.
struct ReceiveLoop {
    reader: TcpReader,
    stopped: oneshot::Receiver<()>,
    decoder: FrameDecoder,
    buffer_size: usize,
    epoch: u64,
    link: Arc<StdMutex<Link>>,
    writer: Arc<Mutex<Option<TcpWriter>>>,
    handler: Arc<dyn FrameHandler>,
    history: Arc<Mutex<MessageHistory>>,
}

impl ReceiveLoop {
    async fn run(mut self) {
        let Some(reason) = self.receive().await else {
            trace!("receive loop for epoch {} stopped", self.epoch);
            return;
        };
        self.history.lock().await.record_error(&reason.to_string());

        let ended = {
            let mut writer = self.writer.lock().await;
            let mut link = lock(&self.link);
            if link.epoch == self.epoch && link.state == ConnectionState::Connected {
                link.state = ConnectionState::Disconnected;
                writer.take();
                true
            } else {
                false
            }
        };

        if ended {
            warn!("hub session ended: {reason}");
            self.handler.handle_disconnect(&reason);
        } else {
            trace!("receive loop for epoch {} finished", self.epoch);
        }
    }

    /// Read until the session fails or the transport stops the loop.
    ///
    /// Returns why the session failed, or `None` when it was stopped.
    async fn receive(&mut self) -> Option<Error> {
        let mut buf = vec![0u8; self.buffer_size.max(1)];
        loop {
            let n = {
                let read = pin!(self.reader.read(&mut buf));
                match future::select(read, &mut self.stopped).await {
                    Either::Left((Ok(0), _)) => {
                        return Some(Error::disconnected("connection closed by hub"));
                    }
                    Either::Left((Ok(n), _)) => n,
                    Either::Left((Err(e), _)) => return Some(Error::connection("receive", e)),
                    Either::Right(_) => return None,
                }
            };
            self.decoder.feed(&buf[..n]);

            while let Some(decoded) = self.decoder.next_frame() {
                match decoded {
                    Ok(frame) => self.dispatch(frame).await,
                    Err(e) if e.is_fatal() => {
                        error!("unrecoverable framing error: {e}");
                        return Some(Error::disconnected(&e.to_string()));
                    }
                    Err(e) => {
                        warn!("dropping malformed frame: {e}");
                        self.history.lock().await.record_error(&e.to_string());
                    }
                }
            }
        }
    }

    async fn dispatch(&self, frame: Frame) {
        let direction = match frame {
            Frame::StateChanged { .. } => MessageType::Push,
            _ => MessageType::Receive,
        };
        match serde_json::to_value(&frame) {
            Ok(value) => self.history.lock().await.record(direction, &value),
            Err(e) => debug!("frame not recorded: {e}"),
        }
        self.handler.handle_frame(frame);
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
