//! async-std runtime implementation.

use std::future::Future;
use std::io;
use std::net::Shutdown;
use std::time::Duration;

use async_std::io::{ReadExt, WriteExt};
use async_std::net::TcpStream as AsyncStdTcpStream;

use super::{AsyncTcpReader, AsyncTcpStream, AsyncTcpWriter, Spawner, TimedOut};

/// async-std-based TCP stream.
pub struct TcpStream(AsyncStdTcpStream);

/// Read half of an async-std TCP stream (a clone of the same socket).
pub struct TcpReader(AsyncStdTcpStream);

/// Write half of an async-std TCP stream (a clone of the same socket).
pub struct TcpWriter(AsyncStdTcpStream);

impl AsyncTcpStream for TcpStream {
    type Reader = TcpReader;
    type Writer = TcpWriter;

    async fn connect(addr: &str) -> io::Result<Self> {
        let stream = AsyncStdTcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(TcpStream(stream))
    }

    fn into_split(self) -> (TcpReader, TcpWriter) {
        (TcpReader(self.0.clone()), TcpWriter(self.0))
    }
}

impl AsyncTcpReader for TcpReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).await
    }
}

impl AsyncTcpWriter for TcpWriter {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.write_all(buf).await?;
        self.0.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        // Both directions, so the cloned read half sees EOF.
        self.0.shutdown(Shutdown::Both)
    }
}

/// async-std task spawner.
pub struct AsyncStdSpawner;

impl Spawner for AsyncStdSpawner {
    type JoinHandle<T: Send + 'static> = AsyncStdJoinHandle<T>;

    fn spawn<F, T>(future: F) -> Self::JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        AsyncStdJoinHandle(async_std::task::spawn(future))
    }
}

/// Wrapper around async-std's JoinHandle.
pub struct AsyncStdJoinHandle<T>(async_std::task::JoinHandle<T>);

impl<T> Future for AsyncStdJoinHandle<T> {
    type Output = T;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        std::pin::Pin::new(&mut self.0).poll(cx)
    }
}

impl<T: Send + 'static> AsyncStdJoinHandle<T> {
    /// Abort the task.
    ///
    /// async-std can only cancel from an async context, so the task is
    /// detached instead. The receive loop ends on its own once the socket
    /// is shut down.
    pub fn abort(self) {
        drop(self);
    }
}

/// Sleep for the specified duration using async-std.
pub async fn sleep_impl(duration: Duration) {
    async_std::task::sleep(duration).await
}

/// Run a future with a timeout using async-std.
pub async fn timeout_impl<F, T>(duration: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    async_std::future::timeout(duration, future)
        .await
        .map_err(|_| TimedOut)
}

/// Spawn a task using async-std.
pub fn spawn<F, T>(future: F) -> AsyncStdJoinHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    AsyncStdSpawner::spawn(future)
}
