//! smol runtime implementation.

use std::future::Future;
use std::io;
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use async_io::Async;
use futures::io::{AsyncReadExt, AsyncWriteExt};

use super::{AsyncTcpReader, AsyncTcpStream, AsyncTcpWriter, Spawner, TimedOut};

type Socket = Arc<Async<std::net::TcpStream>>;

/// smol-based TCP stream using async-io.
pub struct TcpStream(Async<std::net::TcpStream>);

/// Read half of a smol TCP stream.
pub struct TcpReader(Socket);

/// Write half of a smol TCP stream.
pub struct TcpWriter(Socket);

impl AsyncTcpStream for TcpStream {
    type Reader = TcpReader;
    type Writer = TcpWriter;

    async fn connect(addr: &str) -> io::Result<Self> {
        let target = addr.to_string();
        let candidates: Vec<SocketAddr> =
            smol::unblock(move || target.to_socket_addrs().map(Iterator::collect)).await?;

        let mut last_err = io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{addr} did not resolve to any address"),
        );
        for candidate in candidates {
            match Async::<std::net::TcpStream>::connect(candidate).await {
                Ok(stream) => {
                    stream.get_ref().set_nodelay(true)?;
                    return Ok(TcpStream(stream));
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn into_split(self) -> (TcpReader, TcpWriter) {
        let socket = Arc::new(self.0);
        (TcpReader(Arc::clone(&socket)), TcpWriter(socket))
    }
}

impl AsyncTcpReader for TcpReader {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut socket = &*self.0;
        socket.read(buf).await
    }
}

impl AsyncTcpWriter for TcpWriter {
    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut socket = &*self.0;
        socket.write_all(buf).await?;
        socket.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.0.get_ref().shutdown(Shutdown::Both)
    }
}

/// smol task spawner.
pub struct SmolSpawner;

impl Spawner for SmolSpawner {
    type JoinHandle<T: Send + 'static> = SmolJoinHandle<T>;

    fn spawn<F, T>(future: F) -> Self::JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        SmolJoinHandle(smol::spawn(future))
    }
}

/// Wrapper around smol's Task.
///
/// Dropping a smol task cancels it, so the handle must be kept for as long
/// as the task should run.
pub struct SmolJoinHandle<T>(smol::Task<T>);

impl<T> Future for SmolJoinHandle<T> {
    type Output = T;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        std::pin::Pin::new(&mut self.0).poll(cx)
    }
}

impl<T: Send + 'static> SmolJoinHandle<T> {
    /// Abort the task by dropping it.
    pub fn abort(self) {
        drop(self.0);
    }
}

/// Sleep for the specified duration using smol.
pub async fn sleep_impl(duration: Duration) {
    smol::Timer::after(duration).await;
}

/// Run a future with a timeout using smol.
pub async fn timeout_impl<F, T>(duration: Duration, future: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    use futures::future::Either;

    let timeout_future = smol::Timer::after(duration);

    futures::pin_mut!(future);
    futures::pin_mut!(timeout_future);

    match futures::future::select(future, timeout_future).await {
        Either::Left((result, _)) => Ok(result),
        Either::Right((_, _)) => Err(TimedOut),
    }
}

/// Spawn a task using smol.
pub fn spawn<F, T>(future: F) -> SmolJoinHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    SmolSpawner::spawn(future)
}
