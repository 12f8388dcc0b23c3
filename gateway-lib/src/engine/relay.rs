use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::buffer_pool::{BufferPool, Tier};

/// Pump bytes between `a` and `b` until one direction finishes.
///
/// Each direction runs as its own task holding one large-tier buffer from
/// `pool`. The first direction to finish decides the result; the other one is
/// cancelled but not awaited. End of stream is reported as `Ok(())`, every
/// other I/O error is returned as is.
pub async fn relay<A, B>(a: A, b: B, pool: &Arc<BufferPool>) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);
    let cancel = CancellationToken::new();

    let mut a_to_b = tokio::spawn(pump(a_read, b_write, pool.clone(), cancel.clone()));
    let mut b_to_a = tokio::spawn(pump(b_read, a_write, pool.clone(), cancel.clone()));

    let (direction, joined) = tokio::select! {
        r = &mut a_to_b => ("a->b", r),
        r = &mut b_to_a => ("b->a", r),
    };
    cancel.cancel();

    let result = match joined {
        Ok(r) => r,
        Err(e) => Err(io::Error::other(e)),
    };
    debug!(direction, result = ?result, "relay finished");

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(()),
        Err(e) => Err(e),
    }
}

async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    pool: Arc<BufferPool>,
    cancel: CancellationToken,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = pool.acquire(Tier::Large);
    tokio::select! {
        res = copy_buffer(&mut reader, &mut writer, &mut buf) => res,
        _ = cancel.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "opposite direction finished")),
    }
}

/// Copy `reader` into `writer` through `buf` until end of stream, then shut
/// down the write side. Returns the number of bytes copied.
pub async fn copy_buffer<R, W>(reader: &mut R, writer: &mut W, buf: &mut [u8]) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut total = 0u64;
    loop {
        let n = reader.read(buf).await?;
        if n == 0 {
            let _ = writer.shutdown().await;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
}
