//! Length-framed byte delivery over TCP.
//!
//! Each message travels on its own connection: the sender connects, writes a
//! single frame, flushes and hangs up. Frames carry a 4-byte big-endian
//! length prefix, so a short read can never bleed into an adjacent message.
//! Frames larger than the configured maximum are rejected on both ends.
//!
//! The driver binds a [`ResponseListener`] on each worker's response port and
//! pulls one frame per accepted connection from it. The worker server reads
//! jobs with [`Transport::recv_frame`] and ships results back with
//! [`Transport::send_frame`].
use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, FramedRead, LengthDelimitedCodec};
use tracing::{instrument, trace};

use crate::{
    config::{Config, DEFAULT_MAX_FRAME_LENGTH},
    error::{Result, TransportError},
};

/// Frame codec settings shared by senders and receivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transport {
    max_frame_length: usize,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl From<&Config> for Transport {
    fn from(config: &Config) -> Self {
        Self::new(config.max_frame_length)
    }
}

impl Transport {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }

    fn codec(&self) -> LengthDelimitedCodec {
        LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(self.max_frame_length)
            .new_codec()
    }

    /// Connect to `addr`, write `payload` as a single frame and close the
    /// connection.
    #[instrument(skip(self, payload), fields(len = payload.len()), level = "trace")]
    pub async fn send_frame(&self, addr: SocketAddr, payload: Bytes) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect { addr, source })?;

        let mut framed = Framed::new(stream, self.codec());
        framed.send(payload).await.map_err(TransportError::from)?;
        SinkExt::<Bytes>::close(&mut framed)
            .await
            .map_err(TransportError::from)?;

        trace!("frame sent");
        Ok(())
    }

    /// Read exactly one frame from an accepted connection.
    pub async fn recv_frame(&self, stream: TcpStream) -> Result<Bytes> {
        let peer = stream.peer_addr().ok();
        let mut reader = FramedRead::new(stream, self.codec());

        match reader.next().await {
            Some(frame) => Ok(frame.map_err(TransportError::from)?.freeze()),
            None => Err(TransportError::Closed { peer }.into()),
        }
    }

    /// Bind a control or response port.
    pub async fn bind(&self, addr: SocketAddr) -> Result<TcpListener> {
        Ok(TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?)
    }
}

/// Driver-side listener on a worker's response port.
///
/// Yields one frame per accepted connection.
#[derive(Debug)]
pub struct ResponseListener {
    listener: TcpListener,
    transport: Transport,
}

impl ResponseListener {
    pub async fn bind(addr: SocketAddr, transport: Transport) -> Result<Self> {
        let listener = transport.bind(addr).await?;
        Ok(Self {
            listener,
            transport,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept the next connection without reading from it.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        Ok(self.listener.accept().await?)
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Accept the next connection and read its frame.
    ///
    /// Reads inline, so a connection that never sends holds up every later
    /// one. Use [`Self::accept`] and read on a separate task to avoid that.
    pub async fn accept_frame(&self) -> Result<(SocketAddr, Bytes)> {
        let (stream, peer) = self.accept().await?;
        let frame = self.transport.recv_frame(stream).await?;
        Ok((peer, frame))
    }
}

#[cfg(test)]
mod test {
    use std::net::{IpAddr, Ipv4Addr};

    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::error::Error;

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn frame_arrives_intact() {
        let transport = Transport::default();
        let listener = ResponseListener::bind(localhost(), transport).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let payload = Bytes::from_static(b"chunk payload");
        let send = tokio::spawn(async move { transport.send_frame(addr, payload).await });

        let (_, frame) = listener.accept_frame().await.unwrap();
        send.await.unwrap().unwrap();
        assert_eq!(frame, Bytes::from_static(b"chunk payload"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn connect_refused_is_transport_error() {
        let transport = Transport::default();
        // Grab a free port, then release it so nothing listens there.
        let addr = {
            let listener = transport.bind(localhost()).await.unwrap();
            listener.local_addr().unwrap()
        };

        let err = transport
            .send_frame(addr, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Connect { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_frame_is_rejected() {
        let listener = ResponseListener::bind(localhost(), Transport::new(8))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let send = tokio::spawn(async move {
            Transport::new(1024)
                .send_frame(addr, Bytes::from(vec![0u8; 64]))
                .await
        });

        let err = listener.accept_frame().await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Io(_))));
        let _ = send.await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn hang_up_before_frame_is_closed_error() {
        let listener = ResponseListener::bind(localhost(), Transport::default())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let err = listener.accept_frame().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::Closed { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bind_conflict_is_bind_error() {
        let transport = Transport::default();
        let taken = transport.bind(localhost()).await.unwrap();
        let err = transport
            .bind(taken.local_addr().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Bind { .. })));
    }
}
