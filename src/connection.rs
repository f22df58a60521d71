use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::{CodecError, FrameCodec};
use crate::frame::Frame;

/// A client connection, reading and writing whole [`Frame`]s.
pub struct Connection {
    pub id: Uuid,
    pub client_address: Option<SocketAddr>,
    // Bytes read from the socket are buffered inside `Framed` until a full frame can be parsed.
    framed: Framed<TcpStream, FrameCodec>,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection::with_codec(stream, FrameCodec::default())
    }

    pub fn with_codec(stream: TcpStream, codec: FrameCodec) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            client_address: stream.peer_addr().ok(),
            framed: Framed::new(stream, codec),
        }
    }

    /// Waits for the next frame. `Ok(None)` means the peer closed the connection between frames;
    /// closing in the middle of one is an error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        self.framed.next().await.transpose()
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), CodecError> {
        self.framed.send(frame).await
    }
}
