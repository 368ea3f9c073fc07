// WebSocket server for browser clients.

use async_trait::async_trait;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

pub type ClientId = u64;

/// Frames queued for one client before sends start failing.
const OUTBOUND_BUFFER: usize = 256;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A client finished the handshake. Text pushed into `outbound` is sent
    /// to that client as a text frame.
    Connected {
        client_id: ClientId,
        addr: String,
        outbound: mpsc::Sender<String>,
    },
    /// A client's connection ended.
    Disconnected { client_id: ClientId },
    /// A text frame from a client (raw JSON string).
    Message { client_id: ClientId, text: String },
}

/// Source of raw client connections.
#[async_trait]
pub trait Listener: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection and return it with the peer address.
    async fn accept(&mut self) -> std::io::Result<(Self::Stream, String)>;
}

/// TCP listener for browser clients.
pub struct TungsteniteListener {
    inner: TcpListener,
}

impl TungsteniteListener {
    pub async fn bind(host: &str, port: u16) -> anyhow::Result<Self> {
        let inner = TcpListener::bind((host, port)).await?;
        info!("WebSocket server listening on {}", inner.local_addr()?);
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }
}

#[async_trait]
impl Listener for TungsteniteListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> std::io::Result<(TcpStream, String)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((stream, addr.to_string()))
    }
}

/// Accept connections forever, serving each on its own task. Every client
/// gets a fresh id; all of their events flow through `tx`.
///
/// Returns when the listener fails or the event receiver is dropped.
pub async fn run<L: Listener>(mut listener: L, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let mut next_id: ClientId = 0;

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tx.closed() => break,
        };
        next_id += 1;
        info!("Accepted connection {next_id} from {addr}");
        tokio::spawn(serve_connection(stream, addr, next_id, tx.clone()));
    }

    Ok(())
}

/// Handshake, then pump frames in both directions until the client leaves.
async fn serve_connection<S>(stream: S, addr: String, client_id: ClientId, tx: mpsc::Sender<WsEvent>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (mut write, read) = ws_stream.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);

    if tx
        .send(WsEvent::Connected {
            client_id,
            addr: addr.clone(),
            outbound,
        })
        .await
        .is_err()
    {
        return;
    }

    // Ends once the app drops the client's sender or the socket is gone.
    tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                debug!("Dropping outbound frames for client {client_id}: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    if process_message_stream(read, &tx, client_id, &addr).await.is_err() {
        return;
    }

    info!("Client {client_id} ({addr}) disconnected");
    let _ = tx.send(WsEvent::Disconnected { client_id }).await;
}

/// Forward text frames from any [`Stream`] of WebSocket messages through
/// `tx`, tagged with `client_id`. Stops on a close frame or read error.
/// Returns `Err(())` if the channel is closed.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    client_id: ClientId,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    client_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong, Frame.
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    fn expect_text(event: WsEvent) -> (ClientId, String) {
        match event {
            WsEvent::Message { client_id, text } => (client_id, text),
            other => panic!("expected Message, got {other:?}"),
        }
    }

    /// Hands out in-memory duplex streams pushed by the test.
    struct DuplexListener {
        incoming: mpsc::Receiver<DuplexStream>,
    }

    #[async_trait]
    impl Listener for DuplexListener {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> std::io::Result<(DuplexStream, String)> {
            match self.incoming.recv().await {
                Some(stream) => Ok((stream, "memory".to_string())),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "listener closed",
                )),
            }
        }
    }

    #[tokio::test]
    async fn text_messages_forwarded_in_order_with_client_id() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("first".into())),
            Ok(Message::Text("second".into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 7, "test")
            .await
            .unwrap();

        assert_eq!(expect_text(rx.recv().await.unwrap()), (7, "first".into()));
        assert_eq!(expect_text(rx.recv().await.unwrap()), (7, "second".into()));
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("before_close".into())),
            Ok(Message::Close(None)),
            Ok(Message::Text("after_close".into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert_eq!(expect_text(rx.recv().await.unwrap()).1, "before_close");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_stops_processing() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Err(WsError::ConnectionClosed),
            Ok(Message::Text("after_error".into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn binary_and_ping_messages_are_ignored() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Text(r#"{"id":1,"type":"CHAT_CLEAR"}"#.into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert_eq!(
            expect_text(rx.recv().await.unwrap()).1,
            r#"{"id":1,"type":"CHAT_CLEAR"}"#
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn returns_err_when_channel_closed() {
        let (tx, rx) = mpsc::channel(64);
        drop(rx);

        let messages = vec![Ok(Message::Text("orphan".into()))];
        let result = process_message_stream(mock_stream(messages), &tx, 1, "test").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn serves_clients_in_both_directions() {
        let (conn_tx, conn_rx) = mpsc::channel(4);
        let (tx, mut rx) = mpsc::channel(16);
        let server = tokio::spawn(run(DuplexListener { incoming: conn_rx }, tx));

        let (client_io, server_io) = tokio::io::duplex(4096);
        conn_tx.send(server_io).await.unwrap();
        let (mut client, _) = tokio_tungstenite::client_async("ws://localhost/", client_io)
            .await
            .unwrap();

        let (client_id, outbound) = match rx.recv().await.unwrap() {
            WsEvent::Connected {
                client_id,
                addr,
                outbound,
            } => {
                assert_eq!(addr, "memory");
                (client_id, outbound)
            }
            other => panic!("expected Connected, got {other:?}"),
        };

        client.send(Message::Text("hello".into())).await.unwrap();
        assert_eq!(
            expect_text(rx.recv().await.unwrap()),
            (client_id, "hello".to_string())
        );

        outbound.send("welcome".to_string()).await.unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::Text("welcome".into()));

        client.close(None).await.unwrap();
        match rx.recv().await.unwrap() {
            WsEvent::Disconnected { client_id: id } => assert_eq!(id, client_id),
            other => panic!("expected Disconnected, got {other:?}"),
        }

        server.abort();
    }

    #[tokio::test]
    async fn each_connection_gets_a_new_id() {
        let (conn_tx, conn_rx) = mpsc::channel(4);
        let (tx, mut rx) = mpsc::channel(16);
        let server = tokio::spawn(run(DuplexListener { incoming: conn_rx }, tx));

        let mut clients = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..2 {
            let (client_io, server_io) = tokio::io::duplex(4096);
            conn_tx.send(server_io).await.unwrap();
            let (client, _) = tokio_tungstenite::client_async("ws://localhost/", client_io)
                .await
                .unwrap();
            clients.push(client);
            match rx.recv().await.unwrap() {
                WsEvent::Connected { client_id, .. } => ids.push(client_id),
                other => panic!("expected Connected, got {other:?}"),
            }
        }

        assert_eq!(ids, vec![1, 2]);
        server.abort();
    }

    #[tokio::test]
    async fn listener_binds_the_configured_host() {
        let any = TungsteniteListener::bind("0.0.0.0", 0).await.unwrap();
        assert!(any.local_addr().unwrap().ip().is_unspecified());

        let local = TungsteniteListener::bind("127.0.0.1", 0).await.unwrap();
        assert!(local.local_addr().unwrap().ip().is_loopback());
        assert_ne!(local.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn run_stops_when_receiver_dropped() {
        let (_conn_tx, conn_rx) = mpsc::channel::<DuplexStream>(1);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = run(DuplexListener { incoming: conn_rx }, tx).await;
        assert!(result.is_ok());
    }
}
