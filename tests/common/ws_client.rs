use super::TestClient;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};

/// Create a WebSocket client for testing, optionally presenting an identity
/// in the `X-Client-Id` header.
pub async fn ws_client(url: &str, client_id: Option<&str>) -> WsClient {
    let mut request = url.into_client_request().unwrap();
    if let Some(id) = client_id {
        request
            .headers_mut()
            .insert("x-client-id", id.parse().unwrap());
    }
    let (socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    WsClient { socket, id: 0 }
}

pub struct WsClient {
    pub socket: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    id: u64,
}

impl WsClient {
    /// True if the server closes the connection within a few seconds.
    pub async fn closed_by_server(&mut self) -> bool {
        let wait = async {
            loop {
                match self.socket.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                    Some(Ok(_)) => continue,
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .is_ok()
    }
}

impl TestClient for WsClient {
    fn next_id(&mut self) -> u64 {
        self.id += 1;
        self.id
    }

    async fn send_raw(&mut self, frame: &str) {
        self.socket
            .send(Message::Text(frame.to_owned().into()))
            .await
            .unwrap();
    }

    async fn recv<D: serde::de::DeserializeOwned>(&mut self) -> D {
        let next = tokio::time::timeout(Duration::from_secs(5), self.socket.next())
            .await
            .expect("timed out waiting for a frame");
        match next.unwrap().unwrap() {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
