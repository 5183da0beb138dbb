use super::TestClient;
use ajj_hub::{pubsub::InboundFrame, Client, ClientId, HubHandle, RawValue};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A connection attached directly to the hub over in-memory channels.
pub struct MemClient {
    pub client: Client,
    frames: Option<mpsc::Sender<InboundFrame>>,
    out: mpsc::Receiver<Box<RawValue>>,
    id: u64,
}

/// Attach an in-memory connection to the hub.
pub fn mem_client(hub: &HubHandle, client_id: Option<&str>) -> MemClient {
    let (frames, inbound) = mpsc::channel(16);
    let (sink, out) = mpsc::channel(16);
    let client = hub
        .attach(
            client_id.map(ClientId::from),
            sink,
            ReceiverStream::new(inbound),
        )
        .unwrap();

    MemClient {
        client,
        frames: Some(frames),
        out,
        id: 0,
    }
}

impl MemClient {
    /// Send a frame of any kind.
    pub async fn send_frame(&mut self, frame: InboundFrame) {
        self.frames
            .as_ref()
            .expect("connection already dropped")
            .send(frame)
            .await
            .unwrap();
    }

    /// End the inbound stream, as a peer disconnect would.
    pub fn disconnect(&mut self) {
        self.frames = None;
    }

    /// Receive the next outbound frame, if one arrives within `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<serde_json::Value> {
        let json = tokio::time::timeout(wait, self.out.recv()).await.ok()??;
        Some(serde_json::from_str(json.get()).unwrap())
    }
}

impl TestClient for MemClient {
    fn next_id(&mut self) -> u64 {
        self.id += 1;
        self.id
    }

    async fn send_raw(&mut self, frame: &str) {
        self.send_frame(InboundFrame::text(frame.to_owned())).await;
    }

    async fn recv<D: serde::de::DeserializeOwned>(&mut self) -> D {
        let json = tokio::time::timeout(Duration::from_secs(5), self.out.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed");
        serde_json::from_str(json.get()).unwrap()
    }
}
