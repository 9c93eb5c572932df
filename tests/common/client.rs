//! Test WebSocket client.
//!
//! Sends typed envelopes and asserts on the JSON frames the hub pushes back.

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// A test hub client.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub user_id: String,
}

impl TestClient {
    /// Connect as `user_id` using the trusted identity header.
    pub async fn connect(url: &str, user_id: &str) -> anyhow::Result<Self> {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("x-user-id", HeaderValue::from_str(user_id)?);
        let (ws, _response) = connect_async(request).await?;
        Ok(Self {
            ws,
            user_id: user_id.to_string(),
        })
    }

    /// Connect without any credentials.
    #[allow(dead_code)]
    pub async fn connect_anonymous(url: &str) -> anyhow::Result<Self> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self {
            ws,
            user_id: String::new(),
        })
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a `{type, data}` envelope.
    pub async fn send(&mut self, kind: &str, data: Value) -> anyhow::Result<()> {
        self.send_raw(&json!({ "type": kind, "data": data }).to_string())
            .await
    }

    /// Receive a single JSON frame.
    pub async fn recv(&mut self) -> anyhow::Result<Value> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a JSON frame with a timeout, skipping keepalives.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Value> {
        loop {
            let msg = timeout(dur, self.ws.next())
                .await?
                .ok_or_else(|| anyhow::anyhow!("connection closed"))??;
            match msg {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(frame) => anyhow::bail!("closed by server: {frame:?}"),
                _ => continue,
            }
        }
    }

    /// Receive frames until `predicate` matches; returns all of them.
    #[allow(dead_code)]
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<Value>>
    where
        F: FnMut(&Value) -> bool,
    {
        let mut frames = Vec::new();
        loop {
            let frame = self.recv().await?;
            let done = predicate(&frame);
            frames.push(frame);
            if done {
                return Ok(frames);
            }
        }
    }

    /// Receive until a notification with `action_type` arrives.
    #[allow(dead_code)]
    pub async fn recv_action(&mut self, action_type: &str) -> anyhow::Result<Value> {
        let mut frames = self
            .recv_until(|f| f["action_type"] == action_type)
            .await?;
        frames
            .pop()
            .ok_or_else(|| anyhow::anyhow!("no {action_type} frame"))
    }

    /// Assert nothing but keepalives arrives within `dur`.
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(dur).await {
            Ok(frame) => anyhow::bail!("unexpected frame: {frame}"),
            Err(e) if e.is::<tokio::time::error::Elapsed>() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Read until the server closes; returns its close frame.
    #[allow(dead_code)]
    pub async fn expect_close(&mut self) -> anyhow::Result<Option<CloseFrame<'static>>> {
        loop {
            match timeout(Duration::from_secs(5), self.ws.next()).await? {
                Some(Ok(Message::Close(frame))) => return Ok(frame),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return Ok(None),
            }
        }
    }

    /// Close the connection normally.
    #[allow(dead_code)]
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}
