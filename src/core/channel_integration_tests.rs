//! Bridge channel client integration tests
//!
//! Runs the client against an in-process WebSocket server to exercise the
//! connect / event / reconnect / shutdown lifecycle.

#[cfg(test)]
mod tests {
    use crate::core::backoff::ReconnectPolicy;
    use crate::core::channel::{BridgeChannelClient, ConnectionState};
    use crate::core::models::{ChannelEvent, OutboundEvent};
    use futures_util::{SinkExt, StreamExt};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    fn fast_policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(20),
            cap: Duration::from_millis(100),
            rollover: 3,
            max_attempts: None,
        }
    }

    async fn recv_event(
        events: &mut mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> ChannelEvent {
        timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("event within deadline")
            .expect("event stream open")
    }

    #[tokio::test]
    async fn connects_and_surfaces_backend_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
            ws.send(Message::Text(
                r#"{"event":"import_video","data":{"path":"/tmp/a.mp4"}}"#.to_string(),
            ))
            .await
            .expect("send");
            // Hold the connection open until the client goes away.
            while ws.next().await.is_some() {}
        });

        let (client, mut events) = BridgeChannelClient::new(format!("ws://{addr}"), fast_policy());
        client.connect();

        assert_eq!(recv_event(&mut events).await, ChannelEvent::Connected);
        assert_eq!(
            recv_event(&mut events).await,
            ChannelEvent::ImportVideo {
                path: "/tmp/a.mp4".to_string()
            }
        );
        assert_eq!(client.state(), ConnectionState::Connected);
        assert_eq!(client.reconnect_attempts(), 0);

        client.shutdown();
    }

    #[tokio::test]
    async fn emitted_events_reach_the_backend() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws");
            while let Some(Ok(message)) = ws.next().await {
                if let Message::Text(text) = message {
                    let _ = frame_tx.send(text);
                }
            }
        });

        let (client, mut events) = BridgeChannelClient::new(format!("ws://{addr}"), fast_policy());
        client.connect();
        assert_eq!(recv_event(&mut events).await, ChannelEvent::Connected);

        client.emit(OutboundEvent::ImportComplete {
            success: true,
            path: "/tmp/a.mp4".to_string(),
            error: None,
            project_item: None,
        });

        let frame = timeout(Duration::from_secs(5), frame_rx.recv())
            .await
            .expect("frame within deadline")
            .expect("server saw a frame");
        let value: Value = serde_json::from_str(&frame).expect("frame is json");
        assert_eq!(value["event"], "import_complete");
        assert_eq!(value["data"]["path"], "/tmp/a.mp4");

        client.shutdown();
    }

    #[tokio::test]
    async fn reconnects_after_server_drop_and_resets_the_counter() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            // First connection: accept the handshake, then hang up.
            let (stream, _) = listener.accept().await.expect("accept 1");
            let ws = tokio_tungstenite::accept_async(stream).await.expect("ws 1");
            drop(ws);

            // Second connection: stay up.
            let (stream, _) = listener.accept().await.expect("accept 2");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("ws 2");
            while ws.next().await.is_some() {}
        });

        let (client, mut events) = BridgeChannelClient::new(format!("ws://{addr}"), fast_policy());
        client.connect();

        assert_eq!(recv_event(&mut events).await, ChannelEvent::Connected);
        assert!(matches!(
            recv_event(&mut events).await,
            ChannelEvent::Disconnected { .. }
        ));
        assert_eq!(recv_event(&mut events).await, ChannelEvent::Connected);

        // Counter resets once the channel is re-established.
        assert_eq!(client.reconnect_attempts(), 0);
        assert_eq!(client.state(), ConnectionState::Connected);

        client.shutdown();
    }

    #[tokio::test]
    async fn no_reconnect_after_explicit_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                        while ws.next().await.is_some() {}
                    }
                });
            }
        });

        let (client, mut events) = BridgeChannelClient::new(format!("ws://{addr}"), fast_policy());
        client.connect();
        assert_eq!(recv_event(&mut events).await, ChannelEvent::Connected);

        client.shutdown();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(accepts.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    if let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await {
                        ws.send(Message::Text(
                            r#"{"event":"request_project_path","data":{}}"#.to_string(),
                        ))
                        .await
                        .ok();
                        while ws.next().await.is_some() {}
                    }
                });
            }
        });

        let (client, mut events) = BridgeChannelClient::new(format!("ws://{addr}"), fast_policy());
        client.connect();
        client.connect();

        // The surviving transport still delivers events.
        timeout(Duration::from_secs(5), async {
            loop {
                if recv_event(&mut events).await == ChannelEvent::RequestProjectPath {
                    break;
                }
            }
        })
        .await
        .expect("event from the live transport");

        client.shutdown();
    }
}
