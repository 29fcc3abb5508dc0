//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener on `127.0.0.1:0` and dial it with the
//! client connector, so bytes actually cross a socket.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use tandem_transport::{
        Connection, Connector, TransportError, WebSocketConnector,
        WebSocketListener,
    };

    async fn listener() -> (WebSocketListener, String) {
        let listener = WebSocketListener::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = listener.local_addr().expect("local addr").to_string();
        (listener, addr)
    }

    #[tokio::test]
    async fn test_connector_and_listener_exchange_frames() {
        let (listener, addr) = listener().await;

        let server = tokio::spawn(async move {
            listener.accept().await.expect("should accept")
        });

        let client = WebSocketConnector
            .connect(&addr)
            .await
            .expect("client should connect");
        let server_conn = server.await.expect("task should complete");

        assert!(client.id().into_inner() > 0);
        assert_ne!(client.id(), server_conn.id());

        // --- Server sends, client receives ---
        server_conn.send(b"hello from server").await.unwrap();
        let got = client.recv().await.unwrap().expect("should have data");
        assert_eq!(got, b"hello from server");

        // --- Client sends, server receives ---
        client.send(b"hello from client").await.unwrap();
        let got = server_conn.recv().await.unwrap().expect("should have data");
        assert_eq!(got, b"hello from client");

        client.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_pending_recv_does_not_block_send() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move { listener.accept().await.unwrap() });

        let client = std::sync::Arc::new(
            WebSocketConnector.connect(&addr).await.unwrap(),
        );
        let server_conn = server.await.unwrap();

        // Park a reader on the client before anything is sent.
        let reader = {
            let client = std::sync::Arc::clone(&client);
            tokio::spawn(async move { client.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The write half must still be usable.
        tokio::time::timeout(Duration::from_secs(2), client.send(b"ping"))
            .await
            .expect("send must not wait for the reader")
            .unwrap();
        assert_eq!(server_conn.recv().await.unwrap().unwrap(), b"ping");

        server_conn.send(b"pong").await.unwrap();
        let echoed = reader.await.unwrap().unwrap().unwrap();
        assert_eq!(echoed, b"pong");
    }

    #[tokio::test]
    async fn test_recv_returns_none_on_peer_close() {
        let (listener, addr) = listener().await;
        let server = tokio::spawn(async move { listener.accept().await.unwrap() });

        let client = WebSocketConnector.connect(&addr).await.unwrap();
        let server_conn = server.await.unwrap();

        client.close().await.unwrap();

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on client close");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Bind then drop so the port is (almost certainly) closed.
        let (listener, addr) = listener().await;
        drop(listener);

        let err = WebSocketConnector.connect(&addr).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectFailed { .. }));
        assert!(err.to_string().contains(&addr));
    }
}
