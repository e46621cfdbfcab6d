//! End-to-end request/reply tests over loopback TCP

use std::time::Duration;

use serde::{Deserialize, Serialize};
use skein_ipc::{IpcError, ReconnectPolicy, ReplySocket, RequestSocket};

fn quick_retry() -> ReconnectPolicy {
    ReconnectPolicy::fixed(Duration::from_millis(25))
}

#[tokio::test]
async fn test_hello_round_trip() {
    let server = ReplySocket::bind("127.0.0.1:0", "shared").await.unwrap();
    let client = RequestSocket::connect_with(server.local_addr(), "shared", quick_retry());

    client.send("hello").unwrap();
    let request = server.recv().await.unwrap();
    assert_eq!(request, "hello");
    server.send(format!("response: {}", String::from_utf8_lossy(&request))).unwrap();

    assert_eq!(client.recv().await.unwrap(), "response: hello");
    assert!(matches!(client.recv().await, Err(IpcError::Usage(_))));
}

#[tokio::test]
async fn test_many_exchanges_on_one_connection() {
    let server = ReplySocket::bind("127.0.0.1:0", "shared").await.unwrap();
    let client = RequestSocket::connect_with(server.local_addr(), "shared", quick_retry());

    let echo = tokio::spawn(async move {
        for _ in 0..10 {
            let request = server.recv().await.unwrap();
            server.send(request).unwrap();
        }
        server
    });

    for n in 0..10 {
        let message = format!("message {}", n);
        client.send(message.clone()).unwrap();
        assert_eq!(client.recv().await.unwrap(), message.as_str());
    }
    echo.await.unwrap();
}

#[tokio::test]
async fn test_mismatched_keys_never_reach_the_server() {
    let server = ReplySocket::bind("127.0.0.1:0", "right").await.unwrap();
    let client = RequestSocket::connect_with(server.local_addr(), "wrong", quick_retry());

    client.send("sneaky").unwrap();
    assert!(matches!(
        client.recv().await,
        Err(IpcError::AuthenticationRejected)
    ));

    let nothing = tokio::time::timeout(Duration::from_millis(200), server.recv()).await;
    assert!(nothing.is_err(), "no request may arrive from an unauthenticated peer");
}

#[tokio::test]
async fn test_client_started_before_server() {
    // Reserve a free port, then release it for the server to claim later
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let addr = format!("127.0.0.1:{}", port);

    let client = RequestSocket::connect_with(addr.clone(), "shared", quick_retry());
    tokio::time::sleep(Duration::from_millis(100)).await;

    let server = ReplySocket::bind(addr.as_str(), "shared").await.unwrap();
    client.send("late server").unwrap();
    let request = server.recv().await.unwrap();
    server.send(request).unwrap();
    assert_eq!(client.recv().await.unwrap(), "late server");
}

#[tokio::test]
async fn test_server_outlives_its_clients() {
    let server = ReplySocket::bind("127.0.0.1:0", "shared").await.unwrap();

    {
        let first = RequestSocket::connect_with(server.local_addr(), "shared", quick_retry());
        first.send("one").unwrap();
        assert_eq!(server.recv().await.unwrap(), "one");
        server.send("first reply").unwrap();
        assert_eq!(first.recv().await.unwrap(), "first reply");
    }

    let second = RequestSocket::connect_with(server.local_addr(), "shared", quick_retry());
    second.send("two").unwrap();
    assert_eq!(server.recv().await.unwrap(), "two");
    server.send("second reply").unwrap();
    assert_eq!(second.recv().await.unwrap(), "second reply");
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
enum Command {
    Add { a: i64, b: i64 },
    Quit,
}

#[tokio::test]
async fn test_value_helpers() {
    let server = ReplySocket::bind("127.0.0.1:0", "shared").await.unwrap();
    let client = RequestSocket::connect_with(server.local_addr(), "shared", quick_retry());

    client.send_value(&Command::Add { a: 2, b: 40 }).unwrap();
    match server.recv_value::<Command>().await.unwrap() {
        Command::Add { a, b } => server.send_value(&(a + b)).unwrap(),
        Command::Quit => panic!("unexpected command"),
    }
    assert_eq!(client.recv_value::<i64>().await.unwrap(), 42);

    client.send("not json").unwrap();
    assert!(matches!(
        server.recv_value::<Command>().await,
        Err(IpcError::Deserialization(_))
    ));
}
