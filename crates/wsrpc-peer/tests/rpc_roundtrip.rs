use std::net::SocketAddr;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use wsrpc_peer::{arg_f64, Component, RpcConfig, RpcError, RpcListener, RpcPeer};

fn calculator() -> Component {
    Component::new("Calculator")
        .sync_method("add", |args| {
            Ok(json!(arg_f64(&args, 0)? + arg_f64(&args, 1)?))
        })
        .sync_method("subtract", |args| {
            Ok(json!(arg_f64(&args, 0)? - arg_f64(&args, 1)?))
        })
        .sync_method("multiply", |args| {
            Ok(json!(arg_f64(&args, 0)? * arg_f64(&args, 1)?))
        })
}

/// Bind a listener with a Calculator component, accept connections in the
/// background, and hand each accepted peer to the returned channel so the
/// test controls its lifetime.
async fn spawn_server(extra: Option<Component>) -> (SocketAddr, mpsc::Receiver<RpcPeer>) {
    let listener = RpcListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    listener.registry().add_component(calculator());
    if let Some(component) = extra {
        listener.registry().add_component(component);
    }

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        while let Ok(peer) = listener.accept().await {
            if tx.send(peer).await.is_err() {
                break;
            }
        }
    });

    (addr, rx)
}

#[tokio::test]
async fn calculator_add_end_to_end() {
    let (addr, mut accepted) = spawn_server(None).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    client.ready().await.unwrap();

    let result = client
        .call("Calculator.add", vec![json!(5), json!(3)])
        .await
        .unwrap();
    assert_eq!(result.as_f64(), Some(8.0));

    let _server_peer = accepted.recv().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn unknown_method_resolves_with_method_not_found() {
    let (addr, mut accepted) = spawn_server(None).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    client.ready().await.unwrap();

    let err = client
        .call("Calculator.divide", vec![json!(1), json!(0)])
        .await
        .unwrap_err();
    assert!(
        matches!(err, RpcError::MethodNotFound(ref m) if m == "Calculator.divide"),
        "got {err:?}"
    );

    let _server_peer = accepted.recv().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn list_components_reports_remote_surface() {
    let (addr, mut accepted) = spawn_server(None).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    client.ready().await.unwrap();

    // The handshake already cached the listing.
    let cached = client.remote_components();
    assert_eq!(
        cached.get("Calculator").unwrap(),
        &vec![
            "add".to_string(),
            "multiply".to_string(),
            "subtract".to_string()
        ]
    );

    // An explicit introspection call agrees.
    let listing = client
        .call("system.listComponents", vec![])
        .await
        .unwrap();
    assert_eq!(listing.get("Calculator").unwrap(), &json!(["add", "multiply", "subtract"]));

    let _server_peer = accepted.recv().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn slow_handler_does_not_block_fast_one() {
    let pokey = Component::new("Pokey")
        .method("slow", |_args| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(json!("slow"))
        })
        .sync_method("fast", |_args| Ok(json!("fast")));
    let (addr, mut accepted) = spawn_server(Some(pokey)).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    client.ready().await.unwrap();

    let slow = client.call("Pokey.slow", vec![]);
    let fast = client.call("Pokey.fast", vec![]);

    // The fast response must come back while the slow handler still runs.
    let fast_result = tokio::time::timeout(Duration::from_millis(150), fast)
        .await
        .expect("fast call must not wait behind the slow one")
        .unwrap();
    assert_eq!(fast_result, json!("fast"));

    assert_eq!(slow.await.unwrap(), json!("slow"));

    let _server_peer = accepted.recv().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn server_calls_back_into_client() {
    let (addr, mut accepted) = spawn_server(None).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    client
        .registry()
        .add_component(Component::new("Reporter").sync_method("status", |_args| {
            Ok(json!({"healthy": true}))
        }));
    client.ready().await.unwrap();

    let server_peer = accepted.recv().await.unwrap();
    let status = server_peer
        .call("Reporter.status", vec![])
        .await
        .unwrap();
    assert_eq!(status, json!({"healthy": true}));

    client.close().await;
}

#[tokio::test]
async fn call_issued_before_ready_is_queued_and_resolves() {
    let (addr, mut accepted) = spawn_server(None).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    // No ready().await: the call must queue through Connecting/Handshaking.
    let result = client
        .call("Calculator.multiply", vec![json!(6), json!(7)])
        .await
        .unwrap();
    assert_eq!(result.as_f64(), Some(42.0));

    let _server_peer = accepted.recv().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn cancellation_resolves_locally_with_cancelled() {
    let sleepy = Component::new("Sleepy").method("nap", |_args| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(json!("rested"))
    });
    let (addr, mut accepted) = spawn_server(Some(sleepy)).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    client.ready().await.unwrap();

    let pending = client.call_with_timeout("Sleepy.nap", vec![], Duration::from_secs(60));
    let handle = pending.handle();
    assert!(handle.cancel());

    let err = pending.await.unwrap_err();
    assert!(matches!(err, RpcError::Cancelled), "got {err:?}");
    assert_eq!(client.pending_calls(), 0);

    let _server_peer = accepted.recv().await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn handler_error_carries_message_and_detail() {
    let flaky = Component::new("Flaky").sync_method("divide", |args| {
        let divisor = arg_f64(&args, 1)?;
        if divisor == 0.0 {
            return Err(RpcError::Handler {
                message: "division by zero".to_string(),
                detail: Some(json!({"divisor": 0})),
            });
        }
        Ok(json!(arg_f64(&args, 0)? / divisor))
    });
    let (addr, mut accepted) = spawn_server(Some(flaky)).await;

    let client = RpcPeer::connect(format!("ws://{addr}"), RpcConfig::default());
    client.ready().await.unwrap();

    let err = client
        .call("Flaky.divide", vec![json!(1), json!(0)])
        .await
        .unwrap_err();
    match err {
        RpcError::Handler { message, detail } => {
            assert_eq!(message, "division by zero");
            assert_eq!(detail, Some(json!({"divisor": 0})));
        }
        other => panic!("expected handler error, got {other:?}"),
    }

    let _server_peer = accepted.recv().await.unwrap();
    client.close().await;
}
