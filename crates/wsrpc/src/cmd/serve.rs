use serde_json::json;
use tracing::{info, warn};
use wsrpc_peer::{arg_f64, Component, ConnectionState, RpcError, RpcListener};

use crate::cmd::ServeArgs;
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub async fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener = RpcListener::bind(&args.addr)
        .await
        .map_err(|err| rpc_error("bind failed", err))?;
    let addr = listener
        .local_addr()
        .map_err(|err| rpc_error("bind failed", err))?;
    listener.registry().add_component(calculator());

    info!(%addr, "serving");
    println!("listening on ws://{addr}");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(SUCCESS);
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok(peer) => {
                        // The peer handle owns the connection; hold it in a
                        // task until the far side goes away. The state starts
                        // out Disconnected, so wait for Ready first.
                        tokio::spawn(async move {
                            let mut events = peer.events();
                            if events.ready().await.is_ok() {
                                let _ = events.wait_for(ConnectionState::Disconnected).await;
                            }
                        });
                    }
                    Err(err) => warn!(%err, "accept failed"),
                }
            }
        }
    }
}

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
        .sync_method("divide", |args| {
            let divisor = arg_f64(&args, 1)?;
            if divisor == 0.0 {
                return Err(RpcError::handler("division by zero"));
            }
            Ok(json!(arg_f64(&args, 0)? / divisor))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculator_exposes_four_methods() {
        let registry = wsrpc_peer::MethodRegistry::new();
        registry.add_component(calculator());
        let listing = registry.list_components();
        assert_eq!(
            listing.get("Calculator").unwrap(),
            &vec![
                "add".to_string(),
                "divide".to_string(),
                "multiply".to_string(),
                "subtract".to_string()
            ]
        );
    }
}
