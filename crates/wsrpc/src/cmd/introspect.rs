use wsrpc_peer::{RpcConfig, RpcPeer};

use crate::cmd::{parse_duration, IntrospectArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_components, OutputFormat};

pub async fn run(args: IntrospectArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;

    let config = RpcConfig {
        call_timeout: Some(timeout),
        handshake_timeout: timeout,
        ..RpcConfig::default()
    };
    let peer = RpcPeer::connect(args.url.as_str(), config);

    match tokio::time::timeout(timeout, peer.ready()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            peer.close().await;
            return Err(rpc_error("connect failed", err));
        }
        Err(_) => {
            peer.close().await;
            return Err(CliError::new(
                TIMEOUT,
                format!("connecting to {} timed out", args.url),
            ));
        }
    }

    // The handshake already fetched the listing.
    let components = peer.remote_components();
    peer.close().await;

    print_components(&components, format);
    Ok(SUCCESS)
}
