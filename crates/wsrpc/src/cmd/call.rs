use serde_json::Value;
use wsrpc_peer::{RpcConfig, RpcPeer};

use crate::cmd::{parse_duration, CallArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_result, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let call_args = resolve_args(&args)?;

    let config = RpcConfig {
        call_timeout: Some(timeout),
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

    let outcome = peer.call(args.method.as_str(), call_args).await;
    peer.close().await;

    let result = outcome.map_err(|err| rpc_error("call failed", err))?;
    print_result(&args.method, &result, format);
    Ok(SUCCESS)
}

fn resolve_args(args: &CallArgs) -> CliResult<Vec<Value>> {
    if let Some(json) = &args.args {
        let parsed: Value = serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--args is not valid JSON: {err}")))?;
        return match parsed {
            Value::Array(items) => Ok(items),
            _ => Err(CliError::new(USAGE, "--args must be a JSON array")),
        };
    }
    // Bare words become strings so `--arg hello` works without quoting.
    Ok(args
        .arg
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
        .collect())
}
