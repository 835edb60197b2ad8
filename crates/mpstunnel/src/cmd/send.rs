use std::fs;

use mpstunnel_frame::CR;
use mpstunnel_link::{MpsTunnel, RecvTimeoutPolicy};
use mpstunnel_transport::{DuplexConnection, TcpConnection};
use tracing::{debug, warn};

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, transport_error, tunnel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_received, Origin, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    if payload.is_empty() {
        return Err(CliError::new(USAGE, "payload is empty"));
    }
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let mut tunnel = args.tunnel.open(RecvTimeoutPolicy::Surface)?;
    let result = exchange(&mut tunnel, &payload, args.wait, wait_timeout);

    if let Err(err) = tunnel.disconnect() {
        warn!(error = %err, "disconnect after send failed");
    }

    if let Some(reply) = result? {
        let eid = tunnel.eid().map(|eid| eid.as_str().to_string());
        let origin = Origin {
            master: &args.tunnel.master,
            eid: eid.as_deref(),
            codec: tunnel.codec().name(),
        };
        print_received(&reply, origin, format);
    }

    Ok(SUCCESS)
}

fn exchange(
    tunnel: &mut MpsTunnel<TcpConnection>,
    payload: &[u8],
    wait: bool,
    wait_timeout: std::time::Duration,
) -> CliResult<Option<Vec<u8>>> {
    tunnel
        .send(payload)
        .map_err(|err| tunnel_error("send failed", err))?;
    debug!(bytes = payload.len(), "payload delivered");

    if !wait {
        return Ok(None);
    }

    tunnel
        .master_mut()
        .set_recv_timeout(wait_timeout)
        .map_err(|err| transport_error("set timeout failed", err))?;
    let reply = tunnel
        .recv_until(&[CR])
        .map_err(|err| tunnel_error("receive failed", err))?;
    Ok(Some(reply))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    let mut payload = if let Some(hex) = &args.hex {
        hex::decode(hex.trim())
            .map_err(|err| CliError::new(USAGE, format!("--hex is not valid hex: {err}")))?
    } else if let Some(data) = &args.data {
        data.as_bytes().to_vec()
    } else if let Some(path) = &args.file {
        fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?
    } else {
        Vec::new()
    };
    if args.cr && payload.last() != Some(&CR) {
        payload.push(CR);
    }
    Ok(payload)
}
