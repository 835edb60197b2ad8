use std::time::Instant;

use mpstunnel_frame::LinkMode;
use mpstunnel_link::{RecvTimeoutPolicy, SessionState};
use mpstunnel_transport::DuplexConnection;
use tracing::info;

use crate::cmd::LinkArgs;
use crate::exit::{transport_error, tunnel_error, CliResult, SUCCESS};
use crate::output::{print_link_report, LinkReport, OutputFormat};

pub fn run(args: LinkArgs, format: OutputFormat) -> CliResult<i32> {
    let started = Instant::now();
    let mut tunnel = args.tunnel.open(RecvTimeoutPolicy::Surface)?;
    let elapsed_ms = started.elapsed().as_millis();

    let eid = tunnel.eid().map(|eid| eid.as_str().to_string());
    let codec = tunnel.codec().name();
    let mode = tunnel.config().link_mode;
    let linked = tunnel.session_state() == SessionState::Ready
        && mode == LinkMode::Linked
        && eid.is_some();
    info!(master = %args.tunnel.master, linked, elapsed_ms, "handshake complete");

    if args.keep {
        // Drop the master without ULK so the link outlives this process.
        let mut master = tunnel.into_inner();
        master
            .disconnect()
            .map_err(|err| transport_error("disconnect failed", err))?;
    } else {
        tunnel
            .disconnect()
            .map_err(|err| tunnel_error("unlink failed", err))?;
    }

    let report = LinkReport {
        master: &args.tunnel.master,
        eid: eid.as_deref(),
        codec,
        mode: match mode {
            LinkMode::Linked => "linked",
            LinkMode::Unlinked => "addressed",
        },
        linked,
        kept: args.keep && linked,
        elapsed_ms,
    };
    print_link_report(&report, format);
    Ok(SUCCESS)
}
