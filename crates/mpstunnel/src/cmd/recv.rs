use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mpstunnel_frame::CR;
use mpstunnel_link::RecvTimeoutPolicy;
use tracing::{info, warn};

use crate::cmd::{parse_duration, RecvArgs};
use crate::exit::{tunnel_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_received, Origin, OutputFormat};

pub fn run(args: RecvArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_timeout = args.idle_timeout.as_deref().map(parse_duration).transpose()?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut tunnel = args.tunnel.open(RecvTimeoutPolicy::EmptyRead)?;
    let eid = tunnel.eid().map(|eid| eid.as_str().to_string());
    let codec = tunnel.codec().name();
    let origin = Origin {
        master: &args.tunnel.master,
        eid: eid.as_deref(),
        codec,
    };
    info!(master = %args.tunnel.master, "receiving");

    let mut line = Vec::new();
    let mut printed = 0usize;
    let mut last_data = Instant::now();
    let mut outcome = Ok(SUCCESS);

    while running.load(Ordering::SeqCst) {
        match tunnel.recv() {
            Ok(Some(byte)) => {
                last_data = Instant::now();
                line.push(byte);
                if byte != CR {
                    continue;
                }
                print_received(&line, origin, format);
                line.clear();
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Ok(None) => {
                if idle_timeout.is_some_and(|idle| last_data.elapsed() >= idle) {
                    outcome = Err(CliError::new(
                        TIMEOUT,
                        format!("no data for {:?}", last_data.elapsed()),
                    ));
                    break;
                }
            }
            Err(err) => {
                outcome = Err(tunnel_error("receive failed", err));
                break;
            }
        }
    }

    if !line.is_empty() {
        print_received(&line, origin, format);
    }
    if let Err(err) = tunnel.disconnect() {
        warn!(error = %err, "disconnect after recv failed");
    }
    outcome
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
