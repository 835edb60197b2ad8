use mpstunnel::emulator;
use mpstunnel_transport::TcpServer;
use tracing::info;

use crate::cmd::EmulateArgs;
use crate::exit::{transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_listening, OutputFormat};

pub fn run(args: EmulateArgs, format: OutputFormat) -> CliResult<i32> {
    let server =
        TcpServer::bind(&args.bind).map_err(|err| transport_error("bind failed", err))?;
    let addr = server.local_addr().to_string();

    let handle = server.handle();
    ctrlc::set_handler(move || handle.stop())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;

    print_listening(&addr, format);
    info!(%addr, "emulated master listening");

    emulator::serve(&server).map_err(|err| transport_error("serve failed", err))?;
    info!("emulated master stopped");
    Ok(SUCCESS)
}
