//! Start an emulated MPS master on a free port, then talk to a slave
//! through it with both wire variants.
//!
//! ```sh
//! cargo run -p mpstunnel --example tunnel-echo
//! ```

use std::thread;

use mpstunnel::emulator;
use mpstunnel::frame::SlaveEid;
use mpstunnel::link::{MpsTunnel, TunnelError};
use mpstunnel::transport::{TcpConnection, TcpServer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = TcpServer::bind("127.0.0.1:0")?;
    let addr = server.local_addr().to_string();
    let handle = server.handle();
    let master_thread = thread::spawn(move || emulator::serve(&server));
    println!("emulated master on {addr}");

    let eid: SlaveEid = "0123456789ABCDEF".parse()?;

    let mut tunnel = MpsTunnel::new(TcpConnection::new(addr.clone()), Some(eid.clone()));
    tunnel.connect()?;
    let reply = round_trip(&mut tunnel, b"REV\r")?;
    println!("binxt reply: {}", String::from_utf8_lossy(&reply).trim_end());
    tunnel.disconnect()?;

    let mut legacy = MpsTunnel::legacy(TcpConnection::new(addr), Some(eid));
    legacy.connect()?;
    let reply = round_trip(&mut legacy, b"STATUS?\r")?;
    println!("dat reply: {}", String::from_utf8_lossy(&reply).trim_end());
    legacy.disconnect()?;

    handle.stop();
    master_thread
        .join()
        .map_err(|_| "emulator thread panicked")??;
    Ok(())
}

fn round_trip(
    tunnel: &mut MpsTunnel<TcpConnection>,
    request: &[u8],
) -> Result<Vec<u8>, TunnelError> {
    tunnel.send(request)?;
    tunnel.recv_until(b"\r")
}
