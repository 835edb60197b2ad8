use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use mpstunnel_frame::{LinkMode, SlaveEid};
use mpstunnel_link::{MpsTunnel, RecvTimeoutPolicy, TunnelConfig};
use mpstunnel_transport::{TcpConfig, TcpConnection};

use crate::exit::{tunnel_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod emulate;
pub mod link;
pub mod recv;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tunnel a payload to a slave device.
    Send(SendArgs),
    /// Print lines received from a slave device.
    Recv(RecvArgs),
    /// Run the link handshake and report the result.
    Link(LinkArgs),
    /// Run an emulated MPS master on TCP.
    Emulate(EmulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Recv(args) => recv::run(args, format),
        Command::Link(args) => link::run(args, format),
        Command::Emulate(args) => emulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum VariantArg {
    /// BINXT/BINXR hex frames with acknowledgment.
    Standard,
    /// DAT text frames.
    Legacy,
}

/// Options shared by every command that opens a tunnel.
#[derive(Args, Debug, Clone)]
pub struct TunnelArgs {
    /// Master address (host:port).
    #[arg(env = "MPSTUNNEL_MASTER")]
    pub master: String,
    /// Slave EID (16 hex characters). Without it the link must already exist.
    #[arg(long, env = "MPSTUNNEL_EID")]
    pub eid: Option<String>,
    /// Wire protocol variant.
    #[arg(long, value_enum, default_value = "standard", env = "MPSTUNNEL_VARIANT")]
    pub variant: VariantArg,
    /// Address every legacy frame by EID instead of linking.
    /// Defaults to on for the legacy variant.
    #[arg(long, overrides_with = "linked")]
    pub addressed: bool,
    /// Link to the slave even with the legacy variant.
    #[arg(long, overrides_with = "addressed")]
    pub linked: bool,
    /// Master connect timeout (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub connect_timeout: String,
    /// Receive timeout for each ACK and downstream wait.
    #[arg(long, default_value = "2s")]
    pub recv_timeout: String,
    /// Bound on each ULK/LNK handshake wait.
    #[arg(long, default_value = "61s")]
    pub link_timeout: String,
    /// Maximum payload bytes per frame.
    #[arg(long, default_value_t = mpstunnel_frame::DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,
}

impl TunnelArgs {
    pub fn slave_eid(&self) -> CliResult<Option<SlaveEid>> {
        self.eid
            .as_deref()
            .map(SlaveEid::parse)
            .transpose()
            .map_err(|err| CliError::new(USAGE, format!("--eid: {err}")))
    }

    pub fn tunnel_config(&self, policy: RecvTimeoutPolicy) -> CliResult<TunnelConfig> {
        if self.variant == VariantArg::Standard && self.addressed {
            return Err(CliError::new(
                USAGE,
                "--addressed needs --variant legacy; standard frames carry no slave address",
            ));
        }
        let base = match self.variant {
            VariantArg::Standard => TunnelConfig::default(),
            VariantArg::Legacy => TunnelConfig::legacy(),
        };
        let mut config = base
            .with_max_frame_size(self.max_frame_size)
            .with_link_timeout(parse_duration(&self.link_timeout)?)
            .with_recv_timeout_policy(policy);
        if self.addressed {
            config = config.with_link_mode(LinkMode::Unlinked);
        }
        if self.linked {
            config = config.with_link_mode(LinkMode::Linked);
        }
        Ok(config)
    }

    pub fn tcp_config(&self) -> CliResult<TcpConfig> {
        Ok(TcpConfig {
            connect_timeout: parse_duration(&self.connect_timeout)?,
            recv_timeout: parse_duration(&self.recv_timeout)?,
            ..TcpConfig::default()
        })
    }

    /// Build the tunnel and run its handshake.
    pub fn open(&self, policy: RecvTimeoutPolicy) -> CliResult<MpsTunnel<TcpConnection>> {
        let master = TcpConnection::with_config(self.master.clone(), self.tcp_config()?);
        let mut tunnel =
            MpsTunnel::with_config(master, self.slave_eid()?, self.tunnel_config(policy)?);
        tunnel
            .connect()
            .map_err(|err| tunnel_error("connect failed", err))?;
        Ok(tunnel)
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Append a carriage return to the payload.
    #[arg(long)]
    pub cr: bool,
    /// Wait for one CR-terminated reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct RecvArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,
    /// Exit after receiving N lines.
    #[arg(long)]
    pub count: Option<usize>,
    /// Stop after this long without data (e.g. 10s). Default: run until interrupted.
    #[arg(long)]
    pub idle_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    #[command(flatten)]
    pub tunnel: TunnelArgs,
    /// Leave the link in place instead of unlinking on exit.
    #[arg(long)]
    pub keep: bool,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Address to listen on (port 0 picks a free port).
    #[arg(long, default_value = "127.0.0.1:10001", env = "MPSTUNNEL_BIND")]
    pub bind: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
