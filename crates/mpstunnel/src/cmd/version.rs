use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("mpstunnel {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: mpstunnel");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("MPSTUNNEL_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "variants: standard (max frame {}), legacy",
        mpstunnel_frame::DEFAULT_MAX_FRAME_SIZE
    );
    println!(
        "features: link={}, emulator={}, cli=true",
        cfg!(feature = "link"),
        cfg!(feature = "emulator")
    );

    Ok(SUCCESS)
}
