use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("netcomm {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: netcomm");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("NETCOMM_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "profile: {}",
        option_env!("NETCOMM_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "features: socket={}, async={}, cli=true",
        cfg!(feature = "socket"),
        cfg!(feature = "async")
    );
    println!("text_max_len: {}", netcomm_frame::TEXT_MAX_LEN);
    println!("arg_max_len: {}", netcomm_frame::ARG_MAX_LEN);

    Ok(SUCCESS)
}
