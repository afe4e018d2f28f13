use pipebridge_relay::PipeProxy;

use crate::cmd::ServeArgs;
use crate::exit::{relay_error, CliResult};
use crate::output::{print_endpoint, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let proxy =
        PipeProxy::start(&args.path).map_err(|err| relay_error("relay start failed", err))?;

    print_endpoint(proxy.local_addr(), proxy.channel_path(), format);

    // The relay runs on background threads; teardown and process exit
    // happen in the termination hook it registered at start.
    loop {
        std::thread::park();
    }
}
