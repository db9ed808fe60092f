use conbridge_frame::CommandWriter;
use conbridge_transport::ClientStream;
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_command, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoint.to_config();
    let stream =
        ClientStream::connect(&config).map_err(|err| transport_error("connect failed", err))?;
    debug!(endpoint = %config.name, "attached to bridge");

    let command = args.command.join(" ");
    let mut writer = CommandWriter::new(stream);
    writer
        .send(&command)
        .map_err(|err| frame_error("send failed", err))?;

    print_command("sent", &command, format);
    Ok(SUCCESS)
}
