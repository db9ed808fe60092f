use conbridge_frame::{FrameError, LogRecordReader};
use conbridge_transport::ClientStream;
use tracing::info;

use crate::cmd::TailArgs;
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

pub fn run(args: TailArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.endpoint.to_config();
    let stream =
        ClientStream::connect(&config).map_err(|err| transport_error("connect failed", err))?;
    let mut reader = LogRecordReader::new(stream);

    let mut printed = 0usize;
    loop {
        if args.count.is_some_and(|count| printed >= count) {
            return Ok(SUCCESS);
        }

        let record = match reader.read_record() {
            Ok(record) => record,
            Err(FrameError::ConnectionClosed) => {
                info!(records = printed, "bridge closed the endpoint");
                return Ok(SUCCESS);
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        print_record(&record, format);
        printed = printed.saturating_add(1);
    }
}
