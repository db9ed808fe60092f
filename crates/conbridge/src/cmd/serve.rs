use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use conbridge_frame::{LogRecord, ScannerConfig};
use conbridge_link::{Bridge, LinkConfig, LogHub};
use tracing::{debug, info, warn};

use crate::cmd::ServeArgs;
use crate::exit::{io_error, link_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_command, OutputFormat};

const IDLE_TICK: Duration = Duration::from_millis(20);

/// Run a demonstration host.
///
/// Each stdin line is published as a log record. Each received command is
/// printed and echoed back to the client as a record.
pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = args.endpoint.to_config().with_mode(args.mode);
    let config = LinkConfig::default()
        .with_poll_interval(Duration::from_millis(args.poll_ms.max(1)))
        .with_scanner(ScannerConfig {
            max_pending: args.max_command,
            overflow: args.overflow.into(),
            ..ScannerConfig::default()
        });

    let hub = Arc::new(LogHub::new());
    let executed = Arc::new(AtomicU64::new(0));
    let sink = {
        let hub = Arc::clone(&hub);
        let executed = Arc::clone(&executed);
        let channel = args.channel.clone();
        move |command: &str| {
            print_command("executed", command, format);
            hub.publish(&LogRecord::new(channel.as_str(), format!("] {command}")));
            executed.fetch_add(1, Ordering::SeqCst);
        }
    };

    let mut bridge = Bridge::new(Arc::clone(&hub), endpoint.clone(), sink, config);
    bridge
        .start()
        .map_err(|err| link_error("start failed", err))?;
    info!(endpoint = %endpoint.name, dir = %endpoint.dir.display(), "serving console bridge");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;
    spawn_stdin_pump(Arc::clone(&hub), args.channel)?;

    while running.load(Ordering::SeqCst) {
        if args
            .count
            .is_some_and(|count| executed.load(Ordering::SeqCst) >= count)
        {
            break;
        }
        thread::sleep(IDLE_TICK);
    }

    let stats = bridge.stats();
    bridge
        .stop()
        .map_err(|err| link_error("stop failed", err))?;
    info!(
        sent = stats.records_sent,
        dropped = stats.records_dropped,
        commands = stats.commands_dispatched,
        connections = stats.connections,
        "console bridge stopped"
    );
    Ok(SUCCESS)
}

fn spawn_stdin_pump(hub: Arc<LogHub>, channel: String) -> CliResult<()> {
    thread::Builder::new()
        .name("conbridge-stdin".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => hub.publish(&LogRecord::new(channel.as_str(), format!("{line}\n"))),
                    Err(err) => {
                        warn!(error = %err, "stdin read failed");
                        break;
                    }
                }
            }
            debug!("stdin closed");
        })
        .map(|_| ())
        .map_err(|err| io_error("stdin thread spawn failed", err))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
