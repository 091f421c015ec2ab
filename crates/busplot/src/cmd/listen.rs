use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use busplot_rpc::{RpcEngine, ScanExit, SeriesStore};
use tracing::info;

use crate::cmd::link::build_table;
use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{rpc_error, CliError, CliResult, SUCCESS, TIMEOUT, TRANSPORT_ERROR};
use crate::output::{print_record, print_report, print_series, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

enum Finish {
    Done,
    Idle(Duration),
    WorkerExited,
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let store = Arc::new(SeriesStore::new());
    let (tx, rx) = mpsc::channel();
    let mut engine = RpcEngine::new(build_table(Arc::clone(&store), tx)?);
    let endpoint = args.link.connect(&mut engine)?;
    engine
        .start_receiving()
        .map_err(|err| rpc_error("start failed", err))?;
    info!(%endpoint, "listening");

    let idle_timeout = args.idle_timeout_ms.map(Duration::from_millis);
    let mut printed = 0usize;
    let mut last_message = Instant::now();

    let finish = loop {
        if !running.load(Ordering::SeqCst) {
            break Finish::Done;
        }
        if args.count.is_some_and(|count| printed >= count) {
            break Finish::Done;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(record) => {
                print_record(&record, format);
                printed = printed.saturating_add(1);
                last_message = Instant::now();
            }
            Err(RecvTimeoutError::Timeout) => {
                if !engine.is_receiving() {
                    for record in rx.try_iter() {
                        print_record(&record, format);
                    }
                    break Finish::WorkerExited;
                }
                if let Some(limit) = idle_timeout {
                    if last_message.elapsed() >= limit {
                        break Finish::Idle(limit);
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => break Finish::WorkerExited,
        }
    };

    engine
        .close()
        .map_err(|err| rpc_error("close failed", err))?;
    print_series(&store.snapshot(), format);
    if let Some(report) = engine.last_report() {
        print_report(report, &endpoint, format);
    }

    match finish {
        Finish::Done => Ok(SUCCESS),
        Finish::Idle(limit) => Err(CliError::new(
            TIMEOUT,
            format!("no message from {endpoint} within {}ms", limit.as_millis()),
        )),
        Finish::WorkerExited => match engine.last_report().map(|r| &r.exit) {
            Some(ScanExit::Stopped) | None => Ok(SUCCESS),
            Some(exit) => Err(CliError::new(
                TRANSPORT_ERROR,
                format!("{endpoint}: {exit}"),
            )),
        },
    }
}
