use std::sync::mpsc;
use std::sync::Arc;

use busplot_rpc::{RpcEngine, SeriesStore};
use busplot_transport::ReplayTransport;

use crate::cmd::link::build_table;
use crate::cmd::DecodeArgs;
use crate::exit::{rpc_error, transport_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_record, print_report, print_series, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let transport = ReplayTransport::open_file(&args.file)
        .map_err(|err| transport_error("open failed", err))?;

    let store = Arc::new(SeriesStore::new());
    let (tx, rx) = mpsc::channel();
    let mut engine = RpcEngine::new(build_table(Arc::clone(&store), tx)?);
    engine
        .connect(Arc::new(transport))
        .map_err(|err| rpc_error("connect failed", err))?;
    engine
        .start_receiving()
        .map_err(|err| rpc_error("start failed", err))?;
    let report = engine
        .join()
        .map_err(|err| rpc_error("decode failed", err))?;

    for record in rx.try_iter() {
        print_record(&record, format);
    }
    if args.series {
        print_series(&store.snapshot(), format);
    }
    let source = args.file.display().to_string();
    print_report(&report, &source, format);

    if args.strict && report.discarded() > 0 {
        return Err(CliError::new(
            DATA_INVALID,
            format!("{source}: {} frame(s) discarded", report.discarded()),
        ));
    }
    Ok(SUCCESS)
}
