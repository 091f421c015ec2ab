use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use busplot_frame::{UpdateVariable, VariableAlias};
use busplot_rpc::{DispatchTable, RpcEngine};
use serde::Serialize;
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, SimulateArgs};
use crate::exit::{rpc_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

/// The simulated device's variables: id, alias and waveform over seconds.
const WAVES: [(u16, &str, fn(f32) -> f32); 2] = [(1, "Foo", foo), (2, "Bar", bar)];

fn foo(s: f32) -> f32 {
    50.0 * (s * 40.0).sin() + 10.0
}

fn bar(s: f32) -> f32 {
    10.0 * (s * 20.0).cos() + 10.0
}

#[derive(Serialize)]
struct SimulateOutput<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    endpoint: &'a str,
    aliases: usize,
    updates: u64,
    bytes: usize,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut engine = RpcEngine::new(DispatchTable::new());
    let endpoint = args.link.connect(&mut engine)?;
    info!(%endpoint, "simulating device");

    let mut bytes = 0usize;
    for (id, alias, _) in WAVES {
        bytes += engine
            .request(&VariableAlias::new(id, alias))
            .map_err(|err| rpc_error("send failed", err))?;
    }

    let interval = Duration::from_millis(args.interval_ms);
    let start = Instant::now();
    let mut rounds = 0u64;
    while running.load(Ordering::SeqCst) && args.count.is_none_or(|count| rounds < count) {
        let s = start.elapsed().as_secs_f32();
        for (id, _, wave) in WAVES {
            bytes += engine
                .request(&UpdateVariable {
                    variable_id: id,
                    value: wave(s),
                })
                .map_err(|err| rpc_error("send failed", err))?;
        }
        rounds += 1;
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
    debug!(rounds, bytes, "simulation finished");
    engine
        .close()
        .map_err(|err| rpc_error("close failed", err))?;

    let updates = rounds * WAVES.len() as u64;
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(&SimulateOutput {
                kind: "simulate-summary",
                endpoint: &endpoint,
                aliases: WAVES.len(),
                updates,
                bytes,
            })
            .unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "{endpoint}: sent {} aliases and {updates} updates ({bytes} bytes)",
            WAVES.len()
        ),
    }
    Ok(SUCCESS)
}
