use std::fs;
use std::sync::mpsc::Sender;
use std::sync::Arc;

use busplot_frame::ApplyArgument;
use busplot_rpc::{register_series_sink, DispatchTable, RpcEngine, SeriesSink, SeriesStore};
use busplot_transport::SerialConfig;

use crate::cmd::LinkArgs;
use crate::exit::{rpc_error, transport_error, CliError, CliResult, USAGE};
use crate::output::MessageRecord;

impl LinkArgs {
    /// Serial settings from `--config`, then the device and line flags.
    pub fn serial_config(&self) -> CliResult<SerialConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|err| {
                    CliError::new(USAGE, format!("failed reading {}: {err}", path.display()))
                })?;
                serde_json::from_str::<SerialConfig>(&text).map_err(|err| {
                    CliError::new(USAGE, format!("invalid config {}: {err}", path.display()))
                })?
            }
            None => SerialConfig::default(),
        };

        if let Some(device) = &self.device {
            config.device = device.clone();
        }
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        if let Some(data_bits) = self.data_bits {
            config.data_bits = data_bits;
        }
        if let Some(parity) = self.parity {
            config.parity = parity;
        }
        if let Some(stop_bits) = self.stop_bits {
            config.stop_bits = stop_bits;
        }
        if let Some(flow_control) = self.flow_control {
            config.flow_control = flow_control;
        }

        config
            .validate()
            .map_err(|err| transport_error("invalid serial settings", err))?;
        Ok(config)
    }

    /// Connect `engine` to the socket or serial device. Returns the endpoint name.
    pub fn connect(&self, engine: &mut RpcEngine) -> CliResult<String> {
        if let Some(path) = &self.socket {
            return connect_socket(path, engine);
        }

        let config = self.serial_config()?;
        engine
            .connect_serial(&config)
            .map_err(|err| rpc_error("connect failed", err))?;
        Ok(config.device.display().to_string())
    }
}

#[cfg(unix)]
fn connect_socket(path: &std::path::Path, engine: &mut RpcEngine) -> CliResult<String> {
    let stream = busplot_transport::StreamTransport::connect(path)
        .map_err(|err| transport_error("connect failed", err))?;
    engine
        .connect(Arc::new(stream))
        .map_err(|err| rpc_error("connect failed", err))?;
    Ok(path.display().to_string())
}

#[cfg(not(unix))]
fn connect_socket(path: &std::path::Path, _engine: &mut RpcEngine) -> CliResult<String> {
    Err(CliError::new(
        USAGE,
        format!("--socket {} needs a Unix host", path.display()),
    ))
}

/// Series sink that records into a store and forwards every event for printing.
struct RecordTap {
    store: Arc<SeriesStore>,
    records: Sender<MessageRecord>,
}

impl SeriesSink for RecordTap {
    fn on_alias(&self, variable_id: u16, alias: &str) {
        self.store.on_alias(variable_id, alias);
        let _ = self.records.send(MessageRecord::VariableAlias {
            variable_id,
            alias: alias.to_string(),
        });
    }

    fn on_value(&self, variable_id: u16, value: f32, timestamp_us: u64) {
        self.store.on_value(variable_id, value, timestamp_us);
        let _ = self.records.send(MessageRecord::UpdateVariable {
            variable_id,
            value,
            timestamp_us,
        });
    }

    fn on_remove(&self, variable_id: u16) {
        self.store.on_remove(variable_id);
        let _ = self
            .records
            .send(MessageRecord::RemoveVariable { variable_id });
    }
}

/// Handlers for all four messages: variable events feed `store`, and every
/// message is forwarded to `records`.
pub fn build_table(
    store: Arc<SeriesStore>,
    records: Sender<MessageRecord>,
) -> CliResult<DispatchTable> {
    let mut table = DispatchTable::new();
    let tap = RecordTap {
        store,
        records: records.clone(),
    };
    register_series_sink(&mut table, Arc::new(tap))
        .map_err(|err| rpc_error("handler setup failed", err))?;
    table
        .register(move |msg: ApplyArgument| {
            let _ = records.send(msg.into());
        })
        .map_err(|err| rpc_error("handler setup failed", err))?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::mpsc;

    use busplot_frame::{decode_frame, encode_request, UpdateVariable, VariableAlias};
    use busplot_transport::{Parity, StopBits};

    use super::*;

    fn temp_file(tag: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "busplot-link-{tag}-{}-{}.json",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        fs::write(&path, contents).expect("temp file should be writable");
        path
    }

    #[test]
    fn flags_override_config_file() {
        let path = temp_file(
            "override",
            r#"{"device": "/dev/ttyS1", "baud_rate": 9600, "parity": "even"}"#,
        );
        let args = LinkArgs {
            config: Some(path.clone()),
            baud: Some(57_600),
            stop_bits: Some(StopBits::Two),
            ..LinkArgs::default()
        };
        let config = args.serial_config().unwrap();
        assert_eq!(config.device, PathBuf::from("/dev/ttyS1"));
        assert_eq!(config.baud_rate, 57_600);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_device_is_rejected() {
        let err = LinkArgs::default().serial_config().unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn malformed_config_is_usage_error() {
        let path = temp_file("bad", "{ not json");
        let args = LinkArgs {
            config: Some(path.clone()),
            ..LinkArgs::default()
        };
        let err = args.serial_config().unwrap_err();
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("invalid config"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn table_feeds_store_and_records() {
        let store = Arc::new(SeriesStore::new());
        let (tx, rx) = mpsc::channel();
        let table = build_table(Arc::clone(&store), tx).unwrap();
        assert_eq!(table.commands(), vec![0x0010, 0x0020, 0x0030, 0x0040]);

        for wire in [
            encode_request(&VariableAlias::new(1, "Foo")).unwrap(),
            encode_request(&UpdateVariable {
                variable_id: 1,
                value: 4.0,
            })
            .unwrap(),
            encode_request(&ApplyArgument::default()).unwrap(),
        ] {
            table.dispatch(&decode_frame(&wire).unwrap()).unwrap();
        }

        let records: Vec<MessageRecord> = rx.try_iter().collect();
        assert_eq!(records.len(), 3);
        assert!(matches!(records[0], MessageRecord::VariableAlias { variable_id: 1, .. }));
        assert!(matches!(records[2], MessageRecord::ApplyArgument { .. }));
        assert_eq!(store.get(1).unwrap().samples.len(), 1);
    }
}
