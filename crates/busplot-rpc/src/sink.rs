//! Time series collaborator.
//!
//! A [`SeriesSink`] receives alias, value and removal events decoded from the
//! wire. [`register_series_sink`] binds the three variable messages to a sink
//! and stamps every value with its receive time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use busplot_frame::{Message, RemoveVariable, UpdateVariable, VariableAlias};
use serde::Serialize;

use crate::dispatch::DispatchTable;
use crate::error::{Result, RpcError};

/// Consumer of variable events.
pub trait SeriesSink: Send + Sync + 'static {
    fn on_alias(&self, variable_id: u16, alias: &str);

    /// A new sample, stamped in microseconds since the Unix epoch.
    fn on_value(&self, variable_id: u16, value: f32, timestamp_us: u64);

    fn on_remove(&self, variable_id: u16);
}

/// Microseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Route alias, update and remove messages into `sink`.
///
/// Either all three handlers are registered or none is: a taken command
/// leaves `table` untouched.
pub fn register_series_sink<S: SeriesSink>(table: &mut DispatchTable, sink: Arc<S>) -> Result<()> {
    for command in [
        VariableAlias::COMMAND,
        UpdateVariable::COMMAND,
        RemoveVariable::COMMAND,
    ] {
        if let Some(existing) = table.lookup(command) {
            return Err(RpcError::DuplicateCommand {
                command,
                existing: existing.name().to_string(),
            });
        }
    }

    let alias_sink = Arc::clone(&sink);
    table.register(move |msg: VariableAlias| {
        alias_sink.on_alias(msg.variable_id, &msg.alias_str());
    })?;

    let value_sink = Arc::clone(&sink);
    table.register(move |msg: UpdateVariable| {
        value_sink.on_value(msg.variable_id, msg.value, now_micros());
    })?;

    table.register(move |msg: RemoveVariable| {
        sink.on_remove(msg.variable_id);
    })
}

/// One timestamped value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp_us: u64,
    pub value: f32,
}

/// Everything known about one variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    pub alias: Option<String>,
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn last(&self) -> Option<Sample> {
        self.samples.last().copied()
    }

    /// Smallest and largest sample value.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.samples.iter().fold(None, |acc, s| match acc {
            None => Some((s.value, s.value)),
            Some((lo, hi)) => Some((lo.min(s.value), hi.max(s.value))),
        })
    }
}

/// Thread-safe in-memory series keyed by variable id.
#[derive(Debug, Default)]
pub struct SeriesStore {
    series: Mutex<BTreeMap<u16, Series>>,
}

impl SeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every series.
    pub fn snapshot(&self) -> BTreeMap<u16, Series> {
        self.lock().clone()
    }

    pub fn get(&self, variable_id: u16) -> Option<Series> {
        self.lock().get(&variable_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u16, Series>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SeriesSink for SeriesStore {
    fn on_alias(&self, variable_id: u16, alias: &str) {
        self.lock().entry(variable_id).or_default().alias = Some(alias.to_string());
    }

    fn on_value(&self, variable_id: u16, value: f32, timestamp_us: u64) {
        self.lock()
            .entry(variable_id)
            .or_default()
            .samples
            .push(Sample {
                timestamp_us,
                value,
            });
    }

    fn on_remove(&self, variable_id: u16) {
        self.lock().remove(&variable_id);
    }
}

#[cfg(test)]
mod tests {
    use busplot_frame::{decode_frame, encode_request};

    use super::*;

    fn deliver<M: busplot_frame::Message>(table: &DispatchTable, msg: &M) {
        let wire = encode_request(msg).unwrap();
        table.dispatch(&decode_frame(&wire).unwrap()).unwrap();
    }

    #[test]
    fn store_tracks_alias_values_and_removal() {
        let store = Arc::new(SeriesStore::new());
        let mut table = DispatchTable::new();
        register_series_sink(&mut table, Arc::clone(&store)).unwrap();
        assert_eq!(table.commands(), vec![0x0010, 0x0020, 0x0030]);

        deliver(&table, &VariableAlias::new(1, "Foo"));
        deliver(
            &table,
            &UpdateVariable {
                variable_id: 1,
                value: 10.0,
            },
        );
        deliver(
            &table,
            &UpdateVariable {
                variable_id: 1,
                value: -4.0,
            },
        );
        deliver(
            &table,
            &UpdateVariable {
                variable_id: 2,
                value: 1.0,
            },
        );

        let foo = store.get(1).unwrap();
        assert_eq!(foo.alias.as_deref(), Some("Foo"));
        assert_eq!(foo.samples.len(), 2);
        assert_eq!(foo.range(), Some((-4.0, 10.0)));
        assert!(foo.samples[0].timestamp_us <= foo.samples[1].timestamp_us);
        assert!(foo.samples[0].timestamp_us > 0);

        let unnamed = store.get(2).unwrap();
        assert_eq!(unnamed.alias, None);
        assert_eq!(unnamed.last().map(|s| s.value), Some(1.0));

        deliver(&table, &RemoveVariable { variable_id: 1 });
        assert!(store.get(1).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn sink_registration_conflicts_with_existing_handler() {
        let mut table = DispatchTable::new();
        table.register(|_: UpdateVariable| {}).unwrap();
        let err = register_series_sink(&mut table, Arc::new(SeriesStore::new())).unwrap_err();
        assert!(matches!(
            err,
            crate::RpcError::DuplicateCommand {
                command: 0x0020,
                ..
            }
        ));
    }

    #[test]
    fn failed_sink_registration_leaves_table_unchanged() {
        for taken in [UpdateVariable::COMMAND, RemoveVariable::COMMAND] {
            let mut table = DispatchTable::new();
            table.register_raw(taken, 2, "taken", |_| Ok(())).unwrap();
            let before = table.commands();

            let err = register_series_sink(&mut table, Arc::new(SeriesStore::new())).unwrap_err();
            assert!(matches!(
                err,
                crate::RpcError::DuplicateCommand { command, ref existing }
                    if command == taken && existing == "taken"
            ));
            assert_eq!(table.commands(), before);
            assert_eq!(table.lookup(taken).unwrap().name(), "taken");
        }
    }

    #[test]
    fn alias_after_values_names_existing_series() {
        let store = SeriesStore::new();
        store.on_value(5, 1.5, 100);
        store.on_alias(5, "late");
        let snapshot = store.snapshot();
        assert_eq!(snapshot[&5].alias.as_deref(), Some("late"));
        assert_eq!(
            snapshot[&5].samples,
            vec![Sample {
                timestamp_us: 100,
                value: 1.5
            }]
        );
    }

    #[test]
    fn empty_series_has_no_range() {
        assert_eq!(Series::default().range(), None);
        assert!(SeriesStore::new().is_empty());
    }
}
