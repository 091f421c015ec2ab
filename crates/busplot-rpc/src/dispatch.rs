//! Command dispatch table.
//!
//! Maps command ids to type-erased decode-and-invoke handlers. The table is
//! filled during setup and is read-only once the engine starts receiving.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use busplot_frame::{CommandLookup, Frame, FrameError, Message, MAX_BODY_SIZE};
use tracing::debug;

use crate::error::{Result, RpcError};

/// A type-erased handler invoked with a verified frame body.
pub trait Handler: Send + Sync + 'static {
    /// Decode `body` and act on it.
    fn call(&self, body: &[u8]) -> Result<()>;
}

/// Wrapper that decodes the body as `M` before calling the handler.
pub struct TypedHandler<M, F>
where
    M: Message,
    F: Fn(M) + Send + Sync + 'static,
{
    handler: F,
    _message: PhantomData<fn(M)>,
}

impl<M, F> TypedHandler<M, F>
where
    M: Message,
    F: Fn(M) + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _message: PhantomData,
        }
    }
}

impl<M, F> Handler for TypedHandler<M, F>
where
    M: Message,
    F: Fn(M) + Send + Sync + 'static,
{
    fn call(&self, body: &[u8]) -> Result<()> {
        let message = M::decode_body(body)?;
        (self.handler)(message);
        Ok(())
    }
}

/// Handler over the raw body bytes.
struct RawHandler<F>(F);

impl<F> Handler for RawHandler<F>
where
    F: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
{
    fn call(&self, body: &[u8]) -> Result<()> {
        (self.0)(body)
    }
}

/// A registered command.
pub struct DispatchEntry {
    expected_size: usize,
    name: String,
    handler: Box<dyn Handler>,
}

impl DispatchEntry {
    /// Body size frames for this command must carry.
    pub fn expected_size(&self) -> usize {
        self.expected_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the handler with a body.
    pub fn call(&self, body: &[u8]) -> Result<()> {
        self.handler.call(body)
    }
}

impl fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchEntry")
            .field("name", &self.name)
            .field("expected_size", &self.expected_size)
            .finish_non_exhaustive()
    }
}

/// Registry mapping command ids to handlers.
#[derive(Debug, Default)]
pub struct DispatchTable {
    entries: HashMap<u16, DispatchEntry>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed handler for message `M`.
    ///
    /// Fails with [`RpcError::DuplicateCommand`] if `M::COMMAND` is taken; the
    /// existing handler stays in place.
    pub fn register<M, F>(&mut self, handler: F) -> Result<()>
    where
        M: Message,
        F: Fn(M) + Send + Sync + 'static,
    {
        self.insert(
            M::COMMAND,
            M::SIZE,
            M::NAME.to_string(),
            Box::new(TypedHandler::new(handler)),
        )
    }

    /// Register a handler over raw bodies of `expected_size` bytes.
    pub fn register_raw<F>(
        &mut self,
        command: u16,
        expected_size: usize,
        name: impl Into<String>,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
    {
        if expected_size > MAX_BODY_SIZE {
            return Err(FrameError::BodyTooLarge {
                size: expected_size,
                max: MAX_BODY_SIZE,
            }
            .into());
        }
        self.insert(
            command,
            expected_size,
            name.into(),
            Box::new(RawHandler(handler)),
        )
    }

    fn insert(
        &mut self,
        command: u16,
        expected_size: usize,
        name: String,
        handler: Box<dyn Handler>,
    ) -> Result<()> {
        if let Some(existing) = self.entries.get(&command) {
            return Err(RpcError::DuplicateCommand {
                command,
                existing: existing.name.clone(),
            });
        }
        debug!(command, expected_size, name = %name, "handler registered");
        self.entries.insert(
            command,
            DispatchEntry {
                expected_size,
                name,
                handler,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, command: u16) -> Option<&DispatchEntry> {
        self.entries.get(&command)
    }

    /// Invoke the handler registered for `frame`'s command.
    pub fn dispatch(&self, frame: &Frame) -> Result<()> {
        let entry = self
            .lookup(frame.command())
            .ok_or(RpcError::UnknownCommand(frame.command()))?;
        entry.call(&frame.body)
    }

    /// Registered command ids in ascending order.
    pub fn commands(&self) -> Vec<u16> {
        let mut commands: Vec<u16> = self.entries.keys().copied().collect();
        commands.sort_unstable();
        commands
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CommandLookup for DispatchTable {
    fn expected_size(&self, command: u16) -> Option<usize> {
        self.lookup(command).map(DispatchEntry::expected_size)
    }
}
