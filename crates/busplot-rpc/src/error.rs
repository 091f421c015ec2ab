/// Errors that can occur in dispatch and engine operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] busplot_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] busplot_frame::FrameError),

    /// A handler is already registered for the command.
    #[error("command 0x{command:04X} is already registered to {existing}")]
    DuplicateCommand { command: u16, existing: String },

    /// No handler is registered for the command.
    #[error("no handler registered for command 0x{0:04X}")]
    UnknownCommand(u16),

    /// The engine has no transport.
    #[error("not connected")]
    NotConnected,

    /// The engine has no receive worker to wait for.
    #[error("not receiving")]
    NotReceiving,

    /// The engine is already running a receive worker.
    #[error("already receiving")]
    AlreadyReceiving,

    /// Handlers can only be added before receiving starts.
    #[error("registration is closed once receiving has started")]
    RegistrationClosed,

    /// The receive worker thread could not be started.
    #[error("failed to spawn receive worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    /// The receive worker panicked.
    #[error("receive worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, RpcError>;
