use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::config::{DataBits, FlowControl, Parity, SerialConfig, StopBits};
use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Serial tty transport configured in raw mode through termios.
///
/// Reads wait in `poll(2)` for at most the configured poll interval, so a
/// read with no incoming data wakes up periodically. That is what lets
/// [`Transport::close`] unblock the scan worker without signals. A device
/// that hangs up (e.g. an unplugged USB adapter) polls readable but yields
/// no bytes; that is reported as [`TransportError::Closed`].
pub struct SerialPort {
    file: File,
    device: PathBuf,
    label: String,
    poll_ms: libc::c_int,
    write_lock: Mutex<()>,
    open: AtomicBool,
}

impl SerialPort {
    /// Open and configure the device described by `config`.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        config.validate()?;
        let speed = baud_constant(config.baud_rate)
            .ok_or(TransportError::UnsupportedBaudRate(config.baud_rate))?;

        let device = config.device.clone();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&device)
            .map_err(|source| TransportError::Open {
                path: device.clone(),
                source,
            })?;

        configure(&file, config, speed).map_err(|source| TransportError::Configure {
            path: device.clone(),
            source,
        })?;

        info!(
            device = %device.display(),
            baud = config.baud_rate,
            data_bits = %config.data_bits,
            parity = %config.parity,
            stop_bits = %config.stop_bits,
            flow_control = %config.flow_control,
            "serial port opened"
        );

        let label = device.display().to_string();
        Ok(Self {
            file,
            device,
            label,
            poll_ms: libc::c_int::try_from(config.poll_interval_ms).unwrap_or(libc::c_int::MAX),
            write_lock: Mutex::new(()),
            open: AtomicBool::new(true),
        })
    }

    /// Path of the opened device.
    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl Transport for SerialPort {
    fn read_exact(&self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0usize;
        while filled < buf.len() {
            if !self.is_open() {
                return Err(TransportError::Closed);
            }
            match read_ready(&self.file, &mut buf[filled..], self.poll_ms) {
                Ok(Some(n)) => filled += n,
                // Poll interval expired; loop to observe close().
                Ok(None) => continue,
                Err(_) if !self.is_open() => return Err(TransportError::Closed),
                Err(TransportError::Closed) => {
                    if self.open.swap(false, Ordering::SeqCst) {
                        warn!(device = %self.label, "serial device hung up");
                    }
                    return Err(TransportError::Closed);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn write_all(&self, buf: &[u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut offset = 0usize;
        while offset < buf.len() {
            match (&self.file).write(&buf[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        drain(&self.file)?;
        Ok(offset)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(device = %self.label, "serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("device", &self.device)
            .field("open", &self.is_open())
            .finish()
    }
}

fn configure(file: &File, config: &SerialConfig, speed: libc::speed_t) -> std::io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: an all-zero termios is a valid value to pass to tcgetattr,
    // which overwrites it completely.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open descriptor owned by `file`; `tio` is writable.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` was initialized by tcgetattr above.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CREAD | libc::CLOCAL;

    tio.c_cflag &= !libc::CSIZE;
    tio.c_cflag |= match config.data_bits {
        DataBits::Five => libc::CS5,
        DataBits::Six => libc::CS6,
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    };

    match config.parity {
        Parity::None => {
            tio.c_cflag &= !(libc::PARENB | libc::PARODD);
            tio.c_iflag &= !libc::INPCK;
        }
        Parity::Odd => {
            tio.c_cflag |= libc::PARENB | libc::PARODD;
            tio.c_iflag |= libc::INPCK;
        }
        Parity::Even => {
            tio.c_cflag |= libc::PARENB;
            tio.c_cflag &= !libc::PARODD;
            tio.c_iflag |= libc::INPCK;
        }
    }

    match config.stop_bits {
        StopBits::One => tio.c_cflag &= !libc::CSTOPB,
        StopBits::Two => tio.c_cflag |= libc::CSTOPB,
    }

    match config.flow_control {
        FlowControl::None => {
            tio.c_cflag &= !libc::CRTSCTS;
            tio.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        }
        FlowControl::Hardware => {
            tio.c_cflag |= libc::CRTSCTS;
            tio.c_iflag &= !(libc::IXON | libc::IXOFF | libc::IXANY);
        }
        FlowControl::Software => {
            tio.c_cflag &= !libc::CRTSCTS;
            tio.c_iflag |= libc::IXON | libc::IXOFF;
        }
    }

    tio.c_cc[libc::VMIN] = 0;
    tio.c_cc[libc::VTIME] = poll_deciseconds(config.poll_interval_ms);

    // SAFETY: `tio` is a valid termios; the speed constant comes from libc.
    unsafe {
        if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    // SAFETY: `fd` is open and `tio` is fully initialized.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // Stale bytes from before the open would only feed the resync path.
    // SAFETY: `fd` is open.
    unsafe { libc::tcflush(fd, libc::TCIOFLUSH) };

    Ok(())
}

/// Wait up to `timeout_ms` for input, then read what is available.
///
/// `Ok(None)` means nothing arrived in time. A descriptor that polls ready
/// but reads zero bytes, or fails after a hangup, is reported as `Closed`.
fn read_ready<R>(source: &R, buf: &mut [u8], timeout_ms: libc::c_int) -> Result<Option<usize>>
where
    R: AsRawFd,
    for<'a> &'a R: Read,
{
    let mut pfd = libc::pollfd {
        fd: source.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is one valid pollfd that outlives the call.
    let ready = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if ready < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(None);
        }
        return Err(TransportError::Io(err));
    }
    if ready == 0 {
        return Ok(None);
    }
    if pfd.revents & libc::POLLNVAL != 0 {
        return Err(TransportError::Closed);
    }

    let mut reader = source;
    match reader.read(buf) {
        Ok(0) => Err(TransportError::Closed),
        Ok(n) => Ok(Some(n)),
        Err(err) if err.kind() == ErrorKind::Interrupted => Ok(None),
        Err(_) if pfd.revents & libc::POLLHUP != 0 => Err(TransportError::Closed),
        Err(err) => Err(TransportError::Io(err)),
    }
}

fn drain(file: &File) -> Result<()> {
    loop {
        // SAFETY: the descriptor is owned by `file` for the duration of the call.
        if unsafe { libc::tcdrain(file.as_raw_fd()) } == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(TransportError::Io(err));
        }
    }
}

/// `VTIME` is expressed in tenths of a second and must fit in a `cc_t`.
fn poll_deciseconds(poll_interval_ms: u64) -> libc::cc_t {
    let tenths = poll_interval_ms.div_ceil(100).clamp(1, 255);
    tenths as libc::cc_t
}

fn baud_constant(rate: u32) -> Option<libc::speed_t> {
    let speed = match rate {
        50 => libc::B50,
        75 => libc::B75,
        110 => libc::B110,
        134 => libc::B134,
        150 => libc::B150,
        200 => libc::B200,
        300 => libc::B300,
        600 => libc::B600,
        1200 => libc::B1200,
        1800 => libc::B1800,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(target_os = "linux")]
        460800 => libc::B460800,
        #[cfg(target_os = "linux")]
        921600 => libc::B921600,
        _ => return None,
    };
    Some(speed)
}
