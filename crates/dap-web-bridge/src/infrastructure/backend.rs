//! Backend connector: reaching the debug adapter.
//!
//! A session needs one bidirectional byte channel to its debug adapter.  The
//! adapter is reached in one of two ways, chosen by the snapshot's
//! [`BackendMode`]:
//!
//! - **TCP** – the adapter already runs in server mode; dial `host:port`.
//! - **Spawn** – launch the adapter as a child process and use its stdin
//!   (bridge → adapter) and stdout (adapter → bridge).  Its stderr is
//!   forwarded to the debug log.
//!
//! Both produce a [`DuplexStream`]: a boxed reader, a boxed writer, and a
//! [`BackendLifetime`] that is closed once when the session ends.  The
//! session pump never looks at which mode produced the stream.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use dap_core::BackendMode;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// How long a spawned adapter may take to exit after its stdin is closed
/// before it is killed.
const CHILD_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Reasons the adapter could not be reached.
#[derive(Debug, Error)]
pub enum BackendConnectError {
    #[error("failed to connect to debug adapter at {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to launch debug adapter {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("debug adapter {0} started without piped stdio")]
    MissingPipes(PathBuf),
}

// ── Duplex stream ─────────────────────────────────────────────────────────────

/// Readable half of a backend connection.
pub type BackendReader = Box<dyn AsyncRead + Send + Unpin>;
/// Writable half of a backend connection.
pub type BackendWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Resources tied to a backend connection beyond its two halves.
#[derive(Debug)]
pub enum BackendLifetime {
    /// A TCP socket; dropping both halves closes it.
    Socket,
    /// A spawned adapter process.
    Process {
        child: Child,
        stderr_task: Option<JoinHandle<()>>,
    },
    /// Halves supplied by the caller (tests, in-memory pipes).
    Detached,
}

impl BackendLifetime {
    /// Releases the backend.  Call after both halves have been dropped.
    ///
    /// For a process this waits briefly for it to exit on its own (its stdin
    /// is closed by then) and kills it otherwise.
    pub async fn close(self) {
        match self {
            BackendLifetime::Socket | BackendLifetime::Detached => {}
            BackendLifetime::Process {
                mut child,
                stderr_task,
            } => {
                let pid = child.id();
                match tokio::time::timeout(CHILD_EXIT_GRACE, child.wait()).await {
                    Ok(Ok(status)) => debug!(?pid, %status, "debug adapter exited"),
                    Ok(Err(e)) => warn!(?pid, "waiting for debug adapter failed: {e}"),
                    Err(_) => {
                        debug!(?pid, "debug adapter still running; killing it");
                        if let Err(e) = child.kill().await {
                            warn!(?pid, "failed to kill debug adapter: {e}");
                        }
                    }
                }
                if let Some(task) = stderr_task {
                    task.abort();
                }
            }
        }
    }
}

/// A bidirectional byte channel to the debug adapter, owned by one session.
pub struct DuplexStream {
    reader: BackendReader,
    writer: BackendWriter,
    lifetime: BackendLifetime,
}

impl std::fmt::Debug for DuplexStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexStream")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl DuplexStream {
    /// Wraps a connected TCP socket.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: Box::new(read_half),
            writer: Box::new(write_half),
            lifetime: BackendLifetime::Socket,
        }
    }

    /// Wraps arbitrary halves with no extra lifetime to manage.
    pub fn from_halves(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            lifetime: BackendLifetime::Detached,
        }
    }

    /// Splits the stream for the two relays.
    pub fn into_parts(self) -> (BackendReader, BackendWriter, BackendLifetime) {
        (self.reader, self.writer, self.lifetime)
    }
}

// ── Connector ─────────────────────────────────────────────────────────────────

/// Opens a [`DuplexStream`] for a [`BackendMode`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Connects to the adapter described by `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendConnectError`] when the dial or the launch fails.
    async fn connect(&self, mode: &BackendMode) -> Result<DuplexStream, BackendConnectError>;
}

/// Connector that dials real sockets and spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConnector;

#[async_trait]
impl BackendConnector for NativeConnector {
    async fn connect(&self, mode: &BackendMode) -> Result<DuplexStream, BackendConnectError> {
        match mode {
            BackendMode::Tcp { address } => dial(address).await,
            BackendMode::Spawn {
                program,
                args,
                working_dir,
            } => spawn(program, args, working_dir.as_deref()),
        }
    }
}

async fn dial(address: &str) -> Result<DuplexStream, BackendConnectError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|source| BackendConnectError::Dial {
            address: address.to_string(),
            source,
        })?;
    // DAP is request/response; small frames must not wait for Nagle.
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY on backend socket: {e}");
    }
    info!(address, "connected to debug adapter");
    Ok(DuplexStream::from_tcp(stream))
}

fn spawn(
    program: &Path,
    args: &[String],
    working_dir: Option<&Path>,
) -> Result<DuplexStream, BackendConnectError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    let mut child = command.spawn().map_err(|source| BackendConnectError::Spawn {
        program: program.to_path_buf(),
        source,
    })?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(BackendConnectError::MissingPipes(program.to_path_buf()));
    };
    let stderr_task = child.stderr.take().map(|stderr| {
        tokio::spawn(forward_stderr(stderr).instrument(tracing::Span::current()))
    });

    info!(program = %program.display(), pid = ?child.id(), "launched debug adapter");
    Ok(DuplexStream {
        reader: Box::new(stdout),
        writer: Box::new(stdin),
        lifetime: BackendLifetime::Process { child, stderr_task },
    })
}

/// Copies the adapter's stderr into the debug log, one record per line.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(target: "dap_web_bridge::adapter_stderr", "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!("stopped reading debug adapter stderr: {e}");
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
