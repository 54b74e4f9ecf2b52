//! Detached process handles.
//!
//! A detached command hands back its output streams and a [`ProcessControl`]
//! for signalling and awaiting exit. The implementation side keeps the
//! matching [`ProcessDriver`] and reports the exit status through it.

use std::fmt;

use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::sync::{mpsc, oneshot};

use crate::errors::SandboxError;
use crate::types::Signal;

/// Byte stream of a process's stdout or stderr.
pub type OutputStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A running detached command.
pub struct CommandProcess {
    /// Standard output.
    pub stdout: OutputStream,
    /// Standard error.
    pub stderr: OutputStream,
    /// Signal delivery and exit status.
    pub control: ProcessControl,
}

impl fmt::Debug for CommandProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProcess")
            .field("control", &self.control)
            .finish_non_exhaustive()
    }
}

/// Caller half of a detached process.
///
/// With [`kill_on_drop`](Self::kill_on_drop) set, dropping the handle before
/// the exit was observed and before any signal was sent delivers
/// [`Signal::Terminate`].
#[derive(Debug)]
pub struct ProcessControl {
    signals: mpsc::UnboundedSender<Signal>,
    exit: oneshot::Receiver<Result<i32, SandboxError>>,
    kill_on_drop: bool,
}

/// Implementation half of a detached process.
#[derive(Debug)]
pub struct ProcessDriver {
    /// Signals requested by the caller.
    pub signals: mpsc::UnboundedReceiver<Signal>,
    /// Where to report the exit code.
    pub exit: oneshot::Sender<Result<i32, SandboxError>>,
}

impl ProcessDriver {
    /// Report the process exit. A caller that already went away is ignored.
    pub fn finish(self, status: Result<i32, SandboxError>) {
        let _ = self.exit.send(status);
    }
}

impl ProcessControl {
    /// Create a connected control/driver pair.
    #[must_use]
    pub fn pair() -> (Self, ProcessDriver) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        (
            Self {
                signals: signal_tx,
                exit: exit_rx,
                kill_on_drop: false,
            },
            ProcessDriver {
                signals: signal_rx,
                exit: exit_tx,
            },
        )
    }

    /// Terminate the process when this handle is dropped early.
    #[must_use]
    pub fn kill_on_drop(mut self, enabled: bool) -> Self {
        self.kill_on_drop = enabled;
        self
    }

    /// Ask the process to handle `signal`.
    ///
    /// Signalling a process that already exited is not an error. An explicit
    /// signal disarms [`kill_on_drop`](Self::kill_on_drop).
    pub fn kill(&mut self, signal: Signal) {
        self.kill_on_drop = false;
        let _ = self.signals.send(signal);
    }

    /// Wait for the process to exit and return its exit code.
    pub async fn wait(mut self) -> Result<i32, SandboxError> {
        let status = (&mut self.exit).await;
        self.kill_on_drop = false;
        status.map_err(|_| SandboxError::Command("process driver went away before exit".into()))?
    }
}

impl Drop for ProcessControl {
    fn drop(&mut self) {
        if self.kill_on_drop {
            let _ = self.signals.send(Signal::Terminate);
        }
    }
}
