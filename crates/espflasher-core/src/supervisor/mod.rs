/// Supervised external processes — launch a command, stream its combined
/// stdout/stderr line-by-line, and guarantee the child and its pipes are
/// gone on every exit path.
///
/// # Cancellation
///
/// Cancellation is cooperative at line granularity: consumers check their
/// flag between received lines and call [`Supervisor::terminate`], which is
/// idempotent, safe from any thread, and a no-op after natural exit. A
/// single blocking read is never interrupted.
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub(crate) mod stream;

/// Lines buffered before the pump threads block. The backend emits a line
/// every few KB transferred; 512 is far more headroom than consumers need.
pub const LINE_CHANNEL_CAPACITY: usize = 512;

/// Interval between child liveness polls in `wait` and `terminate`.
const POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Bounded reap window after a kill. Cleanup proceeds regardless once it
/// elapses, so cancellation is eventual rather than instantaneous.
const REAP_WINDOW: Duration = Duration::from_millis(750);

/// A running (or exited) supervised child process.
pub struct Supervisor {
    child: Arc<Mutex<Child>>,
    lines: Receiver<String>,
    program: String,
}

impl Supervisor {
    /// Launch `program` with `args`, capturing stdout and stderr.
    ///
    /// Both streams are pumped into one channel in arrival order; the
    /// channel disconnects once the child closes them.
    pub fn start<I, S>(program: impl AsRef<OsStr>, args: I) -> io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program_name = program.as_ref().to_string_lossy().into_owned();
        let mut child = Command::new(program.as_ref())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (tx, rx) = bounded(LINE_CHANNEL_CAPACITY);
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        spawn_pump("espflasher-stdout", stdout, tx.clone());
        spawn_pump("espflasher-stderr", stderr, tx);

        debug!("supervising {program_name} (pid {})", child.id());
        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            lines: rx,
            program: program_name,
        })
    }

    /// Combined output lines in arrival order. The receiver supports
    /// deadline-bounded receives for callers enforcing a timeout.
    pub fn lines(&self) -> &Receiver<String> {
        &self.lines
    }

    /// Block until the child exits and return its status.
    ///
    /// Polls rather than holding the child lock across a blocking wait, so
    /// `terminate` can run concurrently from another thread.
    pub fn wait(&self) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = self.child.lock().try_wait()? {
                return Ok(status);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Like [`Supervisor::wait`], bounded by `deadline`. Returns `None`
    /// when the child is still running at the deadline.
    pub fn wait_deadline(&self, deadline: Instant) -> io::Result<Option<ExitStatus>> {
        loop {
            if let Some(status) = self.child.lock().try_wait()? {
                return Ok(Some(status));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Kill the child and reap it within a bounded window.
    ///
    /// Idempotent: a no-op after natural exit or a previous terminate, and
    /// safe to call from a different thread than the one consuming lines.
    pub fn terminate(&self) {
        {
            let mut child = self.child.lock();
            match child.try_wait() {
                Ok(Some(_)) => return, // already exited and reaped
                Ok(None) => {
                    // A kill error here means the child exited in between.
                    let _ = child.kill();
                }
                Err(e) => {
                    warn!("{}: status poll failed during terminate: {e}", self.program);
                    return;
                }
            }
        }

        let deadline = Instant::now() + REAP_WINDOW;
        loop {
            match self.child.lock().try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
                Ok(None) => {
                    warn!("{} did not exit within the reap window", self.program);
                    return;
                }
                Err(_) => return,
            }
        }
    }
}

impl Drop for Supervisor {
    /// Last-resort cleanup: a dropped in-flight supervisor must not leak a
    /// running child.
    fn drop(&mut self) {
        let mut child = self.child.lock();
        if let Ok(None) = child.try_wait() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Pump one child stream into the shared line channel until EOF.
fn spawn_pump(name: &str, stream: impl Read + Send + 'static, tx: Sender<String>) {
    thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break; // receiver gone, stop pumping
                        }
                    }
                    Err(_) => break, // pipe closed mid-line
                }
            }
        })
        .expect("failed to spawn output pump thread");
}
