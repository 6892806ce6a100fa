use std::{
    io::{Read, Write},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use {
    portable_pty::{CommandBuilder, PtySize, native_pty_system},
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    ring::OutputRing,
};

const READ_BUFFER_BYTES: usize = 16 * 1024;
/// `EIO`: what a PTY master read returns once the shell side has closed.
const EIO: i32 = 5;

/// Output delivered by a process session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Output(String),
    Error(String),
    Closed,
}

/// Handle to a live process session owned by one channel.
pub trait ProcessHandle: Send + Sync {
    fn id(&self) -> &str;

    fn pid(&self) -> Option<u32>;

    /// Write raw bytes to the process input.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Write one line followed by a line terminator.
    fn write_line(&self, line: &str) -> Result<()> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write(&bytes)
    }

    /// Best-effort interrupt of whatever runs in the foreground.
    fn interrupt(&self) -> Result<()> {
        self.write(b"\x03")
    }

    /// Terminate the process. Never fails; errors are logged.
    fn kill(&self);

    /// The last `n` output chunks kept in the session's ring buffer.
    fn recent_output(&self, n: usize) -> Vec<String>;

    /// Milliseconds since the epoch of the last read or write.
    fn last_activity_ms(&self) -> u64;
}

/// A freshly spawned process and the receiving end of its output.
pub struct SpawnedProcess {
    pub handle: Arc<dyn ProcessHandle>,
    pub output: mpsc::UnboundedReceiver<OutputEvent>,
}

/// Creates process sessions for channels.
pub trait ProcessSpawner: Send + Sync {
    fn spawn(&self, channel_id: &str) -> Result<SpawnedProcess>;
}

/// Shell and PTY settings used when spawning.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub shell: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub cols: u16,
    pub rows: u16,
    pub ring_capacity: usize,
    pub env: Vec<(String, String)>,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            shell: None,
            working_dir: None,
            cols: 400,
            rows: 50,
            ring_capacity: 1000,
            env: Vec::new(),
        }
    }
}

/// Spawns an interactive shell on a native PTY.
pub struct PtySpawner {
    opts: SpawnOptions,
}

impl PtySpawner {
    pub fn new(opts: SpawnOptions) -> Self {
        Self { opts }
    }

    fn command_builder(&self) -> CommandBuilder {
        let shell = self
            .opts
            .shell
            .clone()
            .filter(|value| !value.trim().is_empty())
            .or_else(|| {
                std::env::var("SHELL")
                    .ok()
                    .filter(|value| !value.trim().is_empty())
            })
            .unwrap_or_else(|| "/bin/bash".to_string());
        let mut cmd = CommandBuilder::new(shell);
        // Keep escape sequences to a minimum; the output is parsed, not displayed.
        cmd.env("TERM", "dumb");
        cmd.env("NO_COLOR", "1");
        for (key, value) in &self.opts.env {
            cmd.env(key, value);
        }
        if let Some(dir) = self
            .opts
            .working_dir
            .clone()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
        {
            cmd.cwd(dir);
        }
        cmd
    }
}

impl ProcessSpawner for PtySpawner {
    fn spawn(&self, channel_id: &str) -> Result<SpawnedProcess> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.opts.rows.max(1),
                cols: self.opts.cols.max(2),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|err| Error::spawn(format!("failed to allocate PTY: {err}")))?;

        let portable_pty::PtyPair { master, slave } = pair;
        let child = slave
            .spawn_command(self.command_builder())
            .map_err(|err| Error::spawn(format!("failed to spawn shell: {err}")))?;
        drop(slave);

        let writer = master
            .take_writer()
            .map_err(|err| Error::spawn(format!("failed to open PTY writer: {err}")))?;
        let reader = master
            .try_clone_reader()
            .map_err(|err| Error::spawn(format!("failed to open PTY reader: {err}")))?;

        let id = format!("term-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let pid = child.process_id();
        let ring = Arc::new(Mutex::new(OutputRing::new(self.opts.ring_capacity)));
        let last_activity = Arc::new(AtomicU64::new(now_ms()));
        let output = spawn_reader(
            &id,
            reader,
            Arc::clone(&ring),
            Arc::clone(&last_activity),
        )?;

        info!(channel_id, terminal_id = %id, ?pid, "process session spawned");

        let session = PtySession {
            id,
            pid,
            _master: Mutex::new(master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            ring,
            last_activity,
        };
        Ok(SpawnedProcess {
            handle: Arc::new(session),
            output,
        })
    }
}

struct PtySession {
    id: String,
    pid: Option<u32>,
    // Dropping the master closes the PTY.
    _master: Mutex<Box<dyn portable_pty::MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn portable_pty::Child + Send + Sync>>,
    ring: Arc<Mutex<OutputRing>>,
    last_activity: Arc<AtomicU64>,
}

impl ProcessHandle for PtySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|err| Error::poisoned(err.to_string()))?;
        writer
            .write_all(bytes)
            .and_then(|()| writer.flush())
            .map_err(|source| Error::Write { source })?;
        self.last_activity.store(now_ms(), Ordering::Relaxed);
        Ok(())
    }

    fn kill(&self) {
        match self.child.lock() {
            Ok(mut child) => {
                if let Err(err) = child.kill() {
                    debug!(terminal_id = %self.id, error = %err, "kill failed, process likely gone");
                }
            },
            Err(err) => warn!(terminal_id = %self.id, error = %err, "child handle poisoned"),
        }
    }

    fn recent_output(&self, n: usize) -> Vec<String> {
        self.ring
            .lock()
            .map(|ring| ring.recent(n))
            .unwrap_or_default()
    }

    fn last_activity_ms(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_reader(
    terminal_id: &str,
    mut reader: Box<dyn Read + Send>,
    ring: Arc<Mutex<OutputRing>>,
    last_activity: Arc<AtomicU64>,
) -> Result<mpsc::UnboundedReceiver<OutputEvent>> {
    let (tx, rx) = mpsc::unbounded_channel::<OutputEvent>();
    let thread_id = terminal_id.to_string();
    std::thread::Builder::new()
        .name(format!("switchboard-{terminal_id}-reader"))
        .spawn(move || {
            let mut buf = vec![0_u8; READ_BUFFER_BYTES];
            let mut pending = Vec::new();
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let text = decode_utf8(&mut pending, &buf[..n]);
                        if text.is_empty() {
                            continue;
                        }
                        last_activity.store(now_ms(), Ordering::Relaxed);
                        if let Ok(mut ring) = ring.lock() {
                            ring.push(text.clone());
                        }
                        if tx.send(OutputEvent::Output(text)).is_err() {
                            return;
                        }
                    },
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) if err.raw_os_error() == Some(EIO) => break,
                    Err(err) => {
                        let _ = tx.send(OutputEvent::Error(format!(
                            "process output stream error: {err}"
                        )));
                        break;
                    },
                }
            }
            debug!(terminal_id = %thread_id, "process output closed");
            let _ = tx.send(OutputEvent::Closed);
        })
        .map_err(|err| Error::spawn(format!("failed to launch reader thread: {err}")))?;
    Ok(rx)
}

/// Decode `incoming` appended to any bytes held back from the previous read.
///
/// A multi-byte character split across reads is held in `pending` until the
/// rest arrives; invalid sequences are replaced.
fn decode_utf8(pending: &mut Vec<u8>, incoming: &[u8]) -> String {
    pending.extend_from_slice(incoming);
    let mut out = String::with_capacity(pending.len());
    let mut rest: &[u8] = pending.as_slice();
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                rest = &[];
                break;
            },
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                out.push_str(&String::from_utf8_lossy(valid));
                match err.error_len() {
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    },
                    None => {
                        rest = after;
                        break;
                    },
                }
            },
        }
    }
    let carry = rest.to_vec();
    *pending = carry;
    out
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
