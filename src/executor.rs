use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// How a single shell run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited on its own. `output` holds stdout and stderr
    /// interleaved line by line; `exit_code` is None when killed by a signal.
    Completed { output: String, exit_code: Option<i32> },
    /// The deadline passed and the process was killed.
    TimedOut,
    /// Spawning, reading or waiting failed.
    Failed(String),
}

impl RunOutcome {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            RunOutcome::Completed { exit_code, .. } => *exit_code,
            _ => None,
        }
    }

    /// Text stored in the execution record for this outcome.
    pub fn into_output(self, deadline: Duration) -> String {
        match self {
            RunOutcome::Completed { output, .. } => output,
            RunOutcome::TimedOut => timeout_message(deadline),
            RunOutcome::Failed(error) => format!("Execution failed: {}", error),
        }
    }
}

pub fn timeout_message(deadline: Duration) -> String {
    format!("Execution timed out after {}.", describe_duration(deadline))
}

fn describe_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 && secs % 60 == 0 && duration.subsec_nanos() == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{} minutes", minutes)
        }
    } else if secs == 0 {
        format!("{} milliseconds", duration.as_millis())
    } else if secs == 1 {
        "1 second".to_string()
    } else {
        format!("{} seconds", secs)
    }
}

/// Shell program and the flag that makes it run a command string.
fn host_shell() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd.exe", "/c")
    } else {
        ("sh", "-c")
    }
}

fn shell_command(shell: &str, flag: &str, command: &str) -> Command {
    let mut cmd = Command::new(shell);
    cmd.arg(flag);
    // cmd.exe does its own parsing; MSVC-style quoting would mangle quotes.
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.raw_arg(command);
    }
    #[cfg(not(windows))]
    cmd.arg(command);
    cmd
}

/// Upper bound on captured output kept in a record.
pub const MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

// A line longer than this is forwarded in pieces.
const MAX_CHUNK_BYTES: usize = 64 * 1024;

// Chunks in flight between the pipe readers and the collector.
const CHANNEL_CAPACITY: usize = 256;

/// Runs a command through the host shell under a wall-clock deadline.
///
/// Captured output is capped at `MAX_OUTPUT_BYTES`; past that the pipes are
/// still drained but the text is dropped and a truncation note is appended.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    deadline: Duration,
    shell: String,
    shell_flag: String,
    output_limit: usize,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(DEFAULT_DEADLINE)
    }
}

impl ShellRunner {
    pub fn new(deadline: Duration) -> Self {
        let (shell, flag) = host_shell();
        Self {
            deadline,
            shell: shell.to_string(),
            shell_flag: flag.to_string(),
            output_limit: MAX_OUTPUT_BYTES,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_shell(mut self, shell: &str, flag: &str) -> Self {
        self.shell = shell.to_string();
        self.shell_flag = flag.to_string();
        self
    }

    #[cfg(test)]
    pub(crate) fn with_output_limit(mut self, limit: usize) -> Self {
        self.output_limit = limit;
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Never returns an error: every failure is folded into the outcome.
    pub fn run(&self, command: &str) -> RunOutcome {
        match self.try_run(command) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(command, error = %e, "Command execution failed");
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    fn timed_out(&self, child: &mut Child, command: &str) -> io::Result<RunOutcome> {
        terminate(child);
        tracing::warn!(command, deadline = ?self.deadline, "Command timed out");
        Ok(RunOutcome::TimedOut)
    }

    fn try_run(&self, command: &str) -> io::Result<RunOutcome> {
        let mut cmd = shell_command(&self.shell, &self.shell_flag, command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group so a timeout takes down everything the shell started.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let deadline = Instant::now() + self.deadline;
        let mut child = cmd.spawn()?;
        tracing::debug!(command, pid = child.id(), "Spawned shell");

        // Bounded so a flooding command blocks on its pipe instead of on our memory.
        let (tx, rx) = mpsc::sync_channel(CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, tx.clone());
        }
        drop(tx);

        let mut collected = String::new();
        let mut truncated = false;
        loop {
            // recv_timeout hands out queued chunks even once the deadline has passed.
            let now = Instant::now();
            if now >= deadline {
                return self.timed_out(&mut child, command);
            }
            match rx.recv_timeout(deadline - now) {
                Ok(Ok(chunk)) => {
                    if collected.len() + chunk.len() <= self.output_limit {
                        collected.push_str(&chunk);
                    } else {
                        truncated = true;
                    }
                }
                Ok(Err(e)) => {
                    terminate(&mut child);
                    return Err(e);
                }
                Err(RecvTimeoutError::Timeout) => return self.timed_out(&mut child, command),
                // Both pipes closed.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        if truncated {
            tracing::warn!(command, limit = self.output_limit, "Output truncated");
            if !collected.is_empty() && !collected.ends_with('\n') {
                collected.push('\n');
            }
            collected.push_str(&format!("[output truncated after {} bytes]\n", self.output_limit));
        }

        // The pipes can close before the process exits.
        let remaining = deadline.saturating_duration_since(Instant::now());
        match child.wait_timeout(remaining) {
            Ok(Some(status)) => Ok(RunOutcome::Completed {
                output: collected,
                exit_code: status.code(),
            }),
            Ok(None) => self.timed_out(&mut child, command),
            Err(e) => {
                terminate(&mut child);
                Err(e)
            }
        }
    }
}

/// Forwards `reader` into `tx` a line at a time. Complete lines end in `\n`;
/// a line longer than `MAX_CHUNK_BYTES` arrives as several unterminated pieces.
/// The reader owns the pipe and closes it when the thread ends.
fn spawn_line_reader<R>(reader: R, tx: SyncSender<io::Result<String>>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            let read = (&mut reader)
                .take(MAX_CHUNK_BYTES as u64)
                .read_until(b'\n', &mut buffer);
            let chunk = match read {
                Ok(0) => break,
                Ok(n) if n == MAX_CHUNK_BYTES && !buffer.ends_with(b"\n") => {
                    String::from_utf8_lossy(&buffer).into_owned()
                }
                Ok(_) => normalize_line(&buffer),
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            };
            if tx.send(Ok(chunk)).is_err() {
                break;
            }
        }
    });
}

fn normalize_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let line = text.strip_suffix('\n').unwrap_or(&text);
    let line = line.strip_suffix('\r').unwrap_or(line);
    format!("{}\n", line)
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    kill_process_group(child.id());
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    // The child leads its own group, so its pid is the group id.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}
