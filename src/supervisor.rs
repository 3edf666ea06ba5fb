//! Supervision of the hook tool.
//!
//! The `Supervisor` owns at most one running tool process. Output and exit are
//! reported by background tasks over the event channel and fed back through
//! [`Supervisor::on_output`] and [`Supervisor::on_termination`] by the single event
//! loop that owns the supervisor, so none of its state needs locking.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ansi::OscFilter;
use crate::classify::{FailureClassifier, ReportClassifier};
use crate::config::read_hook_ids;
use crate::error::SupervisorError;
use crate::events::{Event, RunId};
use crate::host::{Host, Notice};
use crate::output::OutputBuffer;
use crate::state::RunState;

const COLOR_FLAGS: [&str; 2] = ["--color", "always"];
const ALL_FILES_FLAG: &str = "--all-files";
const READ_CHUNK: usize = 4096;

/// What a run does. Only hook runs are classified and mirrored into [`RunState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Hooks,
    Install,
    Autoupdate,
}

impl RunKind {
    fn subcommand(self) -> &'static str {
        match self {
            RunKind::Hooks => "run",
            RunKind::Install => "install",
            RunKind::Autoupdate => "autoupdate",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunKind::Hooks => f.write_str("hook run"),
            other => f.write_str(other.subcommand()),
        }
    }
}

/// A request to launch the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub kind: RunKind,
    /// Restrict a hook run to one hook id.
    pub hook: Option<String>,
    /// Caller-supplied arguments, appended last.
    pub args: Vec<String>,
}

impl RunRequest {
    pub fn hooks(args: Vec<String>, hook: Option<String>) -> Self {
        Self {
            kind: RunKind::Hooks,
            hook,
            args,
        }
    }

    /// Every hook over every file.
    pub fn all_files() -> Self {
        Self::hooks(vec![ALL_FILES_FLAG.to_string()], None)
    }

    /// One hook over every file.
    pub fn single_hook(id: impl Into<String>) -> Self {
        Self::hooks(vec![ALL_FILES_FLAG.to_string()], Some(id.into()))
    }

    pub fn install() -> Self {
        Self {
            kind: RunKind::Install,
            hook: None,
            args: Vec::new(),
        }
    }

    pub fn autoupdate() -> Self {
        Self {
            kind: RunKind::Autoupdate,
            hook: None,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Tool executable name or path.
    pub executable: String,
    /// Arguments appended to every hook run, before the caller's.
    pub extra_args: Vec<String>,
    /// Ask the host to raise the output on failure.
    pub raise_on_failure: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            executable: "pre-commit".to_string(),
            extra_args: Vec::new(),
            raise_on_failure: true,
        }
    }
}

struct ActiveProcess {
    run: RunId,
    kind: RunKind,
    command: Vec<String>,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
}

pub struct Supervisor<H: Host> {
    settings: SupervisorSettings,
    host: H,
    classifier: Box<dyn FailureClassifier>,
    event_tx: mpsc::Sender<Event>,
    state: RunState,
    active: Option<ActiveProcess>,
    output: OutputBuffer,
    filter: OscFilter,
    output_run: Option<RunId>,
    next_run: u64,
}

impl<H: Host> Supervisor<H> {
    pub fn new(settings: SupervisorSettings, host: H, event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            settings,
            host,
            classifier: Box::new(ReportClassifier::default()),
            event_tx,
            state: RunState::new(),
            active: None,
            output: OutputBuffer::new(),
            filter: OscFilter::new(),
            output_run: None,
            next_run: 0,
        }
    }

    /// Swaps the failed-hook matcher.
    pub fn with_classifier(mut self, classifier: Box<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Snapshot for the status view.
    pub fn current_state(&self) -> RunState {
        self.state.clone()
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn output(&self) -> &OutputBuffer {
        &self.output
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Command line of the active run, executable first.
    pub fn active_command(&self) -> Option<&[String]> {
        self.active.as_ref().map(|active| active.command.as_slice())
    }

    pub fn active_kind(&self) -> Option<RunKind> {
        self.active.as_ref().map(|active| active.kind)
    }

    fn work_dir(&self) -> PathBuf {
        self.host
            .project_root()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Why commands cannot be offered right now, if they cannot.
    pub fn unavailable_reason(&self) -> Option<String> {
        if !self.host.executable_resolvable(&self.settings.executable) {
            return Some(format!("`{}` not found", self.settings.executable));
        }
        let root = self.work_dir();
        if self.host.config_file(&root).is_none() {
            return Some(format!("no hook configuration in {}", root.display()));
        }
        None
    }

    pub fn is_available(&self) -> bool {
        self.unavailable_reason().is_none()
    }

    /// Hook ids from the configuration file, read fresh on every call.
    pub fn hook_ids(&self) -> Vec<String> {
        let root = self.work_dir();
        match self.host.config_file(&root) {
            Some(path) => read_hook_ids(&path),
            None => {
                debug!(root = %root.display(), "no hook configuration to list");
                Vec::new()
            }
        }
    }

    fn command_args(&self, request: &RunRequest) -> Vec<String> {
        let mut args = vec![request.kind.subcommand().to_string()];
        args.extend(COLOR_FLAGS.iter().map(|flag| flag.to_string()));
        if request.kind == RunKind::Hooks {
            args.extend(request.hook.iter().cloned());
            args.extend(self.settings.extra_args.iter().cloned());
        }
        args.extend(request.args.iter().cloned());
        args
    }

    pub fn start_all(&mut self) -> Result<RunId, SupervisorError> {
        self.start(RunRequest::all_files())
    }

    pub fn start_single_hook(&mut self, id: &str) -> Result<RunId, SupervisorError> {
        self.start(RunRequest::single_hook(id))
    }

    pub fn install(&mut self) -> Result<RunId, SupervisorError> {
        self.start(RunRequest::install())
    }

    pub fn autoupdate(&mut self) -> Result<RunId, SupervisorError> {
        self.start(RunRequest::autoupdate())
    }

    /// Launches the tool. Returns as soon as the process is spawned.
    ///
    /// With a run already active the host is asked whether to kill it; a refusal
    /// leaves everything untouched and yields [`SupervisorError::Conflict`].
    pub fn start(&mut self, request: RunRequest) -> Result<RunId, SupervisorError> {
        if let Some(reason) = self.unavailable_reason() {
            warn!(%reason, "refusing to start");
            return Err(SupervisorError::Unavailable { reason });
        }

        let mut replaced = false;
        if let Some(active) = &self.active {
            let message = format!("{} {} is still running, kill it?", active.kind, active.run);
            if !self.host.confirm(&message) {
                info!(run = %active.run, "kept active run, new request dropped");
                return Err(SupervisorError::Conflict);
            }
            self.terminate_active();
            self.state.reset();
            replaced = true;
        }

        let args = self.command_args(&request);
        let dir = self.work_dir();
        let mut command = Command::new(&self.settings.executable);
        command
            .args(&args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        unsafe {
            command.pre_exec(|| {
                let _ = libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut full_command = vec![self.settings.executable.clone()];
        full_command.extend(args);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                if replaced {
                    // The replaced run is already killed.
                    self.output_run = None;
                    self.filter.reset();
                    self.host.notify(Notice::Killed);
                    self.host.status_changed();
                }
                return Err(SupervisorError::Spawn {
                    command: shell_words::join(&full_command),
                    source,
                });
            }
        };

        self.next_run += 1;
        let run = RunId(self.next_run);
        let pid = child.id();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_stream(run, stdout, self.event_tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_stream(run, stderr, self.event_tx.clone())));
        }
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(watch_child(run, child, readers, kill_rx, self.event_tx.clone()));

        self.output.clear();
        self.filter.reset();
        self.output_run = Some(run);
        if request.kind == RunKind::Hooks {
            self.state.begin_run();
        }
        info!(
            %run,
            command = %shell_words::join(&full_command),
            dir = %dir.display(),
            "started {}",
            request.kind
        );
        self.active = Some(ActiveProcess {
            run,
            kind: request.kind,
            command: full_command,
            pid,
            kill_tx: Some(kill_tx),
        });
        self.host.status_changed();
        Ok(run)
    }

    /// Feeds a chunk of output from `run` into the buffer and returns the display text
    /// it produced. Chunks from a run whose buffer has been replaced are dropped.
    pub fn on_output(&mut self, run: RunId, chunk: &[u8]) -> Option<String> {
        if self.output_run != Some(run) {
            debug!(%run, bytes = chunk.len(), "dropping output from a replaced run");
            return None;
        }
        let text = self.filter.push(chunk);
        self.output.append(&text);
        Some(text)
    }

    /// Classifies the outcome of `run`. Exits of runs that were killed or replaced are ignored.
    pub fn on_termination(&mut self, run: RunId, code: Option<i32>) {
        if self.active.as_ref().map(|active| active.run) != Some(run) {
            debug!(%run, ?code, "ignoring exit of an inactive run");
            return;
        }
        let Some(active) = self.active.take() else {
            return;
        };
        if self.output_run == Some(run) {
            let tail = self.filter.finish();
            self.output.append(&tail);
        }

        let success = code == Some(0);
        match active.kind {
            RunKind::Hooks if success => {
                info!(%run, "hooks passed");
                self.state.succeed();
                self.host.notify(Notice::Succeeded);
            }
            RunKind::Hooks => {
                let failed = self.classifier.failed_hooks(&self.output.plain_text());
                info!(%run, ?code, failed = ?failed, "hooks failed");
                let failed_hooks = failed.len();
                self.state.fail(failed);
                self.host.notify(Notice::Failed {
                    failed_hooks,
                    raise: self.settings.raise_on_failure,
                });
            }
            kind => {
                info!(%run, ?code, "{} exited", kind);
                self.host.notify(Notice::Maintenance { kind, success });
            }
        }
        self.host.status_changed();
    }

    /// Forcibly stops the active run and resets the state to idle without waiting
    /// for its exit to be reported.
    pub fn kill(&mut self) -> Result<(), SupervisorError> {
        if !self.terminate_active() {
            return Err(SupervisorError::NoActiveProcess);
        }
        self.state.reset();
        self.host.notify(Notice::Killed);
        self.host.status_changed();
        Ok(())
    }

    fn terminate_active(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };
        info!(run = %active.run, "killing {}", active.kind);
        if let Some(pid) = active.pid {
            kill_process_group(pid);
        }
        if let Some(kill_tx) = active.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        true
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let pid = pid as i32;
    unsafe {
        let _ = libc::kill(-pid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

async fn read_stream<R>(run: RunId, mut reader: R, tx: mpsc::Sender<Event>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let event = Event::RunOutput {
                    run,
                    chunk: buf[..n].to_vec(),
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(%run, error = %err, "output stream closed");
                break;
            }
        }
    }
}

// Owns the child until it exits. The exit event is only sent once both readers are
// done, so it always follows the last output chunk of the run.
async fn watch_child(
    run: RunId,
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    kill_rx: oneshot::Receiver<()>,
    tx: mpsc::Sender<Event>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };
    let status = match exited {
        Some(status) => status,
        None => {
            let _ = child.start_kill();
            child.wait().await
        }
    };
    for reader in readers {
        let _ = reader.await;
    }
    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            warn!(%run, error = %err, "failed to wait for hook tool");
            None
        }
    };
    let _ = tx.send(Event::RunExited { run, code }).await;
}
