//! Child-process harness: run a command in a given directory and feed its
//! output, line by line, to pattern watchers.
//!
//! Two pump threads only move bytes. Every watcher callback runs on the
//! calling thread, in the order lines arrive, so watchers may freely borrow
//! local state mutably.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;

use regex::Regex;

use crate::VcsError;

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// A command line plus the environment and directory it runs in.
#[derive(Debug, Clone, Default)]
pub struct CmdSpec {
    program: OsString,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    cwd: Option<PathBuf>,
}

impl CmdSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Run the child in `dir`. The parent's working directory is never touched.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Shell-like rendering for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (k, v) in &self.envs {
            cmd.env(k, v);
        }
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// What a watcher wants after seeing a matching line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchFlow {
    Continue,
    /// Kill the child; later output is drained and ignored.
    Stop,
}

/// Calls `on_match` for every line of `stream` that matches `pattern`.
pub struct LineWatcher<'a> {
    name: &'static str,
    stream: StreamKind,
    pattern: Regex,
    on_match: Box<dyn FnMut(&str) -> WatchFlow + 'a>,
}

impl<'a> LineWatcher<'a> {
    pub fn new(
        name: &'static str,
        stream: StreamKind,
        pattern: Regex,
        on_match: impl FnMut(&str) -> WatchFlow + 'a,
    ) -> Self {
        Self {
            name,
            stream,
            pattern,
            on_match: Box::new(on_match),
        }
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub status: ExitStatus,
    /// Name of the watcher that stopped the child, if any.
    pub stopped_by: Option<&'static str>,
    /// Last lines of stderr, newline-joined.
    pub stderr_tail: String,
}

/// Run `spec` to completion, dispatching output lines to `watchers`.
pub fn run_watched(
    spec: &CmdSpec,
    watchers: &mut [LineWatcher<'_>],
) -> Result<RunOutcome, VcsError> {
    tracing::debug!(cmd = %spec.display(), "running watched command");

    let mut child = spec
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| VcsError::Spawn {
            program: spec.program_name(),
            source,
        })?;

    let (tx, rx) = mpsc::channel();
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(pump(StreamKind::Stdout, stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(pump(StreamKind::Stderr, stderr, tx.clone()));
    }
    drop(tx);

    let mut stopped_by = None;
    let mut read_error = None;
    let mut stderr_tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    for (stream, line) in rx {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                if read_error.is_none() {
                    let _ = child.kill();
                    read_error = Some(e);
                }
                continue;
            }
        };
        if stream == StreamKind::Stderr {
            if stderr_tail.len() == STDERR_TAIL_LINES {
                stderr_tail.pop_front();
            }
            stderr_tail.push_back(line.clone());
        }
        if stopped_by.is_some() || read_error.is_some() {
            continue;
        }
        for watcher in watchers.iter_mut().filter(|w| w.stream == stream) {
            if watcher.pattern.is_match(&line) && (watcher.on_match)(&line) == WatchFlow::Stop {
                tracing::debug!(watcher = watcher.name, "watcher stopped the command");
                stopped_by = Some(watcher.name);
                let _ = child.kill();
                break;
            }
        }
    }

    let status = child.wait()?;
    for handle in pumps {
        let _ = handle.join();
    }
    if let Some(e) = read_error {
        return Err(VcsError::Io(e));
    }

    Ok(RunOutcome {
        status,
        stopped_by,
        stderr_tail: Vec::from(stderr_tail).join("\n"),
    })
}

/// Run `spec` and return its trimmed stdout. Non-zero exit is an error.
pub fn run_capture(spec: &CmdSpec) -> Result<String, VcsError> {
    tracing::debug!(cmd = %spec.display(), "running");
    let output = spec
        .command()
        .stdin(Stdio::null())
        .output()
        .map_err(|source| VcsError::Spawn {
            program: spec.program_name(),
            source,
        })?;
    if !output.status.success() {
        return Err(VcsError::CommandFailed {
            command: spec.display(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

type Line = (StreamKind, io::Result<String>);

fn pump<R: Read + Send + 'static>(
    stream: StreamKind,
    source: R,
    tx: mpsc::Sender<Line>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_string();
                    if tx.send((stream, Ok(line))).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send((stream, Err(e)));
                    break;
                }
            }
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CmdSpec {
        CmdSpec::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn watchers_see_their_stream_only() {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let outcome = {
            let mut watchers = [
                LineWatcher::new("out", StreamKind::Stdout, Regex::new("KEY").unwrap(), |l| {
                    out.push(l.to_string());
                    WatchFlow::Continue
                }),
                LineWatcher::new("err", StreamKind::Stderr, Regex::new("KEY").unwrap(), |l| {
                    err.push(l.to_string());
                    WatchFlow::Continue
                }),
            ];
            run_watched(
                &sh("echo 'KEY-1 out'; echo plain; echo 'KEY-2 err' >&2"),
                &mut watchers,
            )
            .unwrap()
        };
        assert!(outcome.status.success());
        assert!(outcome.stopped_by.is_none());
        assert_eq!(out, vec!["KEY-1 out"]);
        assert_eq!(err, vec!["KEY-2 err"]);
        assert_eq!(outcome.stderr_tail, "KEY-2 err");
    }

    #[test]
    fn stop_kills_child() {
        let mut seen = 0;
        let outcome = {
            let mut watchers = [LineWatcher::new(
                "stopper",
                StreamKind::Stderr,
                Regex::new("^fatal").unwrap(),
                |_| {
                    seen += 1;
                    WatchFlow::Stop
                },
            )];
            run_watched(&sh("echo 'fatal: boom' >&2; exec sleep 30"), &mut watchers).unwrap()
        };
        assert_eq!(outcome.stopped_by, Some("stopper"));
        assert_eq!(seen, 1);
        assert!(!outcome.status.success());
    }

    #[test]
    fn runs_in_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let before = std::env::current_dir().unwrap();
        let listing = run_capture(&CmdSpec::new("ls").current_dir(dir.path())).unwrap();
        assert!(listing.contains("marker.txt"));
        assert_eq!(std::env::current_dir().unwrap(), before);
    }

    #[test]
    fn env_overrides_applied() {
        let out = run_capture(&sh("echo $EBI_TEST_VAR").env("EBI_TEST_VAR", "hello")).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn capture_reports_failure() {
        let err = run_capture(&sh("echo nope >&2; exit 3")).unwrap_err();
        match err {
            VcsError::CommandFailed { stderr, .. } => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_watched(&CmdSpec::new("ebi-no-such-binary-xyz"), &mut []).unwrap_err();
        assert!(matches!(err, VcsError::Spawn { .. }));
    }

    #[test]
    fn display_joins_args() {
        let spec = CmdSpec::new("git").args(["log", "--max-count=1"]);
        assert_eq!(spec.display(), "git log --max-count=1");
    }
}
