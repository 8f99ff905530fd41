use crate::error::{Error, Result};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, trace};

const READ_CHUNK: usize = 8192;

/// What to do with a child's standard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    /// Pass through to our stderr
    #[default]
    Inherit,
    /// Send to the null device
    Discard,
}

/// A program and its argument vector, run without a shell.
///
/// Arguments are OS strings so that bytes which are not UTF-8 reach the
/// child unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
    stderr: StderrMode,
}

impl Invocation {
    /// Starts an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stderr: StderrMode::Inherit,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends one argument given as raw bytes.
    #[must_use]
    pub fn arg_bytes(self, arg: Vec<u8>) -> Self {
        self.arg(os_string_from_bytes(arg))
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Discards the child's stderr.
    #[must_use]
    pub const fn discard_stderr(mut self) -> Self {
        self.stderr = StderrMode::Discard;
        self
    }

    /// Program name or path.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Argument vector, without the program.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Stderr handling.
    #[must_use]
    pub const fn stderr(&self) -> StderrMode {
        self.stderr
    }

    /// Renders the invocation as one POSIX shell command line.
    ///
    /// Words are quoted with [`shlex`], so splitting the line the way a shell
    /// does gives back the program and its arguments byte for byte.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a word contains a NUL byte, which no
    /// shell word can carry.
    pub fn shell_line(&self) -> Result<Vec<u8>> {
        let words: Vec<Cow<'_, [u8]>> = std::iter::once(Cow::Borrowed(self.program.as_bytes()))
            .chain(self.args.iter().map(|arg| os_bytes(arg)))
            .collect();

        let mut line = shlex::bytes::try_join(words.iter().map(|word| &**word))
            .map_err(|e| Error::config(format!("cannot render '{}' as a shell line: {e}", self.program)))?;
        if self.stderr == StderrMode::Discard {
            line.extend_from_slice(b" 2>/dev/null");
        }
        Ok(line)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.shell_line() {
            Ok(line) => f.write_str(&String::from_utf8_lossy(&line)),
            Err(_) => write!(f, "{} ({} arguments)", self.program, self.args.len()),
        }
    }
}

#[cfg(unix)]
fn os_string_from_bytes(bytes: Vec<u8>) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes)
}

#[cfg(not(unix))]
fn os_string_from_bytes(bytes: Vec<u8>) -> OsString {
    OsString::from(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(unix)]
fn os_bytes(arg: &OsStr) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(arg.as_bytes())
}

#[cfg(not(unix))]
fn os_bytes(arg: &OsStr) -> Cow<'_, [u8]> {
    match arg.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Everything the process wrote to stdout
    pub stdout: Vec<u8>,
    /// Exit code, `None` if the process was terminated by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Returns true if the process exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Capability for running external programs.
///
/// Implementations must capture stdout completely before reporting the
/// exit status.
pub trait CommandRunner: Send + Sync {
    /// Runs `invocation` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the process cannot be started or its
    /// output cannot be read.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Runs programs with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Returns the runner behind a shared handle.
    #[must_use]
    pub fn shared() -> Arc<dyn CommandRunner> {
        Arc::new(Self)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let program = invocation.program();
        debug!("Running {}", program);
        trace!("Command line: {}", invocation);

        let stderr = match invocation.stderr() {
            StderrMode::Inherit => Stdio::inherit(),
            StderrMode::Discard => Stdio::null(),
        };

        let mut child = Command::new(program)
            .args(invocation.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .spawn()
            .map_err(|e| Error::spawn(program, &e))?;

        let mut stdout = Vec::new();
        if let Some(mut pipe) = child.stdout.take() {
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                let n = match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(Error::spawn(program, &e));
                    }
                };
                if let Err(e) = stdout.try_reserve(n) {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(e.into());
                }
                stdout.extend_from_slice(&chunk[..n]);
            }
        }

        let status = child.wait().map_err(|e| Error::spawn(program, &e))?;
        debug!("{} exited with {} ({} bytes)", program, status, stdout.len());

        Ok(CommandOutput {
            stdout,
            code: status.code(),
        })
    }
}
