//! Host command execution.

use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::debug;

/// A program invocation: an executable path and its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    program: PathBuf,
    args: Vec<String>,
}

/// The result of running a [`Command`] to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Output {
    pub success: bool,

    /// The exit code, if the process exited normally.
    pub code: Option<i32>,

    /// Standard output followed by standard error.
    pub output: String,
}

/// Runs commands on the host.
#[async_trait::async_trait]
pub trait Exec: fmt::Debug + Send + Sync + 'static {
    async fn exec(&self, cmd: &Command) -> std::io::Result<Output>;
}

/// Runs commands as child processes, waiting for each to exit.
///
/// No timeout is applied: a hung process blocks the caller until it exits.
#[derive(Clone, Debug, Default)]
pub struct HostExec(());

// === impl Command ===

impl Command {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

// === impl Output ===

impl Output {
    pub fn contains(&self, marker: &str) -> bool {
        self.output.contains(marker)
    }
}

// === impl HostExec ===

#[async_trait::async_trait]
impl Exec for HostExec {
    async fn exec(&self, cmd: &Command) -> std::io::Result<Output> {
        let out = tokio::process::Command::new(cmd.program())
            .args(cmd.get_args())
            .kill_on_drop(true)
            .output()
            .await?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(Output {
            success: out.status.success(),
            code: out.status.code(),
            output,
        })
    }
}

/// Runs `cmd`, folding a failure to launch the process into an unsuccessful [`Output`].
pub(crate) async fn run(exec: &dyn Exec, cmd: &Command) -> Output {
    debug!(command = %cmd, "Executing");
    match exec.exec(cmd).await {
        Ok(output) => output,
        Err(error) => Output {
            success: false,
            code: None,
            output: error.to_string(),
        },
    }
}
