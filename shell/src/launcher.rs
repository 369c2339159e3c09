//! Starting one external program: resolution, descriptor plumbing, `fork` and `execve`.
//!
//! Everything that allocates happens in the parent before `fork`. The child only runs
//! async-signal-safe calls until the new image replaces it.

use crate::command::{Command, ExitCode, STATUS_CANNOT_EXECUTE};
use crate::env::Environment;
use crate::error::LaunchError;
use crate::external::{exit_code, find_command_path};
use crate::job::{ChildRole, ChildSignalBlock, prepare_child_signals};
use crate::session::Session;
use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::unistd::{ForkResult, Pid, fork, setpgid};
use std::borrow::Cow;
use std::ffi::{CString, OsStr};
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::ptr;
use tracing::debug;

/// Permissions of files created by `>` and `2>`.
const REDIRECT_MODE: u32 = 0o600;

/// Descriptors a child installs on its standard streams before `exec`.
///
/// The parent keeps these only until the fork; dropping the plan closes its copies.
#[derive(Debug, Default)]
pub struct StdioPlan {
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
    pub stderr: Option<OwnedFd>,
}

impl StdioPlan {
    /// Opens the files named by the command's redirections.
    ///
    /// Outputs are created or truncated write-only, the input is opened read-only. All
    /// descriptors are close-on-exec, so a sibling child never inherits them past `exec`.
    pub fn open(command: &Command) -> Result<Self, LaunchError> {
        let mut plan = Self::default();
        if let Some(path) = &command.stdin {
            plan.stdin = Some(open_input(path)?.into());
        }
        if let Some(path) = &command.stdout {
            plan.stdout = Some(open_output(path)?.into());
        }
        if let Some(path) = &command.stderr {
            plan.stderr = Some(open_output(path)?.into());
        }
        Ok(plan)
    }

    /// Duplicates every planned descriptor onto its standard slot and closes the original.
    ///
    /// Runs in the child between `fork` and `exec`. Standard error goes first so a later
    /// failure is reported where the user asked errors to go.
    fn install(&self) -> nix::Result<()> {
        let slots = [
            (&self.stderr, libc::STDERR_FILENO),
            (&self.stdin, libc::STDIN_FILENO),
            (&self.stdout, libc::STDOUT_FILENO),
        ];
        for (fd, target) in slots {
            let Some(fd) = fd else { continue };
            let raw = fd.as_raw_fd();
            if raw == target {
                continue;
            }
            Errno::result(unsafe { libc::dup2(raw, target) })?;
            unsafe { libc::close(raw) };
        }
        Ok(())
    }
}

fn open_input(path: &Path) -> Result<File, LaunchError> {
    File::open(path).map_err(|source| LaunchError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

fn open_output(path: &Path) -> Result<File, LaunchError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(REDIRECT_MODE)
        .open(path)
        .map_err(|source| LaunchError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

/// A resolved program with its argument and environment blocks, ready for `execve`.
#[derive(Debug)]
pub struct ExecImage {
    name: String,
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
    exec_failure: Vec<u8>,
    redirect_failure: Vec<u8>,
}

impl ExecImage {
    /// Looks `argv[0]` up in `PATH` and converts everything to C strings.
    pub fn resolve(argv: &[String], env: &Environment) -> Result<Self, LaunchError> {
        let name = argv.first().cloned().unwrap_or_default();
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let path = find_command_path(OsStr::new(&search_paths), Path::new(&name))
            .map(Cow::into_owned)
            .ok_or_else(|| LaunchError::NotFound(name.clone()))?;

        let invalid = || LaunchError::InvalidArgument { name: name.clone() };
        let path = CString::new(path.as_os_str().as_encoded_bytes()).map_err(|_| invalid())?;
        let argv = argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        Ok(Self {
            exec_failure: format!("lsh: cannot execute {name}\n").into_bytes(),
            redirect_failure: format!("lsh: cannot redirect standard streams of {name}\n")
                .into_bytes(),
            name,
            path,
            argv,
            envp: env.exec_block(),
        })
    }
}

fn nul_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

/// Forks a child that runs `image` with `io` on its standard streams.
///
/// The parent's copies of the descriptors in `io` are closed before this returns. A
/// background child is moved into its own process group so terminal interrupts never
/// reach it.
pub fn spawn(image: &ExecImage, io: StdioPlan, role: ChildRole) -> Result<Pid, LaunchError> {
    let argv = nul_terminated(&image.argv);
    let envp = nul_terminated(&image.envp);

    match unsafe { fork() } {
        Err(err) => Err(LaunchError::Fork(err)),
        Ok(ForkResult::Child) => exec_child(image, &argv, &envp, &io, role),
        Ok(ForkResult::Parent { child }) => {
            drop(io);
            if role == ChildRole::Background {
                // Also done by the child; whichever runs first wins the race.
                let _ = setpgid(child, child);
            }
            debug!(pid = %child, program = %image.name, ?role, "launched");
            Ok(child)
        }
    }
}

fn exec_child(
    image: &ExecImage,
    argv: &[*const libc::c_char],
    envp: &[*const libc::c_char],
    io: &StdioPlan,
    role: ChildRole,
) -> ! {
    prepare_child_signals(role);
    if io.install().is_err() {
        child_fail(&image.redirect_failure, 1);
    }
    unsafe { libc::execve(image.path.as_ptr(), argv.as_ptr(), envp.as_ptr()) };
    child_fail(&image.exec_failure, STATUS_CANNOT_EXECUTE)
}

/// Writes a preformatted message to standard error and leaves the forked child.
fn child_fail(message: &[u8], status: ExitCode) -> ! {
    unsafe {
        libc::write(libc::STDERR_FILENO, message.as_ptr().cast(), message.len());
        libc::_exit(status)
    }
}

/// Blocks until `pid` terminates and returns its exit code.
pub fn wait_for(pid: Pid) -> Result<ExitCode, LaunchError> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => return Ok(exit_code(status)),
            Err(Errno::EINTR) => continue,
            Err(source) => {
                return Err(LaunchError::Wait {
                    pid: pid.as_raw(),
                    source,
                });
            }
        }
    }
}

/// Runs one command in the foreground and waits for it.
pub fn run_foreground(command: &Command, session: &Session) -> Result<ExitCode, LaunchError> {
    let image = ExecImage::resolve(&command.argv, &session.env)?;
    let io = StdioPlan::open(command)?;

    let _blocked = ChildSignalBlock::new().map_err(LaunchError::SignalMask)?;
    let pid = spawn(&image, io, ChildRole::Foreground)?;
    let signals = session.signals();
    signals.track_foreground(pid);
    let status = wait_for(pid);
    signals.forget_foreground(pid);
    session.reclaim_terminal();
    status
}

/// Starts one command in the background and returns without waiting.
///
/// The child is reaped asynchronously by the child-exit handler.
pub fn run_background(command: &Command, session: &Session) -> Result<Pid, LaunchError> {
    let image = ExecImage::resolve(&command.argv, &session.env)?;
    let io = StdioPlan::open(command)?;
    spawn(&image, io, ChildRole::Background)
}
