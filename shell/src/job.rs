//! Job control: process groups, terminal ownership and the two asynchronous handlers.
//!
//! The handlers never allocate, lock or print. They only reap children, send signals and
//! update the atomics of [`SignalState`]; the interactive loop consumes what they recorded
//! at the start of each iteration.

use crate::error::StartupError;
use nix::errno::Errno;
use nix::sys::signal::{
    self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, kill, killpg, sigaction,
};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, getpgrp, getpid, setpgid};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::{debug, info};

/// How many processes of one foreground job can be interrupted.
pub const MAX_FOREGROUND: usize = 128;

/// How many finished background processes can wait to be reported.
pub const MAX_NOTICES: usize = 64;

/// The part of the session the signal handlers may touch.
///
/// Every field is an atomic, so a handler interrupting the main flow at any instruction
/// never observes a half-written value.
pub struct SignalState {
    foreground: [AtomicI32; MAX_FOREGROUND],
    suppress_prompt: AtomicBool,
    interrupted: AtomicI32,
    finished: [AtomicI32; MAX_NOTICES],
}

/// The process-wide instance the installed handlers write to.
pub static SIGNALS: SignalState = SignalState::new();

impl SignalState {
    pub const fn new() -> Self {
        Self {
            foreground: [const { AtomicI32::new(0) }; MAX_FOREGROUND],
            suppress_prompt: AtomicBool::new(false),
            interrupted: AtomicI32::new(0),
            finished: [const { AtomicI32::new(0) }; MAX_NOTICES],
        }
    }

    /// Records `pid` as part of the running foreground job.
    ///
    /// Returns false when the job already has [`MAX_FOREGROUND`] members; such a process
    /// still runs but an interrupt will not reach it.
    pub fn track_foreground(&self, pid: Pid) -> bool {
        self.foreground.iter().any(|slot| {
            slot.compare_exchange(0, pid.as_raw(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        })
    }

    /// Drops `pid` from the foreground job once it has been reaped, so an interrupt can
    /// never reach a recycled pid.
    pub fn forget_foreground(&self, pid: Pid) {
        for slot in &self.foreground {
            let _ = slot.compare_exchange(pid.as_raw(), 0, Ordering::SeqCst, Ordering::SeqCst);
        }
    }

    /// Forgets the foreground job once it has been waited for.
    pub fn clear_foreground(&self) {
        for slot in &self.foreground {
            slot.store(0, Ordering::SeqCst);
        }
    }

    pub fn foreground_pids(&self) -> Vec<Pid> {
        self.foreground
            .iter()
            .map(|slot| slot.load(Ordering::SeqCst))
            .filter(|&raw| raw > 0)
            .map(Pid::from_raw)
            .collect()
    }

    /// Interrupt handler body: terminates every process of the foreground job.
    pub fn interrupt_foreground(&self) {
        let mut hit = false;
        for slot in &self.foreground {
            let raw = slot.load(Ordering::SeqCst);
            if raw > 0 && kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok() {
                self.interrupted.store(raw, Ordering::SeqCst);
                hit = true;
            }
        }
        if hit {
            self.suppress_prompt.store(true, Ordering::SeqCst);
        }
    }

    /// Returns the interrupted pid once, clearing the suppress-prompt flag.
    pub fn take_interrupted(&self) -> Option<Pid> {
        if !self.suppress_prompt.swap(false, Ordering::SeqCst) {
            return None;
        }
        match self.interrupted.swap(0, Ordering::SeqCst) {
            0 => None,
            raw => Some(Pid::from_raw(raw)),
        }
    }

    /// Child handler body: reaps every terminated child without blocking.
    ///
    /// Returns how many children were collected.
    pub fn reap_finished(&self) -> usize {
        let mut reaped = 0;
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(status) => {
                    if let Some(pid) = status.pid() {
                        self.push_notice(pid);
                    }
                    reaped += 1;
                }
            }
        }
        reaped
    }

    fn push_notice(&self, pid: Pid) {
        // A full table only loses the notice; the child is reaped either way.
        let _ = self.finished.iter().any(|slot| {
            slot.compare_exchange(0, pid.as_raw(), Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        });
    }

    /// Drains the pids reaped since the last call.
    pub fn take_finished(&self) -> Vec<Pid> {
        self.finished
            .iter()
            .map(|slot| slot.swap(0, Ordering::SeqCst))
            .filter(|&raw| raw != 0)
            .map(Pid::from_raw)
            .collect()
    }
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

extern "C" fn on_child_exit(_: libc::c_int) {
    // The final waitpid leaves ECHILD behind; the interrupted code must not see it.
    let saved = Errno::last_raw();
    SIGNALS.reap_finished();
    Errno::set_raw(saved);
}

extern "C" fn on_interrupt(_: libc::c_int) {
    SIGNALS.interrupt_foreground();
}

/// Blocks `SIGCHLD` for as long as it lives.
///
/// Held around launching and waiting for a foreground job so the asynchronous reaper
/// cannot collect a status the shell is about to wait for. Dropping it restores the
/// previous mask, which delivers any `SIGCHLD` that arrived meanwhile.
pub struct ChildSignalBlock {
    previous: SigSet,
}

impl ChildSignalBlock {
    pub fn new() -> nix::Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))?;
        Ok(Self { previous })
    }
}

impl Drop for ChildSignalBlock {
    fn drop(&mut self) {
        let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None);
    }
}

/// How a launched child relates to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildRole {
    /// A single command the shell waits for. Interrupts reach it through the shell's
    /// handler only.
    Foreground,
    /// One stage of a pipeline. Keeps the default interrupt disposition.
    PipelineStage,
    /// Runs detached in its own process group with the default interrupt disposition.
    Background,
}

/// Puts a freshly forked child into the signal state a launched program expects.
///
/// Only async-signal-safe calls: this runs between `fork` and `exec`.
pub fn prepare_child_signals(role: ChildRole) {
    let mut set = SigSet::empty();
    set.add(Signal::SIGCHLD);
    let _ = signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None);

    for sig in [
        Signal::SIGCHLD,
        Signal::SIGQUIT,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGPIPE,
    ] {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }

    let interrupt = match role {
        ChildRole::Foreground => SigHandler::SigIgn,
        ChildRole::PipelineStage | ChildRole::Background => SigHandler::SigDfl,
    };
    let _ = unsafe { signal::signal(Signal::SIGINT, interrupt) };

    if role == ChildRole::Background {
        let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));
    }
}

/// Ownership of the controlling terminal, acquired once at startup.
pub struct TerminalControl {
    pgid: Pid,
    modes: libc::termios,
}

impl TerminalControl {
    /// Makes the shell an interactive job-control shell.
    ///
    /// Waits until the shell's group is in the foreground, installs the handlers, makes
    /// the shell its own process group leader and takes the terminal. Any failure means
    /// the shell cannot run.
    pub fn acquire() -> Result<Self, StartupError> {
        if !std::io::stdin().is_terminal() {
            return Err(StartupError::NotInteractive);
        }

        loop {
            let pgrp = getpgrp();
            let owner = foreground_group().map_err(|source| StartupError::Terminal {
                action: "query the terminal's foreground group",
                source,
            })?;
            if owner == pgrp {
                break;
            }
            debug!(%pgrp, %owner, "shell is in the background, waiting for the terminal");
            killpg(pgrp, Signal::SIGTTIN).map_err(|source| StartupError::Terminal {
                action: "stop until foregrounded",
                source,
            })?;
        }

        for sig in [Signal::SIGQUIT, Signal::SIGTSTP, Signal::SIGTTOU] {
            install(sig, SigHandler::SigIgn)?;
        }
        install(Signal::SIGCHLD, SigHandler::Handler(on_child_exit))?;
        install(Signal::SIGINT, SigHandler::Handler(on_interrupt))?;

        let pid = getpid();
        // EPERM here means we already lead a session; the check below decides.
        if let Err(err) = setpgid(pid, pid) {
            debug!(%err, "setpgid failed");
        }
        let pgid = getpgrp();
        if pgid != pid {
            return Err(StartupError::NotGroupLeader);
        }

        set_foreground_group(pgid).map_err(|source| StartupError::Terminal {
            action: "take control of the terminal",
            source,
        })?;
        let modes = terminal_modes().map_err(|source| StartupError::Terminal {
            action: "read terminal attributes",
            source,
        })?;

        info!(%pgid, "interactive shell ready");
        Ok(Self { pgid, modes })
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    /// Gives the terminal back to the shell after a foreground job, with the modes saved
    /// at startup.
    pub fn reclaim(&self) {
        if let Err(err) = set_foreground_group(self.pgid) {
            debug!(%err, "could not reclaim the terminal");
        }
        let res = unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSADRAIN, &self.modes) };
        if let Err(err) = Errno::result(res) {
            debug!(%err, "could not restore terminal attributes");
        }
    }
}

fn install(sig: Signal, handler: SigHandler) -> Result<(), StartupError> {
    let action = SigAction::new(handler, SaFlags::SA_RESTART, SigSet::empty());
    unsafe { sigaction(sig, &action) }
        .map(drop)
        .map_err(|source| StartupError::Handler { signal: sig, source })
}

fn foreground_group() -> nix::Result<Pid> {
    let raw = unsafe { libc::tcgetpgrp(libc::STDIN_FILENO) };
    Errno::result(raw).map(Pid::from_raw)
}

fn set_foreground_group(pgid: Pid) -> nix::Result<()> {
    let res = unsafe { libc::tcsetpgrp(libc::STDIN_FILENO, pgid.as_raw()) };
    Errno::result(res).map(drop)
}

fn terminal_modes() -> nix::Result<libc::termios> {
    let mut modes = std::mem::MaybeUninit::<libc::termios>::uninit();
    let res = unsafe { libc::tcgetattr(libc::STDIN_FILENO, modes.as_mut_ptr()) };
    Errno::result(res)?;
    Ok(unsafe { modes.assume_init() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::process::Command;
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    fn spawn_sleep(secs: &str) -> Pid {
        let child = Command::new("sleep").arg(secs).spawn().unwrap();
        Pid::from_raw(child.id() as i32)
    }

    #[test]
    fn foreground_slots_track_and_clear() {
        let state = SignalState::new();
        assert!(state.track_foreground(Pid::from_raw(10)));
        assert!(state.track_foreground(Pid::from_raw(11)));
        assert_eq!(
            state.foreground_pids(),
            vec![Pid::from_raw(10), Pid::from_raw(11)]
        );
        state.clear_foreground();
        assert!(state.foreground_pids().is_empty());
    }

    #[test]
    fn reaped_pid_leaves_the_foreground_job() {
        let state = SignalState::new();
        state.track_foreground(Pid::from_raw(10));
        state.track_foreground(Pid::from_raw(11));

        state.forget_foreground(Pid::from_raw(10));

        assert_eq!(state.foreground_pids(), vec![Pid::from_raw(11)]);
    }

    #[test]
    #[serial]
    fn child_handler_preserves_errno() {
        Errno::set_raw(libc::EAGAIN);
        on_child_exit(libc::SIGCHLD);
        assert_eq!(Errno::last(), Errno::EAGAIN);
    }

    #[test]
    fn foreground_table_has_a_limit() {
        let state = SignalState::new();
        for raw in 1..=MAX_FOREGROUND as i32 {
            assert!(state.track_foreground(Pid::from_raw(raw + 100_000)));
        }
        assert!(!state.track_foreground(Pid::from_raw(42)));
    }

    #[test]
    fn interrupt_without_foreground_job_does_nothing() {
        let state = SignalState::new();
        state.interrupt_foreground();
        assert_eq!(state.take_interrupted(), None);
    }

    #[test]
    #[serial]
    fn interrupt_terminates_foreground_job_once() {
        let state = SignalState::new();
        let pid = spawn_sleep("30");
        state.track_foreground(pid);

        state.interrupt_foreground();
        let status = waitpid(pid, None).unwrap();
        state.clear_foreground();

        assert_eq!(status, WaitStatus::Signaled(pid, Signal::SIGTERM, false));
        assert_eq!(state.take_interrupted(), Some(pid));
        assert_eq!(state.take_interrupted(), None);
    }

    #[test]
    #[serial]
    fn reaper_collects_every_finished_child() {
        let state = SignalState::new();
        let pids: Vec<Pid> = (0..3).map(|_| spawn_sleep("0")).collect();

        let deadline = Instant::now() + Duration::from_secs(3);
        let mut finished = Vec::new();
        while !pids.iter().all(|pid| finished.contains(pid)) && Instant::now() < deadline {
            state.reap_finished();
            finished.extend(state.take_finished());
            sleep(Duration::from_millis(20));
        }

        for pid in &pids {
            assert!(finished.contains(pid), "{pid} was not reaped");
        }
        assert_eq!(state.reap_finished(), 0);
        assert!(state.take_finished().is_empty());
    }

    #[test]
    #[serial]
    fn blocking_child_signal_restores_previous_mask() {
        let before = SigSet::thread_get_mask().unwrap();
        {
            let _guard = ChildSignalBlock::new().unwrap();
            assert!(SigSet::thread_get_mask().unwrap().contains(Signal::SIGCHLD));
        }
        assert_eq!(
            SigSet::thread_get_mask().unwrap().contains(Signal::SIGCHLD),
            before.contains(Signal::SIGCHLD)
        );
    }
}
