//! Running `a | b | c`: one pipe per stage boundary, every stage forked before any wait.

use crate::command::{Command, ExitCode, Pipeline};
use crate::error::LaunchError;
use crate::job::{ChildRole, ChildSignalBlock};
use crate::launcher::{ExecImage, StdioPlan, spawn, wait_for};
use crate::session::Session;
use nix::fcntl::OFlag;
use nix::unistd::{Pid, pipe2};
use std::os::fd::OwnedFd;
use tracing::debug;

/// The pipes of one pipeline, indexed by boundary.
///
/// Boundary `i` connects stage `i` (writer) to stage `i + 1` (reader). Each end is
/// taken exactly once, when the stage that uses it is launched.
struct PipeChain {
    boundaries: Vec<(Option<OwnedFd>, Option<OwnedFd>)>,
}

impl PipeChain {
    fn new(stages: usize) -> Result<Self, LaunchError> {
        let boundaries = (1..stages)
            .map(|_| {
                pipe2(OFlag::O_CLOEXEC)
                    .map(|(read, write)| (Some(read), Some(write)))
                    .map_err(LaunchError::Pipe)
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { boundaries })
    }

    fn input_for(&mut self, stage: usize) -> Option<OwnedFd> {
        let boundary = stage.checked_sub(1)?;
        self.boundaries.get_mut(boundary)?.0.take()
    }

    fn output_for(&mut self, stage: usize) -> Option<OwnedFd> {
        self.boundaries.get_mut(stage)?.1.take()
    }
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Status of the last stage.
    pub status: ExitCode,
    /// Stages that could not be launched, plus any failed waits.
    pub errors: Vec<LaunchError>,
    /// Every process that was started, all of them already waited for.
    pub launched: Vec<Pid>,
}

impl PipelineReport {
    fn failed(err: LaunchError) -> Self {
        Self {
            status: err.status(),
            errors: vec![err],
            launched: Vec::new(),
        }
    }
}

fn launch_stage(
    stage: &Command,
    input: Option<OwnedFd>,
    output: Option<OwnedFd>,
    session: &Session,
) -> Result<Pid, LaunchError> {
    let image = ExecImage::resolve(&stage.argv, &session.env)?;
    let mut io = StdioPlan::open(stage)?;
    io.stdin = input.or(io.stdin.take());
    io.stdout = output.or(io.stdout.take());
    spawn(&image, io, ChildRole::PipelineStage)
}

/// Runs every stage concurrently and waits for all of them.
///
/// A stage that fails to launch is recorded and skipped. Its pipe ends are closed
/// anyway, so its neighbours see end of input or a broken pipe instead of hanging.
pub fn run(pipeline: &Pipeline, session: &Session) -> PipelineReport {
    let Some(last) = pipeline.len().checked_sub(1) else {
        return PipelineReport {
            status: 0,
            errors: Vec::new(),
            launched: Vec::new(),
        };
    };
    let mut pipes = match PipeChain::new(pipeline.len()) {
        Ok(pipes) => pipes,
        Err(err) => return PipelineReport::failed(err),
    };
    let _blocked = match ChildSignalBlock::new() {
        Ok(guard) => guard,
        Err(err) => return PipelineReport::failed(LaunchError::SignalMask(err)),
    };

    let signals = session.signals();
    let mut status = 0;
    let mut errors = Vec::new();
    let mut running = Vec::with_capacity(pipeline.len());

    for (index, stage) in pipeline.stages.iter().enumerate() {
        let input = pipes.input_for(index);
        let output = pipes.output_for(index);
        match launch_stage(stage, input, output, session) {
            Ok(pid) => {
                signals.track_foreground(pid);
                running.push((index, pid));
            }
            Err(err) => {
                debug!(stage = index, program = stage.name(), %err, "pipeline stage not launched");
                if index == last {
                    status = err.status();
                }
                errors.push(err);
            }
        }
    }
    drop(pipes);

    for &(index, pid) in &running {
        let waited = wait_for(pid);
        signals.forget_foreground(pid);
        match waited {
            Ok(code) if index == last => status = code,
            Ok(_) => {}
            Err(err) => errors.push(err),
        }
    }
    signals.clear_foreground();
    session.reclaim_terminal();

    PipelineReport {
        status,
        errors,
        launched: running.into_iter().map(|(_, pid)| pid).collect(),
    }
}
