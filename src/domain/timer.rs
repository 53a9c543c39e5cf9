//! Work/break cycle for a single task.
//!
//! The session never decides progress on its own: when a work interval ends it
//! emits [`TimerEffect::RecordInterval`] and waits until the caller feeds back
//! the authority's answer through [`TimerSession::apply_interval_recorded`] or
//! [`TimerSession::apply_authority_failure`]. Ticks are ignored while waiting.

use crate::domain::models::{
    CompletionOutcome, IntervalProgress, Settings, Task, TaskId, TaskStatus,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Work,
    Break,
    BreakComplete,
    TaskComplete,
}

impl TimerPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Work => "Work Time",
            Self::Break => "Break Time",
            Self::BreakComplete => "Break Complete",
            Self::TaskComplete => "Task Complete",
        }
    }
}

/// Calls the timer needs the progress authority to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEffect {
    RecordInterval(TaskId),
    CompleteTask(TaskId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("{action} is not available during {phase:?}")]
    NotAvailable {
        action: &'static str,
        phase: TimerPhase,
    },
    #[error("waiting for the server to confirm progress")]
    AwaitingAuthority,
    #[error("skip must be requested before it is confirmed")]
    SkipNotRequested,
    #[error("no authority call is pending")]
    NothingToApply,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimerSnapshot {
    pub task_id: TaskId,
    pub phase: TimerPhase,
    pub remaining_seconds: u32,
    pub paused: bool,
    pub awaiting_authority: bool,
    pub skip_requested: bool,
    pub completed_pomodoros: u32,
    pub pomodoros_needed: u32,
    pub breaks_entered: u32,
    pub last_error: Option<String>,
}

impl TimerSnapshot {
    pub fn clock(&self) -> String {
        format_clock(self.remaining_seconds)
    }
}

#[derive(Debug, Clone)]
pub struct TimerSession {
    task_id: TaskId,
    settings: Settings,
    phase: TimerPhase,
    remaining_seconds: u32,
    paused: bool,
    awaiting: Option<TimerEffect>,
    skip_requested: bool,
    completed_pomodoros: u32,
    pomodoros_needed: u32,
    breaks_entered: u32,
    last_error: Option<String>,
}

impl TimerSession {
    /// Starts paused in `Work`. A task that already reached its target but is
    /// still pending resumes at the completion call instead of a new interval.
    pub fn new(task: &Task, settings: Settings) -> Self {
        let mut session = Self {
            task_id: task.id,
            settings,
            phase: TimerPhase::Work,
            remaining_seconds: settings.work_seconds(),
            paused: true,
            awaiting: None,
            skip_requested: false,
            completed_pomodoros: task.completed_pomodoros,
            pomodoros_needed: task.pomodoros_needed,
            breaks_entered: 0,
            last_error: None,
        };
        if task.status == TaskStatus::Completed {
            session.phase = TimerPhase::TaskComplete;
            session.remaining_seconds = 0;
        } else if task.completed_pomodoros >= task.pomodoros_needed {
            session.awaiting = Some(TimerEffect::CompleteTask(task.id));
        }
        session
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_running(&self) -> bool {
        !self.paused && self.awaiting.is_none() && self.counts_down()
    }

    pub fn pending_effect(&self) -> Option<TimerEffect> {
        self.awaiting
    }

    pub fn breaks_entered(&self) -> u32 {
        self.breaks_entered
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            task_id: self.task_id,
            phase: self.phase,
            remaining_seconds: self.remaining_seconds,
            paused: self.paused,
            awaiting_authority: self.awaiting.is_some(),
            skip_requested: self.skip_requested,
            completed_pomodoros: self.completed_pomodoros,
            pomodoros_needed: self.pomodoros_needed,
            breaks_entered: self.breaks_entered,
            last_error: self.last_error.clone(),
        }
    }

    pub fn start(&mut self) -> Result<(), TimerError> {
        self.ensure_counting_phase("start")?;
        self.paused = false;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), TimerError> {
        self.ensure_counting_phase("pause")?;
        self.paused = true;
        Ok(())
    }

    /// Advances the countdown by one second. Returns the authority call to
    /// make when a work interval runs out.
    pub fn tick(&mut self) -> Option<TimerEffect> {
        if !self.is_running() {
            return None;
        }
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            return self.finish_phase();
        }
        None
    }

    pub fn reset(&mut self) -> Result<(), TimerError> {
        self.ensure_counting_phase("reset")?;
        self.remaining_seconds = self.phase_seconds();
        self.paused = true;
        self.skip_requested = false;
        Ok(())
    }

    pub fn request_skip(&mut self) -> Result<(), TimerError> {
        self.ensure_counting_phase("skip")?;
        self.skip_requested = true;
        Ok(())
    }

    pub fn cancel_skip(&mut self) {
        self.skip_requested = false;
    }

    /// Ends the current phase as if its countdown had reached zero.
    pub fn confirm_skip(&mut self) -> Result<Option<TimerEffect>, TimerError> {
        self.ensure_counting_phase("skip")?;
        if !self.skip_requested {
            return Err(TimerError::SkipNotRequested);
        }
        self.skip_requested = false;
        self.remaining_seconds = 0;
        Ok(self.finish_phase())
    }

    /// Leaves `BreakComplete` for the next work interval.
    pub fn resume_work(&mut self) -> Result<(), TimerError> {
        if self.awaiting.is_some() {
            return Err(TimerError::AwaitingAuthority);
        }
        if self.phase != TimerPhase::BreakComplete {
            return Err(TimerError::NotAvailable {
                action: "resume work",
                phase: self.phase,
            });
        }
        self.phase = TimerPhase::Work;
        self.remaining_seconds = self.settings.work_seconds();
        self.paused = true;
        Ok(())
    }

    /// Applies the authority's answer to a `RecordInterval` call.
    pub fn apply_interval_recorded(
        &mut self,
        progress: IntervalProgress,
    ) -> Result<Option<TimerEffect>, TimerError> {
        if !matches!(self.awaiting, Some(TimerEffect::RecordInterval(_))) {
            return Err(TimerError::NothingToApply);
        }
        self.last_error = None;
        self.completed_pomodoros = progress.completed_pomodoros;
        self.pomodoros_needed = progress.pomodoros_needed;
        if progress.is_complete {
            let effect = TimerEffect::CompleteTask(self.task_id);
            self.awaiting = Some(effect);
            return Ok(Some(effect));
        }
        self.awaiting = None;
        self.phase = TimerPhase::Break;
        self.remaining_seconds = self.settings.break_seconds();
        self.paused = true;
        self.breaks_entered += 1;
        Ok(None)
    }

    /// Applies the authority's answer to a `CompleteTask` call. An already
    /// completed task is treated the same as a fresh completion.
    pub fn apply_task_completed(&mut self, _outcome: CompletionOutcome) -> Result<(), TimerError> {
        if !matches!(self.awaiting, Some(TimerEffect::CompleteTask(_))) {
            return Err(TimerError::NothingToApply);
        }
        self.last_error = None;
        self.awaiting = None;
        self.phase = TimerPhase::TaskComplete;
        self.remaining_seconds = 0;
        self.paused = true;
        Ok(())
    }

    /// Records a failed authority call. The phase stays where it was and the
    /// same call remains pending for [`TimerSession::retry`].
    pub fn apply_authority_failure(&mut self, message: impl Into<String>) -> Result<(), TimerError> {
        if self.awaiting.is_none() {
            return Err(TimerError::NothingToApply);
        }
        self.last_error = Some(message.into());
        Ok(())
    }

    pub fn retry(&self) -> Option<TimerEffect> {
        self.awaiting
    }

    fn finish_phase(&mut self) -> Option<TimerEffect> {
        match self.phase {
            TimerPhase::Work => {
                let effect = TimerEffect::RecordInterval(self.task_id);
                self.awaiting = Some(effect);
                Some(effect)
            }
            TimerPhase::Break => {
                self.phase = TimerPhase::BreakComplete;
                self.paused = true;
                None
            }
            TimerPhase::BreakComplete | TimerPhase::TaskComplete => None,
        }
    }

    fn counts_down(&self) -> bool {
        matches!(self.phase, TimerPhase::Work | TimerPhase::Break)
    }

    fn phase_seconds(&self) -> u32 {
        match self.phase {
            TimerPhase::Work => self.settings.work_seconds(),
            TimerPhase::Break => self.settings.break_seconds(),
            TimerPhase::BreakComplete | TimerPhase::TaskComplete => 0,
        }
    }

    fn ensure_counting_phase(&self, action: &'static str) -> Result<(), TimerError> {
        if self.awaiting.is_some() {
            return Err(TimerError::AwaitingAuthority);
        }
        if !self.counts_down() {
            return Err(TimerError::NotAvailable {
                action,
                phase: self.phase,
            });
        }
        Ok(())
    }
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
