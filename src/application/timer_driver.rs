use crate::domain::models::IntervalProgress;
use crate::domain::timer::{TimerEffect, TimerError, TimerPhase, TimerSession, TimerSnapshot};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::progress_authority::ProgressAuthority;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    Reset,
    RequestSkip,
    CancelSkip,
    ConfirmSkip,
    ResumeWork,
    Retry,
}

impl TimerCommand {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "start" | "resume" | "s" => Some(Self::Start),
            "pause" | "p" => Some(Self::Pause),
            "reset" | "r" => Some(Self::Reset),
            "skip" | "k" => Some(Self::RequestSkip),
            "no" | "cancel" | "n" => Some(Self::CancelSkip),
            "yes" | "confirm" | "y" => Some(Self::ConfirmSkip),
            "next" | "continue" | "c" => Some(Self::ResumeWork),
            "retry" => Some(Self::Retry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerEvent {
    PhaseChanged(TimerPhase),
    IntervalRecorded(IntervalProgress),
    TaskCompleted { already_completed: bool },
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error("progress update failed: {0}")]
    Authority(#[source] InfraError),
}

/// Runs a [`TimerSession`] against a progress authority, performing the
/// authority calls the session asks for at phase boundaries.
pub struct TimerDriver<A: ProgressAuthority> {
    session: TimerSession,
    authority: A,
}

impl<A: ProgressAuthority> TimerDriver<A> {
    pub fn new(session: TimerSession, authority: A) -> Self {
        Self { session, authority }
    }

    pub fn session(&self) -> &TimerSession {
        &self.session
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.session.snapshot()
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    pub async fn tick(&mut self) -> Result<Vec<TimerEvent>, DriverError> {
        let phase_before = self.session.phase();
        let mut events = Vec::new();
        if let Some(effect) = self.session.tick() {
            self.execute(effect, &mut events).await?;
        }
        self.push_phase_change(phase_before, &mut events);
        Ok(events)
    }

    pub async fn apply(&mut self, command: TimerCommand) -> Result<Vec<TimerEvent>, DriverError> {
        let phase_before = self.session.phase();
        let mut events = Vec::new();
        let effect = match command {
            TimerCommand::Start => self.session.start().map(|()| None)?,
            TimerCommand::Pause => self.session.pause().map(|()| None)?,
            TimerCommand::Reset => self.session.reset().map(|()| None)?,
            TimerCommand::RequestSkip => self.session.request_skip().map(|()| None)?,
            TimerCommand::CancelSkip => {
                self.session.cancel_skip();
                None
            }
            TimerCommand::ConfirmSkip => self.session.confirm_skip()?,
            TimerCommand::ResumeWork => self.session.resume_work().map(|()| None)?,
            TimerCommand::Retry => Some(self.session.retry().ok_or(TimerError::NothingToApply)?),
        };
        if let Some(effect) = effect {
            self.execute(effect, &mut events).await?;
        }
        self.push_phase_change(phase_before, &mut events);
        Ok(events)
    }

    async fn execute(
        &mut self,
        effect: TimerEffect,
        events: &mut Vec<TimerEvent>,
    ) -> Result<(), DriverError> {
        let mut next = Some(effect);
        while let Some(effect) = next.take() {
            match effect {
                TimerEffect::RecordInterval(task_id) => {
                    let progress = match self.authority.record_interval(task_id).await {
                        Ok(progress) => progress,
                        Err(error) => return Err(self.fail(error)),
                    };
                    tracing::debug!(
                        task_id,
                        completed = progress.completed_pomodoros,
                        needed = progress.pomodoros_needed,
                        "interval recorded"
                    );
                    events.push(TimerEvent::IntervalRecorded(progress));
                    next = self.session.apply_interval_recorded(progress)?;
                }
                TimerEffect::CompleteTask(task_id) => {
                    let outcome = match self.authority.complete_task(task_id).await {
                        Ok(outcome) => outcome,
                        Err(error) => return Err(self.fail(error)),
                    };
                    tracing::debug!(task_id, already = outcome.already_completed, "task completed");
                    self.session.apply_task_completed(outcome)?;
                    events.push(TimerEvent::TaskCompleted {
                        already_completed: outcome.already_completed,
                    });
                }
            }
        }
        Ok(())
    }

    fn fail(&mut self, error: InfraError) -> DriverError {
        tracing::warn!(error = %error, "progress authority call failed");
        if let Err(timer_error) = self.session.apply_authority_failure(error.to_string()) {
            return timer_error.into();
        }
        DriverError::Authority(error)
    }

    fn push_phase_change(&self, before: TimerPhase, events: &mut Vec<TimerEvent>) {
        let after = self.session.phase();
        if after != before {
            events.push(TimerEvent::PhaseChanged(after));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CompletionOutcome, Settings, Task, TaskId, TaskStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeState {
        completed: u32,
        needed: u32,
        record_calls: u32,
        complete_calls: u32,
        task_completed: bool,
        fail_next_record: bool,
        fail_next_complete: bool,
    }

    struct FakeAuthority {
        state: Mutex<FakeState>,
    }

    impl FakeAuthority {
        fn new(needed: u32) -> Self {
            Self {
                state: Mutex::new(FakeState {
                    needed,
                    ..FakeState::default()
                }),
            }
        }

        fn failing_record(self) -> Self {
            self.state.lock().expect("fake lock").fail_next_record = true;
            self
        }

        fn failing_complete(self) -> Self {
            self.state.lock().expect("fake lock").fail_next_complete = true;
            self
        }

        fn read<T>(&self, read: impl FnOnce(&FakeState) -> T) -> T {
            read(&self.state.lock().expect("fake lock"))
        }
    }

    #[async_trait]
    impl ProgressAuthority for FakeAuthority {
        async fn record_interval(&self, _task_id: TaskId) -> Result<IntervalProgress, InfraError> {
            let mut state = self.state.lock().expect("fake lock");
            state.record_calls += 1;
            if std::mem::take(&mut state.fail_next_record) {
                return Err(InfraError::Http("connection reset".to_string()));
            }
            state.completed = (state.completed + 1).min(state.needed);
            Ok(IntervalProgress::new(state.completed, state.needed))
        }

        async fn complete_task(&self, _task_id: TaskId) -> Result<CompletionOutcome, InfraError> {
            let mut state = self.state.lock().expect("fake lock");
            state.complete_calls += 1;
            if std::mem::take(&mut state.fail_next_complete) {
                return Err(InfraError::Http("connection reset".to_string()));
            }
            let already_completed = std::mem::replace(&mut state.task_completed, true);
            Ok(CompletionOutcome { already_completed })
        }
    }

    fn task(needed: u32) -> Task {
        Task {
            id: 11,
            user_id: 1,
            title: "Focus".to_string(),
            description: None,
            status: TaskStatus::Pending,
            pomodoros_needed: needed,
            completed_pomodoros: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn driver(needed: u32, authority: FakeAuthority) -> TimerDriver<FakeAuthority> {
        TimerDriver::new(TimerSession::new(&task(needed), Settings::default()), authority)
    }

    async fn run_phase(driver: &mut TimerDriver<FakeAuthority>) -> Vec<TimerEvent> {
        driver.apply(TimerCommand::Start).await.expect("start");
        let mut events = Vec::new();
        for _ in 0..driver.session().remaining_seconds() {
            events.extend(driver.tick().await.expect("tick"));
        }
        events
    }

    #[tokio::test]
    async fn two_intervals_complete_task_with_one_break() {
        let mut driver = driver(2, FakeAuthority::new(2));

        let events = run_phase(&mut driver).await;
        assert_eq!(
            events,
            vec![
                TimerEvent::IntervalRecorded(IntervalProgress::new(1, 2)),
                TimerEvent::PhaseChanged(TimerPhase::Break),
            ]
        );
        assert!(driver.session().is_paused());
        assert_eq!(driver.session().remaining_seconds(), 300);

        let events = run_phase(&mut driver).await;
        assert_eq!(events, vec![TimerEvent::PhaseChanged(TimerPhase::BreakComplete)]);

        driver.apply(TimerCommand::ResumeWork).await.expect("resume work");
        assert_eq!(driver.session().phase(), TimerPhase::Work);
        assert_eq!(driver.session().remaining_seconds(), 1_500);

        let events = run_phase(&mut driver).await;
        assert_eq!(
            events,
            vec![
                TimerEvent::IntervalRecorded(IntervalProgress::new(2, 2)),
                TimerEvent::TaskCompleted {
                    already_completed: false
                },
                TimerEvent::PhaseChanged(TimerPhase::TaskComplete),
            ]
        );
        assert_eq!(driver.session().breaks_entered(), 1);
        assert_eq!(driver.authority().read(|state| state.completed), 2);
        assert_eq!(driver.authority().read(|state| state.complete_calls), 1);
    }

    #[tokio::test]
    async fn single_interval_task_never_enters_break() {
        let mut driver = driver(1, FakeAuthority::new(1));
        run_phase(&mut driver).await;
        assert_eq!(driver.session().phase(), TimerPhase::TaskComplete);
        assert_eq!(driver.session().breaks_entered(), 0);
        assert!(driver.authority().read(|state| state.task_completed));
    }

    #[tokio::test]
    async fn confirmed_skip_records_the_interval() {
        let mut driver = driver(3, FakeAuthority::new(3));
        assert!(matches!(
            driver.apply(TimerCommand::ConfirmSkip).await,
            Err(DriverError::Timer(TimerError::SkipNotRequested))
        ));
        driver.apply(TimerCommand::RequestSkip).await.expect("request");
        let events = driver.apply(TimerCommand::ConfirmSkip).await.expect("confirm");
        assert_eq!(events[0], TimerEvent::IntervalRecorded(IntervalProgress::new(1, 3)));
        assert_eq!(driver.session().phase(), TimerPhase::Break);
    }

    #[tokio::test]
    async fn failed_record_keeps_work_at_zero_until_retry() {
        let mut driver = driver(2, FakeAuthority::new(2).failing_record());
        driver.apply(TimerCommand::Start).await.expect("start");
        for _ in 0..1_499 {
            driver.tick().await.expect("tick");
        }
        let failure = driver.tick().await;
        assert!(matches!(failure, Err(DriverError::Authority(_))));

        let snapshot = driver.snapshot();
        assert_eq!(snapshot.phase, TimerPhase::Work);
        assert_eq!(snapshot.remaining_seconds, 0);
        assert!(snapshot.awaiting_authority);
        assert!(snapshot.last_error.is_some());
        assert!(driver.tick().await.expect("ignored tick").is_empty());

        let events = driver.apply(TimerCommand::Retry).await.expect("retry");
        assert!(events.contains(&TimerEvent::PhaseChanged(TimerPhase::Break)));
        assert_eq!(driver.authority().read(|state| state.record_calls), 2);
        assert_eq!(driver.authority().read(|state| state.completed), 1);
        assert_eq!(driver.snapshot().last_error, None);
    }

    #[tokio::test]
    async fn failed_completion_retries_only_the_completion() {
        let mut driver = driver(1, FakeAuthority::new(1).failing_complete());
        driver.apply(TimerCommand::RequestSkip).await.expect("request");
        assert!(matches!(
            driver.apply(TimerCommand::ConfirmSkip).await,
            Err(DriverError::Authority(_))
        ));
        assert_eq!(driver.session().pending_effect(), Some(TimerEffect::CompleteTask(11)));

        let events = driver.apply(TimerCommand::Retry).await.expect("retry");
        assert_eq!(
            events,
            vec![
                TimerEvent::TaskCompleted {
                    already_completed: false
                },
                TimerEvent::PhaseChanged(TimerPhase::TaskComplete),
            ]
        );
        assert_eq!(driver.authority().read(|state| state.record_calls), 1);
        assert_eq!(driver.authority().read(|state| state.complete_calls), 2);
    }

    #[tokio::test]
    async fn retry_without_pending_call_is_rejected() {
        let mut driver = driver(2, FakeAuthority::new(2));
        assert!(matches!(
            driver.apply(TimerCommand::Retry).await,
            Err(DriverError::Timer(TimerError::NothingToApply))
        ));
    }

    #[test]
    fn commands_parse_from_terminal_words() {
        assert_eq!(TimerCommand::parse(" Start "), Some(TimerCommand::Start));
        assert_eq!(TimerCommand::parse("skip"), Some(TimerCommand::RequestSkip));
        assert_eq!(TimerCommand::parse("y"), Some(TimerCommand::ConfirmSkip));
        assert_eq!(TimerCommand::parse("next"), Some(TimerCommand::ResumeWork));
        assert_eq!(TimerCommand::parse("dance"), None);
    }
}
