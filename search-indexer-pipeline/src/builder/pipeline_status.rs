//! Completion tracking for asynchronous submissions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::errors::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    Completed(DateTime<Utc>),
    Abandoned,
}

/// Handle on one in-flight submission.
///
/// Clones share the same state. The first terminal transition wins; later
/// `mark_completed` / `abandon` calls are ignored.
#[derive(Debug, Clone)]
pub struct PipelineStatus {
    state: Arc<watch::Sender<State>>,
}

impl PipelineStatus {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(State::Running);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Record successful completion now.
    pub fn mark_completed(&self) {
        self.finish(State::Completed(Utc::now()));
    }

    /// Record that the submission stopped without completing.
    pub fn abandon(&self) {
        self.finish(State::Abandoned);
    }

    fn finish(&self, terminal: State) {
        self.state.send_if_modified(|state| {
            if *state == State::Running {
                *state = terminal;
                true
            } else {
                false
            }
        });
    }

    /// When the submission completed, if it has.
    pub fn completion_date(&self) -> Option<DateTime<Utc>> {
        match *self.state.borrow() {
            State::Completed(at) => Some(at),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completion_date().is_some()
    }

    /// Wait until the submission completes and return its completion time.
    ///
    /// Fails with [`PipelineError::Interrupted`] if it was abandoned.
    pub async fn wait_until_completed(&self) -> Result<DateTime<Utc>, PipelineError> {
        let mut rx = self.state.subscribe();
        loop {
            match *rx.borrow_and_update() {
                State::Completed(at) => return Ok(at),
                State::Abandoned => return Err(PipelineError::Interrupted),
                State::Running => {}
            }
            rx.changed().await.map_err(|_| PipelineError::Interrupted)?;
        }
    }
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::new()
    }
}
