use std::fmt;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier shared by every event of one repo sync run.
pub type SyncRunId = Uuid;

/// One repo's walk through a run. A run starts at `Idle`, moves through the
/// work states in order (`Merging` only appears when a diff is applied) and
/// ends in `Done` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    Idle,
    Downloading,
    Validating,
    Parsing,
    Merging,
    Done,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncState::Idle => "idle",
            SyncState::Downloading => "downloading",
            SyncState::Validating => "validating",
            SyncState::Parsing => "parsing",
            SyncState::Merging => "merging",
            SyncState::Done => "done",
            SyncState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    StateChanged {
        run_id: SyncRunId,
        repo_id: i64,
        state: SyncState,
    },
    /// The remote confirmed the stored index is current; nothing was
    /// touched.
    Unchanged {
        run_id: SyncRunId,
        repo_id: i64,
    },
    Completed {
        run_id: SyncRunId,
        repo_id: i64,
        packages: usize,
    },
    Failed {
        run_id: SyncRunId,
        repo_id: i64,
        message: String,
    },
    Cancelled {
        run_id: SyncRunId,
        repo_id: i64,
    },
}

/// Emits one run's events to an optional listener. Send failures are
/// ignored, so a dropped receiver never stalls a sync.
#[derive(Clone)]
pub struct SyncReporter {
    run_id: SyncRunId,
    repo_id: i64,
    tx: Option<mpsc::Sender<SyncEvent>>,
}

impl SyncReporter {
    pub fn new(repo_id: i64, tx: Option<mpsc::Sender<SyncEvent>>) -> Self {
        SyncReporter {
            run_id: Uuid::new_v4(),
            repo_id,
            tx,
        }
    }

    pub fn run_id(&self) -> SyncRunId {
        self.run_id
    }

    pub async fn state(&self, state: SyncState) {
        self.emit(SyncEvent::StateChanged {
            run_id: self.run_id,
            repo_id: self.repo_id,
            state,
        })
        .await;
    }

    pub async fn unchanged(&self) {
        self.emit(SyncEvent::Unchanged {
            run_id: self.run_id,
            repo_id: self.repo_id,
        })
        .await;
    }

    pub async fn completed(&self, packages: usize) {
        self.emit(SyncEvent::Completed {
            run_id: self.run_id,
            repo_id: self.repo_id,
            packages,
        })
        .await;
    }

    pub async fn failed(&self, message: String) {
        self.emit(SyncEvent::Failed {
            run_id: self.run_id,
            repo_id: self.repo_id,
            message,
        })
        .await;
    }

    pub async fn cancelled(&self) {
        self.emit(SyncEvent::Cancelled {
            run_id: self.run_id,
            repo_id: self.repo_id,
        })
        .await;
    }

    async fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }
}
