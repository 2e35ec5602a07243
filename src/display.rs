use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::analysis::AnalysisResult;

/// What the UI renders: the latest analysis, whether a run is active and
/// whether its periodic timer is armed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    pub analysis: Option<AnalysisResult>,
    pub running: bool,
    pub capturing: bool,
    pub updated_at: Option<DateTime<Utc>>,
    /// Dispatch sequence of the tick whose result is shown.
    pub applied_seq: Option<u64>,
}

/// How completions that arrive out of dispatch order are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FreshnessPolicy {
    /// Whatever completes last is shown, even if it was dispatched earlier.
    #[default]
    LastCompleted,
    /// Completions older than the one already shown are dropped.
    DiscardStale,
}

/// Single owner of `DisplayState`. Writers go through the watch sender, so
/// subscribers see every mutation as a whole.
#[derive(Clone)]
pub struct DisplayStore {
    tx: Arc<watch::Sender<DisplayState>>,
    policy: FreshnessPolicy,
}

impl DisplayStore {
    pub fn new(policy: FreshnessPolicy) -> Self {
        let (tx, _rx) = watch::channel(DisplayState::default());
        Self {
            tx: Arc::new(tx),
            policy,
        }
    }

    pub fn policy(&self) -> FreshnessPolicy {
        self.policy
    }

    pub fn snapshot(&self) -> DisplayState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.tx.subscribe()
    }

    pub fn set_running(&self, running: bool) {
        self.tx.send_if_modified(|state| {
            if state.running == running {
                return false;
            }
            state.running = running;
            true
        });
    }

    pub fn set_capturing(&self, capturing: bool) {
        self.tx.send_if_modified(|state| {
            if state.capturing == capturing {
                return false;
            }
            state.capturing = capturing;
            true
        });
    }

    /// Apply the result of tick `seq`. Returns `false` when the policy
    /// rejected it as stale.
    pub fn apply(&self, seq: u64, result: AnalysisResult) -> bool {
        let policy = self.policy;
        self.tx.send_if_modified(|state| {
            if policy == FreshnessPolicy::DiscardStale
                && state.applied_seq.is_some_and(|applied| seq < applied)
            {
                return false;
            }
            state.analysis = Some(result);
            state.applied_seq = Some(seq);
            state.updated_at = Some(Utc::now());
            true
        })
    }
}

impl Default for DisplayStore {
    fn default() -> Self {
        Self::new(FreshnessPolicy::default())
    }
}
