//! Command arbitrator - owns the set of held inputs and picks the one to drive

use rover_shared::Action;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Rule selecting which of several held actions is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArbitrationPolicy {
    /// The action held longest keeps control until released
    #[default]
    OldestWins,
    /// The most recent press takes over, older ones resume when it is released
    NewestWins,
}

impl fmt::Display for ArbitrationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArbitrationPolicy::OldestWins => write!(f, "oldest"),
            ArbitrationPolicy::NewestWins => write!(f, "newest"),
        }
    }
}

/// Policy name not recognized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown arbitration policy: {0} (expected oldest or newest)")]
pub struct UnknownPolicy(pub String);

impl FromStr for ArbitrationPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oldest" => Ok(ArbitrationPolicy::OldestWins),
            "newest" => Ok(ArbitrationPolicy::NewestWins),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

/// Held actions ordered by activation time, oldest first
#[derive(Debug, Default)]
struct ActiveSet {
    actions: Vec<Action>,
}

impl ActiveSet {
    fn insert(&mut self, action: Action) -> bool {
        if self.actions.contains(&action) {
            return false;
        }
        self.actions.push(action);
        true
    }

    fn remove(&mut self, action: Action) -> bool {
        match self.actions.iter().position(|a| *a == action) {
            Some(pos) => {
                self.actions.remove(pos);
                true
            }
            None => false,
        }
    }

    fn select(&self, policy: ArbitrationPolicy) -> Option<Action> {
        match policy {
            ArbitrationPolicy::OldestWins => self.actions.first().copied(),
            ArbitrationPolicy::NewestWins => self.actions.last().copied(),
        }
    }
}

/// Shared between the link loop and the actuation worker.
///
/// Every read and mutation takes the same lock for the whole call, so the
/// worker never observes a half-applied press or release.
#[derive(Debug)]
pub struct CommandArbitrator {
    policy: ArbitrationPolicy,
    active: Mutex<ActiveSet>,
}

impl CommandArbitrator {
    /// Create an arbitrator with an empty active set
    pub fn new(policy: ArbitrationPolicy) -> Self {
        Self {
            policy,
            active: Mutex::new(ActiveSet::default()),
        }
    }

    /// The selection rule in use
    pub fn policy(&self) -> ArbitrationPolicy {
        self.policy
    }

    /// Mark an action as held. Idempotent.
    pub async fn activate(&self, action: Action) {
        let mut active = self.active.lock().await;
        if active.insert(action) {
            debug!("Activated {} -> {:?}", action, active.actions);
        }
    }

    /// Mark an action as released. No-op if it was not held.
    pub async fn deactivate(&self, action: Action) {
        let mut active = self.active.lock().await;
        if active.remove(action) {
            debug!("Deactivated {} -> {:?}", action, active.actions);
        }
    }

    /// The action to issue now, `Stop` when nothing is held
    pub async fn current(&self) -> Action {
        self.active
            .lock()
            .await
            .select(self.policy)
            .unwrap_or(Action::Stop)
    }

    /// Drop every held action
    pub async fn clear(&self) {
        self.active.lock().await.actions.clear();
    }

    /// Copy of the held actions, oldest first
    pub async fn snapshot(&self) -> Vec<Action> {
        self.active.lock().await.actions.clone()
    }
}

impl Default for CommandArbitrator {
    fn default() -> Self {
        Self::new(ArbitrationPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use Action::*;

    #[tokio::test]
    async fn test_empty_is_stop() {
        let arb = CommandArbitrator::default();
        assert_eq!(arb.current().await, Stop);
        assert!(arb.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_activate_is_idempotent() {
        let arb = CommandArbitrator::default();
        arb.activate(Forward).await;
        arb.activate(Forward).await;
        assert_eq!(arb.snapshot().await, vec![Forward]);

        arb.deactivate(Forward).await;
        assert_eq!(arb.current().await, Stop);
    }

    #[tokio::test]
    async fn test_deactivate_absent_is_noop() {
        let arb = CommandArbitrator::default();
        arb.activate(Left).await;
        arb.deactivate(Right).await;
        assert_eq!(arb.snapshot().await, vec![Left]);
        assert_eq!(arb.current().await, Left);
    }

    #[tokio::test]
    async fn test_oldest_wins_until_released() {
        let arb = CommandArbitrator::new(ArbitrationPolicy::OldestWins);
        arb.activate(Forward).await;
        arb.activate(Left).await;
        assert_eq!(arb.current().await, Forward);

        arb.deactivate(Forward).await;
        assert_eq!(arb.current().await, Left);
    }

    #[tokio::test]
    async fn test_oldest_wins_newer_release_keeps_oldest() {
        let arb = CommandArbitrator::new(ArbitrationPolicy::OldestWins);
        arb.activate(Forward).await;
        arb.activate(Left).await;
        arb.deactivate(Left).await;
        assert_eq!(arb.current().await, Forward);
    }

    #[tokio::test]
    async fn test_newest_wins() {
        let arb = CommandArbitrator::new(ArbitrationPolicy::NewestWins);
        arb.activate(Forward).await;
        arb.activate(Left).await;
        assert_eq!(arb.current().await, Left);

        arb.deactivate(Left).await;
        assert_eq!(arb.current().await, Forward);
    }

    #[tokio::test]
    async fn test_held_stop_is_issued() {
        let arb = CommandArbitrator::default();
        arb.activate(Stop).await;
        arb.activate(Forward).await;
        assert_eq!(arb.current().await, Stop);
    }

    #[tokio::test]
    async fn test_current_always_held_or_stop() {
        // Deterministic pseudo-random walk over press/release sequences
        let mut seed: u32 = 0x2545_f491;
        for policy in [ArbitrationPolicy::OldestWins, ArbitrationPolicy::NewestWins] {
            let arb = CommandArbitrator::new(policy);
            for _ in 0..500 {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                let action = Action::ALL[(seed % 5) as usize];
                if seed & 0x100 == 0 {
                    arb.activate(action).await;
                } else {
                    arb.deactivate(action).await;
                }

                let held = arb.snapshot().await;
                let current = arb.current().await;
                let unique: HashSet<_> = held.iter().collect();
                assert_eq!(unique.len(), held.len());
                if held.is_empty() {
                    assert_eq!(current, Stop);
                } else {
                    assert!(held.contains(&current));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_clear() {
        let arb = CommandArbitrator::default();
        arb.activate(Backward).await;
        arb.activate(Right).await;
        arb.clear().await;
        assert_eq!(arb.current().await, Stop);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("oldest".parse::<ArbitrationPolicy>(), Ok(ArbitrationPolicy::OldestWins));
        assert_eq!("newest".parse::<ArbitrationPolicy>(), Ok(ArbitrationPolicy::NewestWins));
        assert_eq!(
            "lifo".parse::<ArbitrationPolicy>(),
            Err(UnknownPolicy("lifo".into()))
        );
        // Names are case-sensitive, like the wire actions
        assert!("Oldest".parse::<ArbitrationPolicy>().is_err());
    }
}
