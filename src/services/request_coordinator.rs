// src/services/request_coordinator.rs
//
// Request Coordinator
//
// Deduplicates concurrent expensive work per CacheKey.
//
// CRITICAL RULES:
// - At most one Leader per key at any time (election happens under one lock)
// - Followers wait on a watch channel: no polling, no worker held
// - Every waiter registered before settlement receives the identical outcome
// - The token is released on every exit path: settle, failure, drop, abort
// - A failure is delivered, never remembered: the next caller elects anew
//
// In `run` mode the Leader's operation is spawned so it survives its own
// caller going away. It is aborted only once no waiter is left.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::domain::CacheKey;
use crate::error::{ResolutionError, ResolveResult};

type Settlement<T> = Option<ResolveResult<T>>;

/// In-flight token for one key
struct Slot<T> {
    id: u64,
    tx: watch::Sender<Settlement<T>>,
    waiters: usize,
    abort: Option<AbortHandle>,
}

struct Inner<T> {
    slots: Mutex<HashMap<CacheKey, Slot<T>>>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn slots(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove the slot if it is still the one identified by `id`
    fn take_slot(&self, key: &CacheKey, id: u64) -> Option<Slot<T>> {
        let mut slots = self.slots();
        if slots.get(key).map(|slot| slot.id) == Some(id) {
            slots.remove(key)
        } else {
            None
        }
    }
}

/// Role a caller ended up with for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

/// Outcome of `acquire_or_join`
pub enum Participation<T> {
    Leader(LeaderPermit<T>),
    Follower(FollowerHandle<T>),
}

/// Outcome of `run`
#[derive(Debug)]
pub struct Coordinated<T> {
    pub role: Role,
    pub outcome: ResolveResult<T>,
}

pub struct RequestCoordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slots: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Become the Leader for `key`, or join the Leader already working on it
    pub fn acquire_or_join(&self, key: &CacheKey) -> Participation<T> {
        let mut slots = self.inner.slots();

        if let Some(slot) = slots.get_mut(key) {
            slot.waiters += 1;
            log::debug!("Joining in-flight work for {} ({} waiting)", key, slot.waiters);
            return Participation::Follower(FollowerHandle {
                inner: Arc::clone(&self.inner),
                key: key.clone(),
                id: slot.id,
                rx: slot.tx.subscribe(),
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, _) = watch::channel(None);
        slots.insert(
            key.clone(),
            Slot {
                id,
                tx,
                waiters: 0,
                abort: None,
            },
        );
        log::debug!("Elected leader for {}", key);

        Participation::Leader(LeaderPermit {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            id,
            settled: false,
        })
    }

    /// Run `operation` for `key` at most once across concurrent callers.
    ///
    /// Only the elected Leader calls `operation`; everyone receives its
    /// outcome. The Leader's future is spawned, so cancelling the Leader's
    /// caller does not cancel work other waiters depend on.
    pub async fn run<F, Fut>(&self, key: &CacheKey, operation: F) -> Coordinated<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResolveResult<T>> + Send + 'static,
    {
        match self.acquire_or_join(key) {
            Participation::Follower(handle) => Coordinated {
                role: Role::Follower,
                outcome: handle.wait().await,
            },
            Participation::Leader(permit) => {
                let own_handle = permit.subscribe();
                let id = permit.id;
                let work = operation();

                let task = tokio::spawn(async move {
                    let outcome = work.await;
                    permit.settle(outcome);
                });
                self.attach_abort(key, id, task.abort_handle());

                Coordinated {
                    role: Role::Leader,
                    outcome: own_handle.wait().await,
                }
            }
        }
    }

    fn attach_abort(&self, key: &CacheKey, id: u64, abort: AbortHandle) {
        let mut slots = self.inner.slots();
        if let Some(slot) = slots.get_mut(key).filter(|slot| slot.id == id) {
            slot.abort = Some(abort);
        }
    }

    /// Keys with work currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.inner.slots().len()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.slots().contains_key(key)
    }
}

impl<T> Default for RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LEADER
// ============================================================================

/// Exclusive right to perform the work for a key.
///
/// Dropping an unsettled permit releases the key and delivers
/// `ResolutionError::Cancelled` to whoever is waiting.
pub struct LeaderPermit<T> {
    inner: Arc<Inner<T>>,
    key: CacheKey,
    id: u64,
    settled: bool,
}

impl<T> LeaderPermit<T> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Register a waiter on the Leader's own outcome
    pub fn subscribe(&self) -> FollowerHandle<T> {
        let mut slots = self.inner.slots();
        let slot = slots
            .get_mut(&self.key)
            .filter(|slot| slot.id == self.id);

        let rx = match slot {
            Some(slot) => {
                slot.waiters += 1;
                slot.tx.subscribe()
            }
            // Already released: the handle resolves to Cancelled
            None => watch::channel(None).1,
        };

        FollowerHandle {
            inner: Arc::clone(&self.inner),
            key: self.key.clone(),
            id: self.id,
            rx,
        }
    }

    /// Release the key and hand `outcome` to every waiter
    pub fn settle(mut self, outcome: ResolveResult<T>) {
        self.settled = true;
        self.release(outcome);
    }

    fn release(&self, outcome: ResolveResult<T>) {
        // Remove first so a caller arriving after this point elects a new
        // Leader instead of joining a finished slot
        if let Some(slot) = self.inner.take_slot(&self.key, self.id) {
            slot.tx.send_replace(Some(outcome));
        }
    }
}

impl<T> Drop for LeaderPermit<T> {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("Leader for {} dropped before settling", self.key);
            self.release(Err(ResolutionError::Cancelled));
        }
    }
}

// ============================================================================
// FOLLOWER
// ============================================================================

/// A registered wait on a key's in-flight outcome
pub struct FollowerHandle<T> {
    inner: Arc<Inner<T>>,
    key: CacheKey,
    id: u64,
    rx: watch::Receiver<Settlement<T>>,
}

impl<T> FollowerHandle<T>
where
    T: Clone,
{
    /// Suspend until the Leader settles
    pub async fn wait(mut self) -> ResolveResult<T> {
        let outcome = match self.rx.wait_for(Option::is_some).await {
            Ok(settled) => settled.clone().unwrap_or(Err(ResolutionError::Cancelled)),
            // Sender gone without a value
            Err(_) => Err(ResolutionError::Cancelled),
        };
        outcome
    }
}

impl<T> Drop for FollowerHandle<T> {
    fn drop(&mut self) {
        let abandoned = {
            let mut slots = self.inner.slots();
            match slots.get_mut(&self.key).filter(|slot| slot.id == self.id) {
                Some(slot) => {
                    slot.waiters = slot.waiters.saturating_sub(1);
                    // Only spawned work can be abandoned; an inline Leader
                    // still owns the key
                    if slot.waiters == 0 && slot.abort.is_some() {
                        slots.remove(&self.key)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        if let Some(slot) = abandoned {
            log::info!("No waiters left for {}, aborting in-flight work", self.key);
            if let Some(abort) = slot.abort {
                abort.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn key() -> CacheKey {
        CacheKey::native("vid-9")
    }

    #[tokio::test]
    async fn test_first_caller_leads_second_follows() {
        let coordinator: RequestCoordinator<u32> = RequestCoordinator::new();

        let leader = match coordinator.acquire_or_join(&key()) {
            Participation::Leader(permit) => permit,
            Participation::Follower(_) => panic!("Expected leader"),
        };
        let follower = match coordinator.acquire_or_join(&key()) {
            Participation::Follower(handle) => handle,
            Participation::Leader(_) => panic!("Expected follower"),
        };

        leader.settle(Ok(7));
        assert_eq!(follower.wait().await, Ok(7));
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_unrelated_keys_do_not_share_leaders() {
        let coordinator: RequestCoordinator<u32> = RequestCoordinator::new();

        let a = coordinator.acquire_or_join(&CacheKey::native("a"));
        let b = coordinator.acquire_or_join(&CacheKey::native("b"));

        assert!(matches!(a, Participation::Leader(_)));
        assert!(matches!(b, Participation::Leader(_)));
        assert_eq!(coordinator.in_flight_count(), 2);
    }

    #[tokio::test]
    async fn test_followers_receive_identical_failure() {
        let coordinator: RequestCoordinator<u32> = RequestCoordinator::new();

        let Participation::Leader(leader) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected leader");
        };
        let followers: Vec<_> = (0..3)
            .map(|_| match coordinator.acquire_or_join(&key()) {
                Participation::Follower(handle) => handle,
                Participation::Leader(_) => panic!("Expected follower"),
            })
            .collect();

        let failure = ResolutionError::ExportFailed("network unreachable".to_string());
        leader.settle(Err(failure.clone()));

        for follower in followers {
            assert_eq!(follower.wait().await, Err(failure.clone()));
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_poison_key() {
        let coordinator: RequestCoordinator<u32> = RequestCoordinator::new();

        let Participation::Leader(leader) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected leader");
        };
        leader.settle(Err(ResolutionError::ExportFailed("timeout".to_string())));

        assert!(matches!(coordinator.acquire_or_join(&key()), Participation::Leader(_)));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_key_and_cancels_followers() {
        let coordinator: RequestCoordinator<u32> = RequestCoordinator::new();

        let Participation::Leader(leader) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected leader");
        };
        let Participation::Follower(follower) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected follower");
        };

        drop(leader);

        assert_eq!(follower.wait().await, Err(ResolutionError::Cancelled));
        assert!(!coordinator.is_in_flight(&key()));
    }

    #[tokio::test]
    async fn test_run_executes_operation_once() {
        let coordinator: Arc<RequestCoordinator<u32>> = Arc::new(RequestCoordinator::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            tasks.push(tokio::spawn(async move {
                coordinator
                    .run(&key(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(42)
                    })
                    .await
            }));
        }

        // Let every caller register before the leader finishes
        while !coordinator.is_in_flight(&key()) {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        gate.notify_one();

        let mut leaders = 0;
        for task in tasks {
            let coordinated = task.await.unwrap();
            assert_eq!(coordinated.outcome, Ok(42));
            if coordinated.role == Role::Leader {
                leaders += 1;
            }
        }

        assert_eq!(leaders, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_leader_cancellation_keeps_work_for_followers() {
        let coordinator: Arc<RequestCoordinator<u32>> = Arc::new(RequestCoordinator::new());
        let gate = Arc::new(Notify::new());

        let leader_gate = Arc::clone(&gate);
        let leader_coordinator = Arc::clone(&coordinator);
        let leader = tokio::spawn(async move {
            leader_coordinator
                .run(&key(), move || async move {
                    leader_gate.notified().await;
                    Ok(5)
                })
                .await
        });

        while !coordinator.is_in_flight(&key()) {
            tokio::task::yield_now().await;
        }

        let Participation::Follower(follower) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected follower");
        };

        // The leader's caller goes away; the follower still gets the result
        leader.abort();
        let _ = leader.await;
        gate.notify_one();

        assert_eq!(follower.wait().await, Ok(5));
    }

    #[tokio::test]
    async fn test_work_aborted_when_no_waiters_remain() {
        let coordinator: Arc<RequestCoordinator<u32>> = Arc::new(RequestCoordinator::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let work_finished = Arc::clone(&finished);
        let caller_coordinator = Arc::clone(&coordinator);
        let caller = tokio::spawn(async move {
            caller_coordinator
                .run(&key(), move || async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    work_finished.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await
        });

        while !coordinator.is_in_flight(&key()) {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        caller.abort();
        let _ = caller.await;

        assert!(!coordinator.is_in_flight(&key()));
        assert_eq!(finished.load(Ordering::SeqCst), 0);

        // The key is free for a fresh leader
        assert!(matches!(coordinator.acquire_or_join(&key()), Participation::Leader(_)));
    }

    #[tokio::test]
    async fn test_follower_cancellation_does_not_affect_leader() {
        let coordinator: RequestCoordinator<u32> = RequestCoordinator::new();

        let Participation::Leader(leader) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected leader");
        };
        let Participation::Follower(quitter) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected follower");
        };
        let Participation::Follower(stayer) = coordinator.acquire_or_join(&key()) else {
            panic!("Expected follower");
        };

        drop(quitter);
        assert!(coordinator.is_in_flight(&key()));

        leader.settle(Ok(3));
        assert_eq!(stayer.wait().await, Ok(3));
    }
}
