use crate::user::{UserMode, VirtualUser};
use stampede_core::ExecutionError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct Members {
    live: BTreeMap<u64, Arc<VirtualUser>>,
    /// Removed users whose task has not exited yet. Still reachable by `abort_all`.
    draining: BTreeMap<u64, Arc<VirtualUser>>,
    /// Set by `abort_all`; users registering afterwards are aborted on arrival.
    aborted: bool,
}

/// Users whose task is currently executing, keyed by id.
///
/// Ids come from a monotonically increasing counter, so map order is creation order. Only
/// `live` users count towards [`UserPool::len`].
pub(crate) struct UserPool {
    users: Mutex<Members>,
    live: watch::Sender<usize>,
    next_id: AtomicU64,
    peak: AtomicUsize,
    #[cfg(feature = "metrics")]
    gauge_label: String,
}

impl UserPool {
    pub fn new(behavior: &str) -> Self {
        #[cfg(not(feature = "metrics"))]
        let _ = behavior;

        let (live, _) = watch::channel(0);
        Self {
            users: Mutex::new(Members::default()),
            live,
            next_id: AtomicU64::new(0),
            peak: AtomicUsize::new(0),
            #[cfg(feature = "metrics")]
            gauge_label: format!("stampede_{behavior}_live_users"),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(self: &Arc<Self>, user: Arc<VirtualUser>) -> Result<Registration, ExecutionError> {
        let id = user.id();
        {
            let mut users = self.users.lock()?;
            if users.aborted {
                debug!("User {id} started after the pool was aborted");
                user.abort_execution();
            }
            users.live.insert(id, user);
            self.publish(users.live.len());
        }
        trace!("Registered user {id}");

        Ok(Registration {
            pool: self.clone(),
            id,
        })
    }

    fn deregister(&self, id: u64) {
        // NOTE: Runs from a drop guard, so a poisoned lock is recovered rather than reported.
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        if users.live.remove(&id).is_some() {
            self.publish(users.live.len());
            trace!("Deregistered user {id}");
        } else if users.draining.remove(&id).is_some() {
            trace!("Removed user {id} exited");
        }
    }

    /// Remove up to `amount` of the oldest live users in `mode` from the pool and return them.
    ///
    /// Taken users stop counting as live right away but stay abortable until their task exits.
    pub fn take(&self, amount: usize, mode: UserMode) -> Result<Vec<Arc<VirtualUser>>, ExecutionError> {
        let mut guard = self.users.lock()?;
        let users = &mut *guard;

        let ids: Vec<u64> = users
            .live
            .values()
            .filter(|user| user.mode() == mode)
            .take(amount)
            .map(|user| user.id())
            .collect();

        let mut taken = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = users.live.remove(&id) {
                users.draining.insert(id, user.clone());
                taken.push(user);
            }
        }
        self.publish(users.live.len());

        Ok(taken)
    }

    /// Force-interrupt every user whose task is still running, removed or not, and every user
    /// registering from now on. Users leave the pool as their tasks unwind.
    pub fn abort_all(&self) -> Result<usize, ExecutionError> {
        let mut users = self.users.lock()?;
        users.aborted = true;

        let mut aborted = 0;
        for user in users.live.values().chain(users.draining.values()) {
            user.abort_execution();
            aborted += 1;
        }
        Ok(aborted)
    }

    /// Users removed from the pool whose task is still running.
    pub fn draining(&self) -> usize {
        self.users
            .lock()
            .map(|users| users.draining.len())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        *self.live.borrow()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Resolves once no user is registered. Never times out.
    pub async fn wait_until_empty(&self) {
        let mut rx = self.live.subscribe();
        // NOTE: The sender is owned by `self`, so the channel can not close while waiting.
        let _ = rx.wait_for(|live| *live == 0).await;
    }

    // Must be called with the users lock held so updates are published in order.
    fn publish(&self, live: usize) {
        self.live.send_replace(live);
        self.peak.fetch_max(live, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::gauge!(self.gauge_label.clone()).set(live as f64);
    }
}

/// Keeps a user in the pool for as long as it is alive.
pub(crate) struct Registration {
    pool: Arc<UserPool>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.pool.deregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_user(pool: &UserPool, mode: UserMode) -> (Arc<VirtualUser>, tokio::task::JoinHandle<()>) {
        let handle = tokio::spawn(std::future::pending::<()>());
        let user = Arc::new(VirtualUser::new(pool.next_id(), mode, handle.abort_handle()));
        (user, handle)
    }

    #[tokio::test]
    async fn take_is_oldest_first_and_clamped() {
        let pool = Arc::new(UserPool::new("pool"));
        let mut registrations = vec![];
        let mut ids = vec![];

        for mode in [
            UserMode::Looped,
            UserMode::Cycled,
            UserMode::Looped,
            UserMode::Looped,
        ] {
            let (user, _handle) = idle_user(&pool, mode);
            ids.push(user.id());
            registrations.push(pool.register(user).unwrap());
        }
        assert_eq!(pool.len(), 4);

        let taken: Vec<u64> = pool
            .take(2, UserMode::Looped)
            .unwrap()
            .iter()
            .map(|user| user.id())
            .collect();
        assert_eq!(taken, vec![ids[0], ids[2]]);
        assert_eq!(pool.len(), 2);

        let rest = pool.take(10, UserMode::Looped).unwrap();
        assert_eq!(rest.len(), 1);
        assert!(pool.take(1, UserMode::Regular).unwrap().is_empty());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.peak(), 4);

        assert_eq!(pool.draining(), 3);

        drop(registrations);
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.draining(), 0);
    }

    #[tokio::test]
    #[ntest::timeout(1_000)]
    async fn wait_until_empty_follows_deregistration() {
        let pool = Arc::new(UserPool::new("pool"));
        let (user, _handle) = idle_user(&pool, UserMode::Regular);
        let registration = pool.register(user).unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.wait_until_empty().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(registration);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn abort_all_interrupts_every_user() {
        let pool = Arc::new(UserPool::new("pool"));
        let (first, first_handle) = idle_user(&pool, UserMode::Looped);
        let (second, second_handle) = idle_user(&pool, UserMode::Regular);
        let _first = pool.register(first.clone()).unwrap();
        let _second = pool.register(second.clone()).unwrap();

        assert_eq!(pool.abort_all().unwrap(), 2);
        assert!(!first.is_active());
        assert!(!second.is_active());
        assert!(first_handle.await.unwrap_err().is_cancelled());
        assert!(second_handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn abort_all_reaches_removed_users() {
        let pool = Arc::new(UserPool::new("pool"));
        let (user, handle) = idle_user(&pool, UserMode::Looped);
        let _registration = pool.register(user.clone()).unwrap();

        let taken = pool.take(1, UserMode::Looped).unwrap();
        assert_eq!(taken.len(), 1);
        assert_eq!(pool.len(), 0);

        assert_eq!(pool.abort_all().unwrap(), 1);
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn users_registering_after_abort_are_aborted() {
        let pool = Arc::new(UserPool::new("pool"));
        assert_eq!(pool.abort_all().unwrap(), 0);

        let (user, handle) = idle_user(&pool, UserMode::Looped);
        let _registration = pool.register(user.clone()).unwrap();

        assert!(!user.is_active());
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
