use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    serde::Serialize,
    serde_json::Value,
    tokio::sync::oneshot,
    tracing::{debug, info, warn},
};

use crate::decision::{ApprovalDecision, approval_target};

/// What the UI collaborator is told about a new approval request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalNotice {
    pub channel_id: String,
    pub request_id: String,
    pub tool_name: String,
    pub approval_target: String,
    pub input: Value,
}

/// Delivers approval requests to whoever makes the decision.
#[async_trait]
pub trait ApprovalNotifier: Send + Sync {
    async fn post_approval_request(&self, notice: &ApprovalNotice) -> anyhow::Result<()>;
}

/// Per-channel set of tools approved for the rest of the session.
#[async_trait]
pub trait SessionAllowlist: Send + Sync {
    async fn is_tool_allowed(&self, channel_id: &str, tool_name: &str) -> bool;

    async fn allow_tool_for_session(&self, channel_id: &str, tool_name: &str);
}

struct PendingApproval {
    /// Distinguishes this registration from a later one reusing the id.
    seq: u64,
    channel_id: String,
    tool_name: String,
    created_at: Instant,
    tx: oneshot::Sender<ApprovalDecision>,
}

type PendingMap = HashMap<String, PendingApproval>;

/// Removes a registration whose waiter went away before it was resolved.
///
/// Holds the map lock only inside `drop`, never across an await.
struct PendingGuard<'a> {
    pending: &'a Mutex<PendingMap>,
    request_id: &'a str,
    seq: u64,
    armed: bool,
}

impl PendingGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(self.request_id).is_some_and(|p| p.seq == self.seq) {
            pending.remove(self.request_id);
            debug!(request_id = self.request_id, "approval waiter dropped, entry removed");
        }
    }
}

/// Correlates approval request ids with the callers waiting on them.
pub struct ApprovalCoordinator {
    pending: Mutex<PendingMap>,
    next_seq: AtomicU64,
    allowlist: Arc<dyn SessionAllowlist>,
    notifier: Arc<dyn ApprovalNotifier>,
    default_timeout: Duration,
}

impl ApprovalCoordinator {
    pub fn new(
        allowlist: Arc<dyn SessionAllowlist>,
        notifier: Arc<dyn ApprovalNotifier>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            allowlist,
            notifier,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    fn pending(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for a decision and wait for it.
    ///
    /// Tools already allowed for the channel's session return `Allow` without
    /// registering anything. Otherwise the request stays pending until it is
    /// resolved or `timeout` (the coordinator default when `None`) elapses,
    /// which denies. Dropping the returned future withdraws the request.
    pub async fn request_approval(
        &self,
        channel_id: &str,
        tool_name: &str,
        request_id: &str,
        input: Value,
        timeout: Option<Duration>,
    ) -> ApprovalDecision {
        if self.allowlist.is_tool_allowed(channel_id, tool_name).await {
            debug!(channel_id, tool_name, request_id, "tool allowed for session");
            return ApprovalDecision::Allow;
        }

        let (tx, mut rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        {
            let mut pending = self.pending();
            if pending.contains_key(request_id) {
                warn!(request_id, "duplicate approval request id, denying");
                return ApprovalDecision::Deny;
            }
            pending.insert(request_id.to_string(), PendingApproval {
                seq,
                channel_id: channel_id.to_string(),
                tool_name: tool_name.to_string(),
                created_at: Instant::now(),
                tx,
            });
        }
        let mut guard = PendingGuard {
            pending: &self.pending,
            request_id,
            seq,
            armed: true,
        };

        let notice = ApprovalNotice {
            channel_id: channel_id.to_string(),
            request_id: request_id.to_string(),
            tool_name: tool_name.to_string(),
            approval_target: approval_target(tool_name, &input),
            input,
        };
        info!(channel_id, tool_name, request_id, target = %notice.approval_target, "approval requested");
        if let Err(e) = self.notifier.post_approval_request(&notice).await {
            warn!(request_id, error = %e, "failed to post approval request");
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        tokio::select! {
            decision = &mut rx => {
                guard.disarm();
                return decision.unwrap_or(ApprovalDecision::Deny);
            },
            () = tokio::time::sleep(timeout) => {},
        }

        let timed_out = self.pending().remove(request_id).is_some();
        guard.disarm();
        if timed_out {
            warn!(request_id, ?timeout, "approval timed out, denying");
            return ApprovalDecision::Deny;
        }
        // A resolver took the entry just before the deadline.
        rx.await.unwrap_or(ApprovalDecision::Deny)
    }

    /// Deliver a decision. Returns `false` for unknown or already resolved ids.
    pub async fn resolve_approval(&self, request_id: &str, decision: ApprovalDecision) -> bool {
        let removed = self.pending().remove(request_id);
        let Some(entry) = removed else {
            debug!(request_id, "no pending approval for decision");
            return false;
        };
        if decision == ApprovalDecision::AllowSession {
            self.allowlist
                .allow_tool_for_session(&entry.channel_id, &entry.tool_name)
                .await;
        }
        info!(
            request_id,
            channel_id = %entry.channel_id,
            tool_name = %entry.tool_name,
            ?decision,
            waited_ms = entry.created_at.elapsed().as_millis() as u64,
            "approval resolved"
        );
        // The waiter may have given up already; the entry is gone either way.
        let _ = entry.tx.send(decision);
        true
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pending().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn pending_count(&self) -> usize {
        self.pending().len()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        serde_json::json,
        std::{collections::HashSet, sync::atomic::AtomicUsize},
    };

    #[derive(Default)]
    struct MemoryAllowlist {
        allowed: Mutex<HashSet<(String, String)>>,
    }

    #[async_trait]
    impl SessionAllowlist for MemoryAllowlist {
        async fn is_tool_allowed(&self, channel_id: &str, tool_name: &str) -> bool {
            self.allowed
                .lock()
                .unwrap()
                .contains(&(channel_id.to_string(), tool_name.to_string()))
        }

        async fn allow_tool_for_session(&self, channel_id: &str, tool_name: &str) {
            self.allowed
                .lock()
                .unwrap()
                .insert((channel_id.to_string(), tool_name.to_string()));
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        posted: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ApprovalNotifier for CountingNotifier {
        async fn post_approval_request(&self, _notice: &ApprovalNotice) -> anyhow::Result<()> {
            self.posted.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("chat unreachable");
            }
            Ok(())
        }
    }

    fn coordinator(
        notifier: Arc<CountingNotifier>,
    ) -> (Arc<ApprovalCoordinator>, Arc<MemoryAllowlist>) {
        let allowlist = Arc::new(MemoryAllowlist::default());
        let coordinator = Arc::new(ApprovalCoordinator::new(
            Arc::clone(&allowlist) as Arc<dyn SessionAllowlist>,
            notifier,
            Duration::from_secs(5),
        ));
        (coordinator, allowlist)
    }

    async fn wait_until_pending(coordinator: &ApprovalCoordinator, id: &str) {
        for _ in 0..200 {
            if coordinator.pending_ids().await.iter().any(|p| p == id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("request {id} never became pending");
    }

    #[tokio::test]
    async fn allowlisted_tool_short_circuits() {
        let notifier = Arc::new(CountingNotifier::default());
        let (coordinator, allowlist) = coordinator(Arc::clone(&notifier));
        allowlist.allow_tool_for_session("c1", "Bash").await;

        let decision = coordinator
            .request_approval("c1", "Bash", "r1", json!({"command": "ls"}), None)
            .await;
        assert_eq!(decision, ApprovalDecision::Allow);
        assert_eq!(coordinator.pending_count().await, 0);
        assert_eq!(notifier.posted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn timeout_denies_and_late_decision_is_noop() {
        let notifier = Arc::new(CountingNotifier::default());
        let (coordinator, _) = coordinator(Arc::clone(&notifier));

        let decision = coordinator
            .request_approval("c1", "Write", "r1", json!({}), Some(Duration::from_millis(30)))
            .await;
        assert_eq!(decision, ApprovalDecision::Deny);
        assert_eq!(coordinator.pending_count().await, 0);
        assert_eq!(notifier.posted.load(Ordering::SeqCst), 1);
        assert!(
            !coordinator
                .resolve_approval("r1", ApprovalDecision::Allow)
                .await
        );
    }

    #[tokio::test]
    async fn decision_reaches_waiter() {
        let (coordinator, _) = coordinator(Arc::new(CountingNotifier::default()));
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .request_approval("c1", "Bash", "r1", json!({"command": "make"}), None)
                    .await
            })
        };
        wait_until_pending(&coordinator, "r1").await;

        assert!(
            coordinator
                .resolve_approval("r1", ApprovalDecision::Allow)
                .await
        );
        assert_eq!(waiter.await.unwrap(), ApprovalDecision::Allow);
        assert!(
            !coordinator
                .resolve_approval("r1", ApprovalDecision::Deny)
                .await
        );
    }

    #[tokio::test]
    async fn allow_session_extends_allowlist() {
        let notifier = Arc::new(CountingNotifier::default());
        let (coordinator, allowlist) = coordinator(Arc::clone(&notifier));
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .request_approval("c1", "Edit", "r1", json!({"file_path": "a.rs"}), None)
                    .await
            })
        };
        wait_until_pending(&coordinator, "r1").await;
        coordinator
            .resolve_approval("r1", ApprovalDecision::AllowSession)
            .await;
        assert_eq!(waiter.await.unwrap(), ApprovalDecision::AllowSession);
        assert!(allowlist.is_tool_allowed("c1", "Edit").await);
        assert!(!allowlist.is_tool_allowed("c2", "Edit").await);

        let again = coordinator
            .request_approval("c1", "Edit", "r2", json!({}), None)
            .await;
        assert_eq!(again, ApprovalDecision::Allow);
        assert_eq!(notifier.posted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn notifier_failure_still_resolves_by_timeout() {
        let notifier = Arc::new(CountingNotifier {
            fail: true,
            ..CountingNotifier::default()
        });
        let (coordinator, _) = coordinator(notifier);
        let decision = coordinator
            .request_approval("c1", "Bash", "r1", json!({}), Some(Duration::from_millis(20)))
            .await;
        assert_eq!(decision, ApprovalDecision::Deny);
        assert_eq!(coordinator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_requests_on_one_channel() {
        let (coordinator, _) = coordinator(Arc::new(CountingNotifier::default()));
        let spawn = |id: &'static str| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .request_approval("c1", "Bash", id, json!({}), None)
                    .await
            })
        };
        let first = spawn("a");
        let second = spawn("b");
        wait_until_pending(&coordinator, "a").await;
        wait_until_pending(&coordinator, "b").await;

        coordinator.resolve_approval("b", ApprovalDecision::Deny).await;
        coordinator.resolve_approval("a", ApprovalDecision::Allow).await;
        assert_eq!(first.await.unwrap(), ApprovalDecision::Allow);
        assert_eq!(second.await.unwrap(), ApprovalDecision::Deny);
    }

    #[tokio::test]
    async fn duplicate_outstanding_id_is_denied() {
        let (coordinator, _) = coordinator(Arc::new(CountingNotifier::default()));
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .request_approval("c1", "Bash", "dup", json!({}), None)
                    .await
            })
        };
        wait_until_pending(&coordinator, "dup").await;

        let second = coordinator
            .request_approval("c1", "Bash", "dup", json!({}), None)
            .await;
        assert_eq!(second, ApprovalDecision::Deny);
        assert_eq!(coordinator.pending_count().await, 1);

        coordinator.resolve_approval("dup", ApprovalDecision::Allow).await;
        assert_eq!(waiter.await.unwrap(), ApprovalDecision::Allow);
    }

    #[tokio::test]
    async fn abandoned_waiter_withdraws_request() {
        let (coordinator, _) = coordinator(Arc::new(CountingNotifier::default()));
        let waiter = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .request_approval("c1", "Bash", "r1", json!({}), Some(Duration::from_millis(30)))
                    .await
            })
        };
        wait_until_pending(&coordinator, "r1").await;
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(coordinator.pending_count().await, 0);
        assert!(
            !coordinator
                .resolve_approval("r1", ApprovalDecision::Allow)
                .await
        );
    }

    #[tokio::test]
    async fn abandoned_waiter_leaves_reused_id_alone() {
        let (coordinator, _) = coordinator(Arc::new(CountingNotifier::default()));
        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .request_approval("c1", "Bash", "r1", json!({}), None)
                    .await
            })
        };
        wait_until_pending(&coordinator, "r1").await;
        coordinator.resolve_approval("r1", ApprovalDecision::Deny).await;
        assert_eq!(first.await.unwrap(), ApprovalDecision::Deny);

        let second = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .request_approval("c1", "Bash", "r1", json!({}), None)
                    .await
            })
        };
        wait_until_pending(&coordinator, "r1").await;
        assert_eq!(coordinator.pending_count().await, 1);
        coordinator.resolve_approval("r1", ApprovalDecision::Allow).await;
        assert_eq!(second.await.unwrap(), ApprovalDecision::Allow);
    }
}
