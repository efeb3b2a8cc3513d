//! Correlated reply routing
//!
//! Each session claims its (conversation, sender) key when it starts; the
//! newest claim wins. While waiting, the owner arms a one-shot slot on the
//! key. Incoming messages are delivered only to the slot armed for their
//! exact key, so concurrent sessions never consume each other's replies.

use crate::channel::{ConversationId, IncomingReply, SenderId};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Key a pending reply is correlated by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyKey {
    /// Conversation the reply must arrive in
    pub conversation: ConversationId,
    /// User the reply must come from
    pub sender: SenderId,
}

impl ReplyKey {
    /// Key matching `reply`.
    #[must_use]
    pub const fn of(reply: &IncomingReply) -> Self {
        Self {
            conversation: reply.conversation,
            sender: reply.sender,
        }
    }
}

/// Why a wait ended without a reply
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplyWaitError {
    /// No reply arrived before the timeout
    #[error("reply wait expired")]
    Expired,
    /// A newer session armed the same key
    #[error("reply wait superseded by a newer session")]
    Superseded,
}

struct Waiter {
    session_id: Uuid,
    tx: oneshot::Sender<IncomingReply>,
}

/// An armed, not yet resolved, reply slot.
#[derive(Debug)]
pub struct PendingReply {
    key: ReplyKey,
    session_id: Uuid,
    rx: oneshot::Receiver<IncomingReply>,
}

impl PendingReply {
    /// Key this slot listens on.
    #[must_use]
    pub const fn key(&self) -> ReplyKey {
        self.key
    }

    /// Session that armed this slot.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }
}

#[derive(Default)]
struct Slots {
    /// Newest session entitled to each key
    claims: HashMap<ReplyKey, Uuid>,
    waiters: HashMap<ReplyKey, Waiter>,
}

/// Registry of one-shot reply slots.
#[derive(Default)]
pub struct ReplyRouter {
    slots: Mutex<Slots>,
}

impl ReplyRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `session_id` the owner of `key`.
    ///
    /// Any slot armed by an older owner is dropped, which resolves its wait
    /// with [`ReplyWaitError::Superseded`]. Older owners can no longer arm
    /// slots on this key.
    pub async fn claim(&self, key: ReplyKey, session_id: Uuid) {
        let (previous, dropped) = {
            let mut slots = self.slots.lock().await;
            let previous = slots.claims.insert(key, session_id);
            let dropped = if slots
                .waiters
                .get(&key)
                .is_some_and(|w| w.session_id != session_id)
            {
                slots.waiters.remove(&key)
            } else {
                None
            };
            (previous, dropped)
        };

        if let Some(previous) = previous.filter(|p| *p != session_id) {
            info!(
                old_session = %previous,
                new_session = %session_id,
                armed = dropped.is_some(),
                "Pending session superseded"
            );
        }
    }

    /// Arm a one-shot slot for `key` on behalf of `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyWaitError::Superseded`] if another session claimed the
    /// key; the newer session's slot is left untouched.
    pub async fn register(
        &self,
        key: ReplyKey,
        session_id: Uuid,
    ) -> Result<PendingReply, ReplyWaitError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.slots.lock().await;
            let owner = *slots.claims.entry(key).or_insert(session_id);
            if owner != session_id {
                debug!(session = %session_id, owner = %owner, "Claim overtaken, not arming");
                return Err(ReplyWaitError::Superseded);
            }
            slots.waiters.insert(key, Waiter { session_id, tx });
        }

        Ok(PendingReply {
            key,
            session_id,
            rx,
        })
    }

    /// Deliver `reply` to the slot armed for its key.
    ///
    /// Returns `true` if a waiting session consumed the reply. The slot is
    /// removed either way, so a second reply is never delivered to it.
    pub async fn dispatch(&self, reply: IncomingReply) -> bool {
        let key = ReplyKey::of(&reply);
        let waiter = {
            let mut slots = self.slots.lock().await;
            slots.waiters.remove(&key)
        };

        let Some(waiter) = waiter else {
            debug!(?key, "No pending reply for message");
            return false;
        };

        match waiter.tx.send(reply) {
            Ok(()) => {
                debug!(session = %waiter.session_id, "Reply delivered");
                true
            }
            Err(_) => {
                debug!(session = %waiter.session_id, "Waiting session is gone");
                false
            }
        }
    }

    /// Wait for the reply to `pending`, giving up after `timeout`.
    ///
    /// On expiry the slot and the claim are released so the session state
    /// can be dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyWaitError::Expired`] on timeout and
    /// [`ReplyWaitError::Superseded`] if a newer session took the key.
    pub async fn wait(
        &self,
        pending: PendingReply,
        timeout: Duration,
    ) -> Result<IncomingReply, ReplyWaitError> {
        let PendingReply {
            key,
            session_id,
            rx,
        } = pending;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ReplyWaitError::Superseded),
            Err(_) => {
                self.release(key, session_id).await;
                Err(ReplyWaitError::Expired)
            }
        }
    }

    /// Drop the claim and slot for `key` if they still belong to
    /// `session_id`.
    ///
    /// Returns `true` if anything was removed.
    pub async fn release(&self, key: ReplyKey, session_id: Uuid) -> bool {
        let mut slots = self.slots.lock().await;
        let mut removed = false;
        if slots.claims.get(&key) == Some(&session_id) {
            slots.claims.remove(&key);
            removed = true;
        }
        if slots
            .waiters
            .get(&key)
            .is_some_and(|w| w.session_id == session_id)
        {
            slots.waiters.remove(&key);
            removed = true;
        }
        removed
    }

    /// Whether a slot is armed for `key`.
    pub async fn is_waiting(&self, key: ReplyKey) -> bool {
        let slots = self.slots.lock().await;
        slots.waiters.contains_key(&key)
    }

    /// Session currently owning `key`, if any.
    pub async fn owner(&self, key: ReplyKey) -> Option<Uuid> {
        let slots = self.slots.lock().await;
        slots.claims.get(&key).copied()
    }

    /// Number of armed slots.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.waiters.len()
    }

    /// Check if no slot is armed and no key is claimed.
    pub async fn is_empty(&self) -> bool {
        let slots = self.slots.lock().await;
        slots.waiters.is_empty() && slots.claims.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MessageRef;

    fn key(chat: i64, user: i64) -> ReplyKey {
        ReplyKey {
            conversation: ConversationId(chat),
            sender: SenderId(user),
        }
    }

    fn reply(chat: i64, user: i64, text: &str) -> IncomingReply {
        IncomingReply {
            conversation: ConversationId(chat),
            sender: SenderId(user),
            text: Some(text.to_string()),
            message: MessageRef {
                conversation: ConversationId(chat),
                message_id: 7,
            },
        }
    }

    async fn arm(router: &ReplyRouter, key: ReplyKey, session_id: Uuid) -> PendingReply {
        router
            .register(key, session_id)
            .await
            .expect("session owns the key")
    }

    #[tokio::test]
    async fn test_reply_reaches_matching_waiter() {
        let router = ReplyRouter::new();
        let id = Uuid::new_v4();
        let pending = arm(&router, key(1, 10), id).await;

        assert!(router.dispatch(reply(1, 10, "2")).await);
        let got = router
            .wait(pending, Duration::from_secs(1))
            .await
            .expect("reply was dispatched");
        assert_eq!(got.text.as_deref(), Some("2"));
        assert_eq!(router.len().await, 0);

        assert!(router.release(key(1, 10), id).await);
        assert!(router.is_empty().await);
    }

    #[tokio::test]
    async fn test_other_sender_or_chat_is_not_consumed() {
        let router = ReplyRouter::new();
        let _pending = arm(&router, key(1, 10), Uuid::new_v4()).await;

        assert!(!router.dispatch(reply(1, 11, "1")).await);
        assert!(!router.dispatch(reply(2, 10, "1")).await);
        assert!(router.is_waiting(key(1, 10)).await);
    }

    #[tokio::test]
    async fn test_slot_is_one_shot() {
        let router = ReplyRouter::new();
        let _pending = arm(&router, key(1, 10), Uuid::new_v4()).await;

        assert!(router.dispatch(reply(1, 10, "1")).await);
        assert!(!router.dispatch(reply(1, 10, "2")).await);
    }

    #[tokio::test]
    async fn test_wait_expires_and_releases_slot() {
        let router = ReplyRouter::new();
        let pending = arm(&router, key(1, 10), Uuid::new_v4()).await;

        let err = router
            .wait(pending, Duration::from_millis(20))
            .await
            .expect_err("nobody replies");
        assert_eq!(err, ReplyWaitError::Expired);
        assert!(!router.is_waiting(key(1, 10)).await);
        assert!(router.is_empty().await);
    }

    #[tokio::test]
    async fn test_newer_claim_drops_armed_slot() {
        let router = ReplyRouter::new();
        let old_id = Uuid::new_v4();
        router.claim(key(1, 10), old_id).await;
        let old = arm(&router, key(1, 10), old_id).await;

        let new_id = Uuid::new_v4();
        router.claim(key(1, 10), new_id).await;
        let err = router
            .wait(old, Duration::from_secs(1))
            .await
            .expect_err("old slot was dropped");
        assert_eq!(err, ReplyWaitError::Superseded);

        let new = arm(&router, key(1, 10), new_id).await;
        assert!(router.dispatch(reply(1, 10, "3")).await);
        let got = router
            .wait(new, Duration::from_secs(1))
            .await
            .expect("new slot receives the reply");
        assert_eq!(got.text.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_overtaken_session_cannot_arm() {
        let router = ReplyRouter::new();
        let old_id = Uuid::new_v4();
        let new_id = Uuid::new_v4();
        router.claim(key(1, 10), old_id).await;
        router.claim(key(1, 10), new_id).await;
        let _new = arm(&router, key(1, 10), new_id).await;

        // The older session comes back from a slow step and tries to wait again
        let err = router
            .register(key(1, 10), old_id)
            .await
            .expect_err("older session lost the key");
        assert_eq!(err, ReplyWaitError::Superseded);
        assert!(router.is_waiting(key(1, 10)).await);
        assert_eq!(router.owner(key(1, 10)).await, Some(new_id));
    }

    #[tokio::test]
    async fn test_release_only_removes_own_claim_and_slot() {
        let router = ReplyRouter::new();
        let old_id = Uuid::new_v4();
        let new_id = Uuid::new_v4();
        router.claim(key(1, 10), old_id).await;
        router.claim(key(1, 10), new_id).await;
        let _new = arm(&router, key(1, 10), new_id).await;

        assert!(!router.release(key(1, 10), old_id).await);
        assert!(router.is_waiting(key(1, 10)).await);
        assert!(router.release(key(1, 10), new_id).await);
        assert!(router.is_empty().await);
    }

    #[tokio::test]
    async fn test_dispatch_to_dropped_session_reports_unconsumed() {
        let router = ReplyRouter::new();
        let pending = arm(&router, key(1, 10), Uuid::new_v4()).await;
        drop(pending);

        assert!(!router.dispatch(reply(1, 10, "1")).await);
        assert_eq!(router.len().await, 0);
    }
}
