use chrono::{FixedOffset, Utc};
use teloxide::types::{ChatId, MessageId};
use tracing::{debug, info, warn};

use crate::platform::MessagingSink;
use crate::rates::RateSnapshot;
use crate::render;

/// What woke the reconciler up.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// The periodic update timer fired.
    Tick,
    /// Some message appeared in the watched channel.
    ForeignPost { text: String },
}

/// Keeps exactly one rate message current in the channel, positioned last.
///
/// The tracked message id is the only mutable state: present means "a rate
/// message exists and we believe it is the most recent one", absent means
/// "none known, send fresh next cycle". It is owned here and nowhere else;
/// callers must serialize `reconcile` invocations (see `AppState`), since
/// the id is read and written across network await points.
pub struct Reconciler<S> {
    sink: S,
    chat: ChatId,
    utc_offset: FixedOffset,
    tracked: Option<MessageId>,
}

impl<S: MessagingSink> Reconciler<S> {
    pub fn new(sink: S, chat: ChatId, utc_offset: FixedOffset) -> Self {
        Self {
            sink,
            chat,
            utc_offset,
            tracked: None,
        }
    }

    /// Run one reconcile cycle: edit in place when possible, send fresh when
    /// not, delete-then-send when a foreign post took the bottom position.
    /// Never fails; every error degrades to "forget state, retry next tick".
    pub async fn reconcile(&mut self, trigger: Trigger, snapshot: Option<&RateSnapshot>) {
        let Some(snapshot) = snapshot else {
            debug!("No snapshot this cycle, nothing to reconcile");
            return;
        };

        let force_repost = match &trigger {
            Trigger::Tick => false,
            Trigger::ForeignPost { text } => {
                if text.contains(render::SIGNATURE) {
                    // Our own send/edit echoed back through the channel feed
                    debug!("Observed our own rate message, ignoring");
                    return;
                }
                true
            }
        };

        let text = render::render(snapshot, Utc::now().with_timezone(&self.utc_offset));

        if force_repost {
            if let Some(id) = self.tracked.take() {
                info!("Foreign post observed, moving rate message to the bottom");
                // Best effort: the message may already be gone
                if let Err(e) = self.sink.delete(self.chat, id).await {
                    debug!("Delete of message {} failed (ignored): {:#}", id.0, e);
                }
            }
        }

        if let Some(id) = self.tracked {
            match self.sink.edit(self.chat, id, &text).await {
                Ok(()) => {
                    debug!("Edited rate message {}", id.0);
                    return;
                }
                Err(e) => {
                    // Assume the message is gone or no longer editable;
                    // one fallback send, no further retries this cycle
                    warn!("Edit of message {} failed, sending fresh: {:#}", id.0, e);
                    self.tracked = None;
                }
            }
        }

        match self.sink.send(self.chat, &text).await {
            Ok(id) => {
                info!("Sent fresh rate message {}", id.0);
                self.tracked = Some(id);
            }
            Err(e) => {
                warn!("Send failed, will retry next tick: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;

    use crate::rates::{CoinQuote, RateSnapshot};

    const CHAT: ChatId = ChatId(-100);

    /// Records every sink call in order; failure modes are set per test.
    #[derive(Clone, Default)]
    struct FakeSink {
        calls: Arc<StdMutex<Vec<String>>>,
        next_id: Arc<AtomicI32>,
        fail_send: bool,
        fail_edit: bool,
        fail_delete: bool,
        delay: Option<Duration>,
    }

    impl FakeSink {
        fn new() -> Self {
            Self {
                next_id: Arc::new(AtomicI32::new(101)),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        async fn pause(&self) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl MessagingSink for FakeSink {
        async fn send(&self, _chat: ChatId, _text: &str) -> Result<MessageId> {
            self.pause().await;
            self.calls.lock().unwrap().push("send".to_string());
            if self.fail_send {
                anyhow::bail!("send refused");
            }
            Ok(MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        async fn edit(&self, _chat: ChatId, id: MessageId, _text: &str) -> Result<()> {
            self.pause().await;
            self.calls.lock().unwrap().push(format!("edit:{}", id.0));
            if self.fail_edit {
                anyhow::bail!("message not found");
            }
            Ok(())
        }

        async fn delete(&self, _chat: ChatId, id: MessageId) -> Result<()> {
            self.pause().await;
            self.calls.lock().unwrap().push(format!("delete:{}", id.0));
            if self.fail_delete {
                anyhow::bail!("message already gone");
            }
            Ok(())
        }
    }

    fn snapshot() -> RateSnapshot {
        RateSnapshot {
            bitcoin: Some(CoinQuote {
                price: 65000.0,
                change_24h: Some(0.5),
            }),
            ethereum: None,
            tether: None,
            usd_uah: Some(41.0),
            usd_rub: None,
            usd_kzt: None,
            usd_eur: Some(0.92),
            fetched_at: Utc::now(),
        }
    }

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn reconciler(sink: FakeSink) -> Reconciler<FakeSink> {
        Reconciler::new(sink, CHAT, offset())
    }

    #[tokio::test]
    async fn test_tick_sends_fresh_when_nothing_tracked() {
        let sink = FakeSink::new();
        let mut rec = reconciler(sink.clone());

        rec.reconcile(Trigger::Tick, Some(&snapshot())).await;

        assert_eq!(sink.calls(), vec!["send"]);
        assert_eq!(rec.tracked, Some(MessageId(101)));
    }

    #[tokio::test]
    async fn test_tick_edits_in_place_when_tracked() {
        let sink = FakeSink::new();
        let mut rec = reconciler(sink.clone());
        let snap = snapshot();

        rec.reconcile(Trigger::Tick, Some(&snap)).await;
        rec.reconcile(Trigger::Tick, Some(&snap)).await;

        assert_eq!(sink.calls(), vec!["send", "edit:101"]);
        assert_eq!(rec.tracked, Some(MessageId(101)));
    }

    #[tokio::test]
    async fn test_edit_failure_falls_back_to_send_same_cycle() {
        let sink = FakeSink {
            fail_edit: true,
            ..FakeSink::new()
        };
        let mut rec = reconciler(sink.clone());
        rec.tracked = Some(MessageId(7));

        rec.reconcile(Trigger::Tick, Some(&snapshot())).await;

        assert_eq!(sink.calls(), vec!["edit:7", "send"]);
        assert_eq!(rec.tracked, Some(MessageId(101)));
    }

    #[tokio::test]
    async fn test_edit_and_send_both_failing_clears_state() {
        let sink = FakeSink {
            fail_edit: true,
            fail_send: true,
            ..FakeSink::new()
        };
        let mut rec = reconciler(sink.clone());
        rec.tracked = Some(MessageId(7));

        rec.reconcile(Trigger::Tick, Some(&snapshot())).await;

        assert_eq!(sink.calls(), vec!["edit:7", "send"]);
        assert_eq!(rec.tracked, None);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_nothing_tracked() {
        let sink = FakeSink {
            fail_send: true,
            ..FakeSink::new()
        };
        let mut rec = reconciler(sink.clone());

        rec.reconcile(Trigger::Tick, Some(&snapshot())).await;

        assert_eq!(sink.calls(), vec!["send"]);
        assert_eq!(rec.tracked, None);
    }

    #[tokio::test]
    async fn test_foreign_post_forces_delete_then_send() {
        let sink = FakeSink::new();
        let mut rec = reconciler(sink.clone());
        rec.tracked = Some(MessageId(7));

        rec.reconcile(
            Trigger::ForeignPost {
                text: "admin announcement".to_string(),
            },
            Some(&snapshot()),
        )
        .await;

        assert_eq!(sink.calls(), vec!["delete:7", "send"]);
        assert_eq!(rec.tracked, Some(MessageId(101)));
    }

    #[tokio::test]
    async fn test_foreign_post_resends_even_when_delete_fails() {
        let sink = FakeSink {
            fail_delete: true,
            ..FakeSink::new()
        };
        let mut rec = reconciler(sink.clone());
        rec.tracked = Some(MessageId(7));

        rec.reconcile(
            Trigger::ForeignPost {
                text: "admin announcement".to_string(),
            },
            Some(&snapshot()),
        )
        .await;

        assert_eq!(sink.calls(), vec!["delete:7", "send"]);
        assert_eq!(rec.tracked, Some(MessageId(101)));
    }

    #[tokio::test]
    async fn test_foreign_post_without_tracked_just_sends() {
        let sink = FakeSink::new();
        let mut rec = reconciler(sink.clone());

        rec.reconcile(
            Trigger::ForeignPost {
                text: "hello".to_string(),
            },
            Some(&snapshot()),
        )
        .await;

        assert_eq!(sink.calls(), vec!["send"]);
        assert_eq!(rec.tracked, Some(MessageId(101)));
    }

    #[tokio::test]
    async fn test_own_post_is_ignored_entirely() {
        let sink = FakeSink::new();
        let mut rec = reconciler(sink.clone());
        rec.tracked = Some(MessageId(7));

        rec.reconcile(
            Trigger::ForeignPost {
                text: format!("{} BTC: $65,000.00", render::SIGNATURE),
            },
            Some(&snapshot()),
        )
        .await;

        assert!(sink.calls().is_empty());
        assert_eq!(rec.tracked, Some(MessageId(7)));
    }

    #[tokio::test]
    async fn test_absent_snapshot_is_a_noop() {
        let sink = FakeSink::new();
        let mut rec = reconciler(sink.clone());
        rec.tracked = Some(MessageId(7));

        rec.reconcile(Trigger::Tick, None).await;

        assert!(sink.calls().is_empty());
        assert_eq!(rec.tracked, Some(MessageId(7)));
    }

    #[tokio::test]
    async fn test_back_to_back_cycles_do_not_interleave() {
        let sink = FakeSink {
            delay: Some(Duration::from_millis(50)),
            ..FakeSink::new()
        };
        let rec = Arc::new(tokio::sync::Mutex::new(reconciler(sink.clone())));

        // Tick first; the foreign post queues behind it on the mutex. If the
        // second cycle could interleave it would run before the first send
        // commits the tracked id and the log would show two bare sends.
        let first = rec.clone();
        let tick = tokio::spawn(async move {
            let snap = snapshot();
            first.lock().await.reconcile(Trigger::Tick, Some(&snap)).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = rec.clone();
        let foreign = tokio::spawn(async move {
            let snap = snapshot();
            second
                .lock()
                .await
                .reconcile(
                    Trigger::ForeignPost {
                        text: "admin post".to_string(),
                    },
                    Some(&snap),
                )
                .await;
        });

        tick.await.unwrap();
        foreign.await.unwrap();

        assert_eq!(sink.calls(), vec!["send", "delete:101", "send"]);
        assert_eq!(rec.lock().await.tracked, Some(MessageId(102)));
    }
}
