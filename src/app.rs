use teloxide::types::ChatId;
use tokio::sync::Mutex;

use crate::platform::telegram::TelegramSink;
use crate::rates::RateFetcher;
use crate::reconciler::{Reconciler, Trigger};

/// Shared application state. The reconciler sits behind a mutex because its
/// tracked-message id is read and written across network await points: the
/// timer path and the channel-post path must never run a cycle interleaved.
pub struct AppState {
    fetcher: RateFetcher,
    channel: ChatId,
    reconciler: Mutex<Reconciler<TelegramSink>>,
}

impl AppState {
    pub fn new(fetcher: RateFetcher, channel: ChatId, reconciler: Reconciler<TelegramSink>) -> Self {
        Self {
            fetcher,
            channel,
            reconciler: Mutex::new(reconciler),
        }
    }

    pub fn channel(&self) -> ChatId {
        self.channel
    }

    /// One full update cycle. The fetch runs outside the lock; only the
    /// reconcile holds it, so a trigger that arrives mid-cycle waits its
    /// turn instead of racing the tracked-message state.
    pub async fn run_cycle(&self, trigger: Trigger) {
        let snapshot = self.fetcher.fetch().await;
        let mut reconciler = self.reconciler.lock().await;
        reconciler.reconcile(trigger, snapshot.as_ref()).await;
    }
}
