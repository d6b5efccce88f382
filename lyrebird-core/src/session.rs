//! Shared close handle for live sessions

use std::sync::Arc;

use tokio::sync::watch;

/// Close signal shared between a session's tasks, its event stream, and the
/// engine facade.
///
/// Closing is idempotent and purely a flag flip, so it is safe to call from
/// the session's own completion path, from [`crate::events::SynthesisStream`]
/// drop, or from the facade's bulk shutdown — in any order, any number of
/// times. Tasks select on [`closed`](Self::closed) and drop their transport
/// half when it resolves.
#[derive(Debug)]
pub struct SessionHandle {
    closed: watch::Sender<bool>,
}

impl SessionHandle {
    pub(crate) fn new() -> Arc<Self> {
        let (closed, _) = watch::channel(false);
        Arc::new(Self { closed })
    }

    /// Tear down the session. Safe to call after completion or failure.
    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the session has been closed. Resolves immediately if it
    /// already was.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // wait_for checks the current value first, so a close that happened
        // before this call is not missed
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
