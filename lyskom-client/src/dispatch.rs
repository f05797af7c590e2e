//! Async message subscriptions.

use lyskom_protocol::{AsyncKind, AsyncMessage};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receives async messages on the dispatcher task.
///
/// Handlers run one message at a time in receive order and must not block.
pub trait AsyncHandler: Send + Sync {
    fn handle(&self, msg: &AsyncMessage);
}

impl<F> AsyncHandler for F
where
    F: Fn(&AsyncMessage) + Send + Sync,
{
    fn handle(&self, msg: &AsyncMessage) {
        self(msg)
    }
}

/// Handlers keyed by async message kind.
///
/// Several handlers may subscribe to one kind; they are invoked in
/// registration order.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<AsyncKind, Vec<Arc<dyn AsyncHandler>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`register`](Self::register).
    pub fn on<H>(mut self, kind: AsyncKind, handler: H) -> Self
    where
        H: AsyncHandler + 'static,
    {
        self.register(kind, Arc::new(handler));
        self
    }

    pub fn register(&mut self, kind: AsyncKind, handler: Arc<dyn AsyncHandler>) {
        self.handlers.entry(kind).or_default().push(handler);
    }

    /// Kinds with at least one handler.
    pub fn kinds(&self) -> BTreeSet<AsyncKind> {
        self.handlers.keys().copied().collect()
    }

    /// Invokes every handler subscribed to the message's kind. Returns the
    /// number of handlers run.
    pub fn dispatch(&self, msg: &AsyncMessage) -> usize {
        match self.handlers.get(&msg.kind()) {
            Some(handlers) => {
                for handler in handlers {
                    handler.handle(msg);
                }
                handlers.len()
            }
            None => 0,
        }
    }
}

/// Drains the push queue until every sender is gone.
pub(crate) async fn dispatch_loop(
    mut queue: mpsc::UnboundedReceiver<AsyncMessage>,
    handlers: Arc<HandlerTable>,
) {
    tracing::debug!("dispatch_loop started");
    while let Some(msg) = queue.recv().await {
        let kind = msg.kind();
        let handled = handlers.dispatch(&msg);
        if handled == 0 {
            tracing::trace!("No handler for async message {}", kind);
        } else {
            tracing::trace!("Dispatched {} to {} handlers", kind, handled);
        }
    }
    tracing::debug!("dispatch_loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = log.clone();
        let second = log.clone();
        let table = HandlerTable::new()
            .on(AsyncKind::LeaveConf, move |_: &AsyncMessage| {
                first.lock().push("first")
            })
            .on(AsyncKind::LeaveConf, move |_: &AsyncMessage| {
                second.lock().push("second")
            });

        let handled = table.dispatch(&AsyncMessage::LeaveConf { conf_no: 7 });
        assert_eq!(handled, 2);
        assert_eq!(*log.lock(), vec!["first", "second"]);

        assert_eq!(table.dispatch(&AsyncMessage::SyncDb), 0);
        assert_eq!(
            table.kinds().into_iter().collect::<Vec<_>>(),
            vec![AsyncKind::LeaveConf]
        );
    }

    #[tokio::test]
    async fn test_dispatch_loop_preserves_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let table = Arc::new(HandlerTable::new().on(
            AsyncKind::Logout,
            move |msg: &AsyncMessage| {
                if let AsyncMessage::Logout { person, .. } = msg {
                    sink.lock().push(*person);
                }
            },
        ));

        let (tx, rx) = mpsc::unbounded_channel();
        for person in 1..=20 {
            tx.send(AsyncMessage::Logout { person, session: 1 }).unwrap();
        }
        drop(tx);

        dispatch_loop(rx, table).await;
        assert_eq!(*seen.lock(), (1..=20).collect::<Vec<u32>>());
    }
}
