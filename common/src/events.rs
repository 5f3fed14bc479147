use serde::Serialize;
use std::sync::{Arc, Mutex};

/// One of the ten events the wallet orchestrator emits (`spec.md` §6).
/// Tagged the way the wider wallet-core's own `Events` enum is tagged, so a
/// subscriber on the other side of a serialization boundary sees
/// `{"event": "balance-update", "data": {...}}`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
#[serde(tag = "event", content = "data")]
pub enum WalletEvent {
    ApiConnect,
    ApiDisconnect,
    SyncStart,
    SyncFinish,
    Ready {
        available: u64,
        pending: u64,
        total: u64,
        confirmed_utxos_count: usize,
    },
    BalanceUpdate {
        confirmed: u64,
        pending: u64,
        total: u64,
    },
    BlueScoreChanged {
        blue_score: u64,
    },
    NewAddress {
        address: String,
        kind: AddressKindTag,
    },
    StateUpdate {
        message: String,
    },
    DebugInfo {
        message: String,
    },
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressKindTag {
    Receive,
    Change,
}

type Listener = Box<dyn Fn(&WalletEvent) + Send + Sync>;

/// A minimal in-process publish-subscribe registry. `spec.md` §9 asks for
/// "a typed publish-subscribe with an enumerated event set and explicit
/// listener handles for unregistration"; listener handles here are plain
/// indices returned by `subscribe`, cleared by `unsubscribe`.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<Vec<Option<Listener>>>,
}

pub struct ListenerHandle(usize);

impl EventEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(&self, listener: Listener) -> ListenerHandle {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.push(Some(listener));
        ListenerHandle(listeners.len() - 1)
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) {
        let mut listeners = self.listeners.lock().unwrap();
        if let Some(slot) = listeners.get_mut(handle.0) {
            *slot = None;
        }
    }

    pub fn emit(&self, event: WalletEvent) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter().flatten() {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emits_to_all_subscribed_listeners() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        emitter.subscribe(Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(WalletEvent::ApiConnect);
        emitter.emit(WalletEvent::SyncStart);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving_events() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let handle = emitter.subscribe(Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));

        emitter.emit(WalletEvent::ApiConnect);
        emitter.unsubscribe(handle);
        emitter.emit(WalletEvent::ApiConnect);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
