//! Completion signals.
//!
//! A [`Signal`] fans one event out to any number of subscribers. A subscriber
//! is either a `crossbeam` channel ([`Signal::subscribe`]) or a callback
//! ([`Signal::connect`]). Callbacks run on the emitting thread, outside the
//! signal's own lock, so a callback may emit on another signal.
//!
//! Events are not buffered: subscribe before the work that emits starts.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Slot<T> {
    Channel(Sender<T>),
    Callback(Callback<T>),
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        match self {
            Slot::Channel(tx) => Slot::Channel(tx.clone()),
            Slot::Callback(f) => Slot::Callback(f.clone()),
        }
    }
}

pub struct Signal<T> {
    slots: Mutex<Vec<Slot<T>>>,
}

impl<T: Clone + Send + 'static> Signal<T> {
    pub fn new() -> Self {
        Signal {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Returns a receiver that gets every later emission.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = channel::unbounded();
        self.slots.lock().push(Slot::Channel(tx));
        rx
    }

    /// Runs `f` on every later emission.
    pub fn connect(&self, f: impl Fn(&T) + Send + Sync + 'static) {
        self.slots.lock().push(Slot::Callback(Arc::new(f)));
    }

    /// Delivers `value` to every subscriber. Channels whose receiver is gone
    /// are dropped. Returns the number of deliveries.
    pub fn emit(&self, value: &T) -> usize {
        let slots: Vec<Slot<T>> = self.slots.lock().clone();
        let mut delivered = 0;
        let mut closed: Vec<Sender<T>> = Vec::new();
        for slot in &slots {
            match slot {
                Slot::Channel(tx) => match tx.send(value.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => closed.push(tx.clone()),
                },
                Slot::Callback(f) => {
                    f(value);
                    delivered += 1;
                }
            }
        }
        if !closed.is_empty() {
            self.slots.lock().retain(|slot| match slot {
                Slot::Channel(tx) => !closed.iter().any(|c| c.same_channel(tx)),
                Slot::Callback(_) => true,
            });
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl<T: Clone + Send + 'static> Default for Signal<T> {
    fn default() -> Self {
        Signal::new()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.slots.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_reaches_channels_and_callbacks() {
        let signal: Signal<u32> = Signal::new();
        let rx = signal.subscribe();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        signal.connect(move |v| {
            counter.fetch_add(*v as usize, Ordering::SeqCst);
        });

        assert_eq!(signal.emit(&5), 2);
        assert_eq!(rx.recv().unwrap(), 5);
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let signal: Signal<u32> = Signal::new();
        let rx = signal.subscribe();
        drop(rx);
        assert_eq!(signal.subscriber_count(), 1);
        assert_eq!(signal.emit(&1), 0);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn callback_may_emit_on_another_signal() {
        let inner: Arc<Signal<u32>> = Arc::new(Signal::new());
        let outer: Signal<u32> = Signal::new();
        let rx = inner.subscribe();
        let forward = inner.clone();
        outer.connect(move |v| {
            forward.emit(&(v + 1));
        });
        outer.emit(&1);
        assert_eq!(rx.recv().unwrap(), 2);
    }
}
