//! One-shot completion slots for work that finishes on another thread.

use crossbeam_channel::{Receiver, Sender};

/// The producing side went away without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation was abandoned before it completed")]
pub struct Abandoned;

/// Create a linked completer/pending pair.
pub fn pending<T>() -> (Completer<T>, Pending<T>) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (Completer { tx }, Pending { rx })
}

/// Write side of a one-shot slot. Completing consumes it, so a value is
/// delivered at most once. Dropping it uncompleted abandons the slot.
#[must_use = "dropping a completer abandons the operation"]
#[derive(Debug)]
pub struct Completer<T> {
    tx: Sender<T>,
}

impl<T> Completer<T> {
    pub fn complete(self, value: T) {
        // The waiter may have given up; that is not our problem.
        let _ = self.tx.send(value);
    }
}

/// Read side of a one-shot slot.
#[must_use = "a pending result does nothing unless waited on"]
#[derive(Debug)]
pub struct Pending<T> {
    rx: Receiver<T>,
}

impl<T> Pending<T> {
    /// An already-completed slot.
    pub fn ready(value: T) -> Self {
        let (done, pending) = pending();
        done.complete(value);
        pending
    }

    /// Block until the value arrives.
    pub fn wait(self) -> Result<T, Abandoned> {
        self.rx.recv().map_err(|_| Abandoned)
    }
}

impl<T, E> Pending<Result<T, E>> {
    /// Block and collapse the result to success or failure.
    pub fn wait_ok(self) -> bool {
        matches!(self.wait(), Ok(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_value_is_returned() {
        assert_eq!(Pending::ready(7).wait(), Ok(7));
    }

    #[test]
    fn completed_from_another_thread() {
        let (done, pending) = pending();
        std::thread::spawn(move || done.complete("hi"));
        assert_eq!(pending.wait(), Ok("hi"));
    }

    #[test]
    fn dropped_completer_abandons() {
        let (done, pending) = pending::<u8>();
        drop(done);
        assert_eq!(pending.wait(), Err(Abandoned));
    }

    #[test]
    fn wait_ok_collapses_results() {
        assert!(Pending::ready(Ok::<_, ()>(1)).wait_ok());
        assert!(!Pending::ready(Err::<u8, _>("no")).wait_ok());
        let (done, pending) = pending::<Result<(), ()>>();
        drop(done);
        assert!(!pending.wait_ok());
    }
}
