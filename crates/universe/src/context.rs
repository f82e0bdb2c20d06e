//! The world thread: a single reader draining one world's FIFO queue.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use multiworld_kernel::World;
use multiworld_persist::{FlushStats, StoreError, WorldStore, delete_tree};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::handle::WorldStats;
use crate::relocate::Relocation;

/// Closure run on a world thread with exclusive access to its state.
pub(crate) type Task = Box<dyn FnOnce(&mut WorldState) + Send>;

/// Everything a world thread can be asked to do.
pub(crate) enum Message {
    Run(Task),
    Relocate(Relocation),
    Shutdown,
}

impl Message {
    pub(crate) fn into_relocation(self) -> Option<Relocation> {
        match self {
            Self::Relocate(relocation) => Some(relocation),
            _ => None,
        }
    }
}

/// State owned by a world thread.
pub struct WorldState {
    world: World,
    store: WorldStore,
}

impl WorldState {
    pub fn new(world: World, store: WorldStore) -> Self {
        Self { world, store }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn store(&self) -> &WorldStore {
        &self.store
    }

    /// Write config, chunks and entities to the world directory.
    pub fn flush(&mut self) -> Result<FlushStats, StoreError> {
        let stats = self.store.flush(&mut self.world)?;
        debug!(
            root = %self.store.root().display(),
            chunks = stats.chunks,
            entities = stats.entities,
            "flushed world"
        );
        Ok(stats)
    }

    /// Final step of a world thread: persist, or delete if marked for removal.
    fn close(mut self, name: &str) {
        if self.world.config().delete_on_remove {
            let root = self.store.root().to_path_buf();
            drop(self);
            match delete_tree(&root) {
                Ok(()) => info!(world = %name, "deleted world directory"),
                Err(err) => error!(world = %name, %err, "failed to delete world directory"),
            }
        } else if let Err(err) = self.flush() {
            error!(world = %name, %err, "failed to save world on shutdown");
        }
    }
}

/// Sending side of a world thread.
pub(crate) struct WorldContext {
    tx: Sender<Message>,
    closing: AtomicBool,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorldContext {
    /// Start the thread for world `name`.
    pub(crate) fn spawn(
        name: &str,
        state: WorldState,
        stats: Arc<WorldStats>,
        tick: Option<Duration>,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let owned = name.to_string();
        let thread = std::thread::Builder::new()
            .name(format!("world-{name}"))
            .spawn(move || run(owned, state, rx, stats, tick))?;
        Ok(Self {
            tx,
            closing: AtomicBool::new(false),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Queue a message. Hands it back if the world is closing or gone.
    pub(crate) fn send(&self, msg: Message) -> Result<(), Message> {
        if self.is_closing() {
            return Err(msg);
        }
        self.tx.send(msg).map_err(|err| err.into_inner())
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Refuse further messages and ask the thread to stop after the ones
    /// already queued. Messages that slip in behind the shutdown are dropped.
    pub(crate) fn close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Message::Shutdown);
        }
    }

    /// Queue a message even while closing, so it lands behind the shutdown.
    #[cfg(test)]
    pub(crate) fn send_unchecked(&self, msg: Message) -> Result<(), Message> {
        self.tx.send(msg).map_err(|err| err.into_inner())
    }

    /// Wait for the thread to exit. A no-op when called from the thread itself.
    pub(crate) fn join(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!("world thread panicked");
        }
    }
}

fn run(
    name: String,
    mut state: WorldState,
    rx: Receiver<Message>,
    stats: Arc<WorldStats>,
    tick: Option<Duration>,
) {
    info!(world = %name, "world thread started");
    loop {
        let msg = match tick {
            Some(interval) => match rx.recv_timeout(interval) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => {
                    state.world.step();
                    stats.publish(&state.world);
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(msg) => msg,
                Err(_) => break,
            },
        };

        let keep_running = panic::catch_unwind(AssertUnwindSafe(|| match msg {
            Message::Run(task) => {
                task(&mut state);
                true
            }
            Message::Relocate(relocation) => {
                relocation.advance(&mut state);
                true
            }
            Message::Shutdown => false,
        }));
        match keep_running {
            Ok(true) => {}
            Ok(false) => break,
            Err(_) => warn!(world = %name, "task panicked, its result is abandoned"),
        }
        stats.publish(&state.world);
    }
    drop(rx);
    state.close(&name);
    info!(world = %name, "world thread stopped");
}
