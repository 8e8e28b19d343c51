//! Partition consumers
//!
//! One thread per consumer, each draining its own run of bounded queues.
//! Every job for a given queue runs on the same thread in arrival order, and
//! every job runs inside an epoch pin taken from the consumer's participant.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Select, Sender};
use parking_lot::{Mutex, RwLock};

use crate::index::CountIndex;
use crate::routing::Topology;
use crate::storage::KvStore;
use crate::structures::SnapshotGuard;
use crate::types::{Error, Result};

/// Work item executed on a consumer thread
pub(crate) type Job<S> = Box<dyn FnOnce(&CountIndex<S>, &SnapshotGuard<'_>) + Send>;

/// Fixed pool of consumer threads
pub(crate) struct PartitionPool<S: KvStore> {
    topology: Topology,
    queues: RwLock<Vec<Sender<Job<S>>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: KvStore> PartitionPool<S> {
    /// Spawn `topology.consumers()` threads with `capacity` slots per queue
    pub(crate) fn start(index: Arc<CountIndex<S>>, topology: Topology, capacity: usize) -> Result<Self> {
        let per_consumer = topology.queues_per_consumer() as usize;
        let mut senders = Vec::with_capacity(topology.total_queues() as usize);
        let mut handles = Vec::with_capacity(topology.consumers() as usize);

        for consumer in 0..topology.consumers() {
            let mut receivers = Vec::with_capacity(per_consumer);
            for _ in 0..per_consumer {
                let (tx, rx) = channel::bounded::<Job<S>>(capacity);
                senders.push(tx);
                receivers.push(rx);
            }

            let index = Arc::clone(&index);
            let spawned = thread::Builder::new()
                .name(format!("tm-consumer-{consumer}"))
                .spawn(move || consume(consumer, index, receivers));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Closing the queues lets the threads already running exit.
                    drop(senders);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(e.into());
                }
            }
        }

        crate::log_info!(
            consumers = topology.consumers(),
            total_queues = topology.total_queues(),
            queue_capacity = capacity,
            "partition consumers started"
        );
        Ok(Self { topology, queues: RwLock::new(senders), handles: Mutex::new(handles) })
    }

    /// Run `f` on the consumer owning `route_key` and wait for its result.
    ///
    /// Blocks while the target queue is full.
    pub(crate) fn dispatch<R, F>(&self, route_key: &str, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&CountIndex<S>, &SnapshotGuard<'_>) -> Result<R> + Send + 'static,
    {
        let route = self.topology.route(route_key);
        let queue = self.queues.read().get(route.queue as usize).cloned().ok_or(Error::Shutdown)?;

        let (reply_tx, reply_rx) = channel::bounded(1);
        let job: Job<S> = Box::new(move |index: &CountIndex<S>, guard: &SnapshotGuard<'_>| {
            // The caller may have given up waiting; nothing to do then.
            let _ = reply_tx.send(f(index, guard));
        });
        queue.send(job).map_err(|_| Error::Shutdown)?;
        drop(queue);

        reply_rx.recv().map_err(|_| Error::Shutdown)?
    }

    /// Close every queue, let consumers drain what was accepted, and join them.
    ///
    /// Idempotent.
    pub(crate) fn shutdown(&self) {
        // Held across the joins so a concurrent caller returns only once
        // every consumer has exited.
        let mut handles = self.handles.lock();
        let closed = std::mem::take(&mut *self.queues.write());
        if closed.is_empty() {
            return;
        }
        drop(closed);

        for handle in handles.drain(..) {
            if handle.join().is_err() {
                crate::log_error!("partition consumer panicked");
            }
        }
        crate::log_info!("partition consumers stopped");
    }

    /// Whether the pool still accepts work
    pub(crate) fn is_running(&self) -> bool {
        !self.queues.read().is_empty()
    }

    pub(crate) fn topology(&self) -> Topology {
        self.topology
    }
}

fn consume<S: KvStore>(consumer: u32, index: Arc<CountIndex<S>>, mut queues: Vec<Receiver<Job<S>>>) {
    let participant = index.domain().register();
    crate::log_debug!(consumer, queues = queues.len(), "consumer running");

    while !queues.is_empty() {
        let mut select = Select::new();
        for rx in &queues {
            select.recv(rx);
        }
        let op = select.select();
        let slot = op.index();
        match op.recv(&queues[slot]) {
            Ok(job) => {
                let guard = participant.pin();
                job(&*index, &guard);
            }
            // Closed and drained.
            Err(_) => {
                queues.swap_remove(slot);
            }
        }
    }

    crate::log_debug!(consumer, "consumer exiting");
}
