use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Deferred action run by the consumer of a [`ThreadQueue`] on its own cadence.
pub type Action<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Producer side of a [`ThreadQueue`]. Cheap to clone, usable from any thread.
pub struct QueueHandle<C> {
    name: &'static str,
    sender: mpsc::UnboundedSender<Action<C>>,
}

impl<C> Clone for QueueHandle<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
        }
    }
}

impl<C> QueueHandle<C> {
    /// Pushes an action onto the queue. Never blocks.
    ///
    /// The queue is unbounded, so this only fails once the consuming cadence has been torn
    /// down; the action is then dropped and the loss is logged.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if self.sender.send(Box::new(action)).is_err() {
            warn!(
                "Queue '{}' has no consumer anymore, dropping deferred action",
                self.name
            );
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Multi-producer, single-consumer FIFO of deferred actions.
///
/// The consumer is the only owner of this value, which is what restricts draining to one
/// cadence. Actions from all producers run in the order they were enqueued.
pub struct ThreadQueue<C> {
    name: &'static str,
    receiver: mpsc::UnboundedReceiver<Action<C>>,
    sender: mpsc::UnboundedSender<Action<C>>,
}

impl<C> ThreadQueue<C> {
    pub fn new(name: &'static str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        debug!("Created thread queue '{}'", name);
        Self {
            name,
            receiver,
            sender,
        }
    }

    /// Returns a new producer handle for this queue.
    pub fn handle(&self) -> QueueHandle<C> {
        QueueHandle {
            name: self.name,
            sender: self.sender.clone(),
        }
    }

    /// Runs every action present when the call starts, in FIFO order.
    ///
    /// Snapshot semantics: the pending actions are collected first and then executed.
    /// Anything enqueued while the snapshot runs (including by the actions themselves) stays
    /// queued for the next drain. A panicking action is logged and the remaining actions of
    /// the snapshot still run.
    ///
    /// Returns the number of actions executed.
    pub fn drain_all(&mut self, context: &mut C) -> usize {
        let mut batch = Vec::new();
        while let Ok(action) = self.receiver.try_recv() {
            batch.push(action);
        }

        if batch.is_empty() {
            return 0;
        }

        debug!("Draining {} actions from queue '{}'", batch.len(), self.name);
        let count = batch.len();
        for (index, action) in batch.into_iter().enumerate() {
            let result = catch_unwind(AssertUnwindSafe(|| action(context)));
            if let Err(panic) = result {
                error!(
                    "Deferred action {} on queue '{}' panicked: {}",
                    index,
                    self.name,
                    panic_message(&panic)
                );
            }
        }
        count
    }

    /// Number of actions currently waiting.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn drains_in_enqueue_order() {
        let mut queue: ThreadQueue<Vec<u32>> = ThreadQueue::new("test");
        let handle = queue.handle();
        for i in 0..5 {
            handle.enqueue(move |log: &mut Vec<u32>| log.push(i));
        }

        let mut log = Vec::new();
        assert_eq!(queue.drain_all(&mut log), 5);
        assert_eq!(log, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_drain_is_a_no_op() {
        let mut queue: ThreadQueue<Vec<u32>> = ThreadQueue::new("empty");
        let mut log = Vec::new();
        assert_eq!(queue.drain_all(&mut log), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn panicking_action_does_not_stop_the_drain() {
        let mut queue: ThreadQueue<Vec<&'static str>> = ThreadQueue::new("panics");
        let handle = queue.handle();
        handle.enqueue(|log: &mut Vec<&'static str>| log.push("first"));
        handle.enqueue(|_: &mut Vec<&'static str>| panic!("boom"));
        handle.enqueue(|log: &mut Vec<&'static str>| log.push("third"));

        let mut log = Vec::new();
        assert_eq!(queue.drain_all(&mut log), 3);
        assert_eq!(log, vec!["first", "third"]);
    }

    #[test]
    fn actions_enqueued_during_drain_wait_for_next_drain() {
        struct Ctx {
            log: Vec<u32>,
            handle: QueueHandle<Ctx>,
        }

        let mut queue: ThreadQueue<Ctx> = ThreadQueue::new("reentrant");
        let mut ctx = Ctx {
            log: Vec::new(),
            handle: queue.handle(),
        };
        queue.handle().enqueue(|ctx: &mut Ctx| {
            ctx.log.push(1);
            ctx.handle.enqueue(|ctx: &mut Ctx| ctx.log.push(2));
        });

        assert_eq!(queue.drain_all(&mut ctx), 1);
        assert_eq!(ctx.log, vec![1]);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.drain_all(&mut ctx), 1);
        assert_eq!(ctx.log, vec![1, 2]);
    }

    #[test]
    fn concurrent_producers_keep_their_own_order() {
        let mut queue: ThreadQueue<Vec<(usize, u32)>> = ThreadQueue::new("mpsc");
        let producers = 4;
        let per_producer = 250;
        let barrier = Arc::new(Barrier::new(producers));
        // Each producer records its own sequence; per-producer order must survive the merge.
        let threads: Vec<_> = (0..producers)
            .map(|id| {
                let handle = queue.handle();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for seq in 0..per_producer {
                        handle.enqueue(move |log: &mut Vec<(usize, u32)>| log.push((id, seq)));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let mut log = Vec::new();
        assert_eq!(queue.drain_all(&mut log), producers * per_producer as usize);
        for id in 0..producers {
            let seqs: Vec<u32> = log
                .iter()
                .filter(|(p, _)| *p == id)
                .map(|(_, s)| *s)
                .collect();
            assert_eq!(seqs, (0..per_producer).collect::<Vec<_>>());
        }
    }

    #[test]
    fn interleaved_producers_run_in_enqueue_order() {
        let mut queue: ThreadQueue<Vec<&'static str>> = ThreadQueue::new("interleaved");
        let a = queue.handle();
        let b = queue.handle();

        thread::spawn(move || a.enqueue(|log: &mut Vec<&'static str>| log.push("a1")))
            .join()
            .unwrap();
        let b2 = b.clone();
        thread::spawn(move || b.enqueue(|log: &mut Vec<&'static str>| log.push("b1")))
            .join()
            .unwrap();
        queue
            .handle()
            .enqueue(|log: &mut Vec<&'static str>| log.push("main"));
        thread::spawn(move || b2.enqueue(|log: &mut Vec<&'static str>| log.push("b2")))
            .join()
            .unwrap();

        let mut log = Vec::new();
        queue.drain_all(&mut log);
        assert_eq!(log, vec!["a1", "b1", "main", "b2"]);
    }

    #[test]
    fn enqueue_after_consumer_dropped_is_silent() {
        let queue: ThreadQueue<()> = ThreadQueue::new("gone");
        let handle = queue.handle();
        drop(queue);
        handle.enqueue(|_: &mut ()| {});
        assert_eq!(handle.name(), "gone");
    }
}
