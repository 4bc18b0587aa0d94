//! Module implement the index garbage collector: a background consumer of
//! "collect this node" jobs produced whenever a skip-list node is logically
//! removed and its `deleted_by` stamp is set.
//!
//! The source's two-pass collector (`_passes = 2`) is a two-epoch
//! reclamation scheme: the first pass observed past a watermark quiesces
//! any reader that might still be mid-traversal through the node, the
//! second pass physically unlinks it from every level of the tower it
//! spans and frees it. Until that second pass, the node stays spliced
//! into the list exactly as it was before `remove` — only its
//! `deleted_by` stamp changed — so a reader at an earlier `tx_id` can
//! still reach it via `descend`. We keep exactly that discipline, driven
//! by the caller's `tick(watermark)` rather than a fixed timer, so tests
//! can advance epochs deterministically.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::skiplist::{arena::Arena, node::NodeId};
use crate::util::{thread, Spinlock, Thread};
use crate::Result;

const PASSES_REQUIRED: u8 = 2;

struct Job {
    node_id: NodeId,
    passes_completed: u8,
    last_pass_tx_id: u64,
}

enum Msg {
    Enqueue(NodeId),
    Tick(u64),
}

/// Deferred-reclamation collector for one skip list's arena.
///
/// `enqueue` is called by `remove` with the node it just unlinked; `tick`
/// is called by the surrounding transaction context whenever the set of
/// active reader transactions changes, passing `min(active_reader_tx_ids)`
/// (or `u64::MAX` if there are no active readers) as the new watermark.
pub struct GarbageCollector<V> {
    jobs: Arc<Mutex<VecDeque<Job>>>,
    thread: Thread<Msg, (), ()>,
    _marker: std::marker::PhantomData<V>,
}

impl<V: Send + Sync + 'static> GarbageCollector<V> {
    pub fn new(arena: Arc<Spinlock<Arena<V>>>, name: &str) -> GarbageCollector<V> {
        let jobs: Arc<Mutex<VecDeque<Job>>> = Arc::new(Mutex::new(VecDeque::new()));
        let jobs_clone = Arc::clone(&jobs);

        let thread = Thread::new(name, move |rx: thread::Rx<Msg, ()>| {
            move || Self::main_loop(rx, arena, jobs_clone)
        });

        GarbageCollector { jobs, thread, _marker: std::marker::PhantomData }
    }

    fn main_loop(
        rx: thread::Rx<Msg, ()>,
        arena: Arc<Spinlock<Arena<V>>>,
        jobs: Arc<Mutex<VecDeque<Job>>>,
    ) {
        for (msg, respond_to) in rx.iter() {
            match msg {
                Msg::Enqueue(node_id) => {
                    jobs.lock().unwrap().push_back(Job {
                        node_id,
                        passes_completed: 0,
                        last_pass_tx_id: 0,
                    });
                }
                Msg::Tick(watermark) => {
                    Self::drain(&arena, &jobs, watermark);
                }
            }
            if let Some(tx) = respond_to {
                tx.send(()).ok();
            }
        }
    }

    fn drain(arena: &Spinlock<Arena<V>>, jobs: &Mutex<VecDeque<Job>>, watermark: u64) {
        let mut pending = jobs.lock().unwrap();
        let mut remaining = VecDeque::with_capacity(pending.len());
        while let Some(mut job) = pending.pop_front() {
            if job.last_pass_tx_id < watermark {
                job.passes_completed += 1;
                job.last_pass_tx_id = watermark;
                if job.passes_completed >= PASSES_REQUIRED {
                    let mut arena = arena.write();
                    let height = arena.get(job.node_id).height();
                    for level in 0..height {
                        let (p, n) = arena.get(job.node_id).column[level];
                        arena.get_mut(p).column[level].1 = n;
                        arena.get_mut(n).column[level].0 = p;
                    }
                    arena.free(job.node_id);
                    continue;
                }
            }
            remaining.push_back(job);
        }
        *pending = remaining;
    }

    /// Hand a logically-ghosted node (its `deleted_by` stamped, its tower
    /// links still intact so earlier-`tx_id` readers can reach it) to the
    /// collector. It is not physically unlinked or freed until two epochs
    /// pass the watermark.
    pub fn enqueue(&self, node_id: NodeId) -> Result<()> {
        self.thread.to_tx().post(Msg::Enqueue(node_id))
    }

    /// Advance the reclamation watermark and let the collector drain
    /// whatever jobs are now eligible.
    pub fn tick(&self, watermark: u64) -> Result<()> {
        self.thread.to_tx().post(Msg::Tick(watermark))
    }

    pub fn close_wait(self) -> Result<()> {
        self.thread.join()
    }
}
