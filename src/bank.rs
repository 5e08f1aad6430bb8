// Particle queues and banks
//
// Each worker owns a queue of histories processed this cycle and a bank of
// histories deferred to the next one. In time-dependent mode the queues are
// shared so secondaries can be handed to whichever worker has the least work.

use crate::particle::Particle;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// Per-worker work list.
///
/// A queue slot may stand for several identical histories: its particle's
/// `multiplicity` counts the copies still waiting behind it.
#[derive(Debug, Default)]
pub struct WorkerQueue {
    queue: VecDeque<Particle>,
    bank: Vec<Particle>,
}

impl WorkerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, particle: Particle) {
        self.queue.push_back(particle);
    }

    /// Queue `count` identical copies in a single slot.
    pub fn push_copies(&mut self, mut particle: Particle, count: u32) {
        if count == 0 {
            return;
        }
        particle.multiplicity = count - 1;
        self.queue.push_back(particle);
    }

    /// Next history to run, always with multiplicity zero.
    pub fn pop(&mut self) -> Option<Particle> {
        let front = self.queue.front_mut()?;
        if front.multiplicity > 0 {
            front.multiplicity -= 1;
            let mut copy = front.clone();
            copy.multiplicity = 0;
            return Some(copy);
        }
        self.queue.pop_front()
    }

    /// Histories waiting in the queue, counting every copy.
    pub fn pending(&self) -> usize {
        self.queue
            .iter()
            .map(|p| 1 + p.multiplicity as usize)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Defer a history to the next cycle.
    pub fn bank(&mut self, particle: Particle) {
        self.bank.push(particle);
    }

    pub fn banked(&self) -> usize {
        self.bank.len()
    }

    pub fn take_bank(&mut self) -> Vec<Particle> {
        std::mem::take(&mut self.bank)
    }

    /// Move the banked histories to the back of the queue.
    pub fn requeue_bank(&mut self) {
        let banked = self.take_bank();
        self.queue.extend(banked);
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.bank.clear();
    }
}

/// Worker queues that any thread may push to.
#[derive(Debug)]
pub struct SharedQueues {
    queues: Vec<Mutex<WorkerQueue>>,
}

impl SharedQueues {
    pub fn new(workers: usize) -> Self {
        SharedQueues {
            queues: (0..workers.max(1)).map(|_| Mutex::new(WorkerQueue::new())).collect(),
        }
    }

    pub fn workers(&self) -> usize {
        self.queues.len()
    }

    /// Lock one worker's queue. A poisoned lock still hands out the queue,
    /// since its contents stay consistent between operations.
    pub fn lock(&self, worker: usize) -> MutexGuard<'_, WorkerQueue> {
        self.queues[worker % self.queues.len()]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, worker: usize, particle: Particle) {
        self.lock(worker).push(particle);
    }

    /// Hand a particle to the queue with the fewest pending histories.
    /// Returns the chosen worker.
    pub fn push_least_loaded(&self, particle: Particle) -> usize {
        let target = (0..self.queues.len())
            .min_by_key(|&w| self.lock(w).pending())
            .unwrap_or(0);
        self.lock(target).push(particle);
        target
    }

    pub fn pop(&self, worker: usize) -> Option<Particle> {
        self.lock(worker).pop()
    }

    pub fn total_pending(&self) -> usize {
        (0..self.queues.len()).map(|w| self.lock(w).pending()).sum()
    }

    /// Collect every worker's bank.
    pub fn drain_banks(&self) -> Vec<Particle> {
        (0..self.queues.len())
            .flat_map(|w| self.lock(w).take_bank())
            .collect()
    }
}
