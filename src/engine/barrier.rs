//! Reusable rendezvous for the lockstep time loop

use std::sync::{Condvar, Mutex, PoisonError};

/// Counting barrier whose last arriving thread may run an action
///
/// The action runs before any waiting thread is released, so it sees a
/// quiescent state and everything it writes is visible to every thread
/// once the barrier opens.
#[derive(Debug)]
pub struct StepBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

impl StepBarrier {
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "a barrier needs at least one party");
        Self {
            parties,
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Wait for all parties; returns true on the thread that opened the barrier
    pub fn wait(&self) -> bool {
        self.wait_with(|| ())
    }

    /// Wait for all parties, running `action` on the last one to arrive
    pub fn wait_with<F: FnOnce()>(&self, action: F) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.arrived += 1;

        if state.arrived < self.parties {
            let generation = state.generation;
            while generation == state.generation {
                state = self
                    .released
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            false
        } else {
            action();
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.released.notify_all();
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_single_party_runs_action() {
        let barrier = StepBarrier::new(1);
        let mut hits = 0;
        assert!(barrier.wait_with(|| hits += 1));
        assert!(barrier.wait_with(|| hits += 1));
        assert_eq!(hits, 2);
    }

    #[test]
    fn test_action_runs_once_per_round() {
        let parties = 6;
        let rounds = 50;
        let barrier = Arc::new(StepBarrier::new(parties));
        let actions = Arc::new(AtomicUsize::new(0));
        let arrivals = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..parties)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let actions = Arc::clone(&actions);
                let arrivals = Arc::clone(&arrivals);
                std::thread::spawn(move || {
                    let mut leads = 0;
                    for round in 0..rounds {
                        arrivals.fetch_add(1, Ordering::SeqCst);
                        let led = barrier.wait_with(|| {
                            // everyone has arrived for this round
                            assert_eq!(arrivals.load(Ordering::SeqCst), (round + 1) * parties);
                            actions.fetch_add(1, Ordering::SeqCst);
                        });
                        if led {
                            leads += 1;
                        }
                        // the action is visible after release
                        assert!(actions.load(Ordering::SeqCst) > round);
                    }
                    leads
                })
            })
            .collect();

        let leads: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(leads, rounds);
        assert_eq!(actions.load(Ordering::SeqCst), rounds);
    }
}
