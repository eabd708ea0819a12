use crate::core::error::{FrameworkError, Result};
use std::sync::{Condvar, Mutex, PoisonError};

/// Turn gate of a sequential module.
///
/// Keeps the number of the next event the module may run and blocks workers
/// holding a later event until it is their turn.
#[derive(Debug)]
pub struct SequenceGate {
    state: Mutex<GateState>,
    turn: Condvar,
}

#[derive(Debug)]
struct GateState {
    next: u64,
    aborted: bool,
}

impl SequenceGate {
    pub fn new(first_event: u64) -> Self {
        Self {
            state: Mutex::new(GateState {
                next: first_event,
                aborted: false,
            }),
            turn: Condvar::new(),
        }
    }

    /// Block until `event` is the next event, or the gate is aborted
    pub fn wait_turn(&self, event: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.next != event && !state.aborted {
            state = self.turn.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.aborted {
            return Err(FrameworkError::Aborted);
        }
        Ok(())
    }

    /// Wait for the turn of `event` and hold it until the returned guard is
    /// dropped, also when the holder unwinds
    pub fn enter(&self, event: u64) -> Result<Turn<'_>> {
        self.wait_turn(event)?;
        Ok(Turn { gate: self, event })
    }

    /// Hand the turn to the event after `event`
    pub fn advance(&self, event: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.next = event + 1;
        self.turn.notify_all();
    }

    /// Release every waiting worker with an error
    pub fn abort(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.aborted = true;
        self.turn.notify_all();
    }

    pub fn next_event(&self) -> u64 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).next
    }
}

/// Turn of one event at a [`SequenceGate`], handed on when dropped
#[must_use = "the turn is handed on as soon as the guard is dropped"]
pub struct Turn<'a> {
    gate: &'a SequenceGate,
    event: u64,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.gate.advance(self.event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_turns_in_order() {
        let gate = Arc::new(SequenceGate::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (1..=4u64)
            .rev()
            .map(|event| {
                let gate = gate.clone();
                let order = order.clone();
                thread::spawn(move || {
                    gate.wait_turn(event).unwrap();
                    order.lock().unwrap().push(event);
                    gate.advance(event);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(gate.next_event(), 5);
    }

    #[test]
    fn test_turn_handed_on_when_holder_panics() {
        let gate = Arc::new(SequenceGate::new(1));
        let holder = {
            let gate = gate.clone();
            thread::spawn(move || {
                let _turn = gate.enter(1).unwrap();
                panic!("module failed while holding its turn");
            })
        };
        assert!(holder.join().is_err());

        let _turn = gate.enter(2).unwrap();
        assert_eq!(gate.next_event(), 2);
    }

    #[test]
    fn test_abort_releases_waiters() {
        let gate = Arc::new(SequenceGate::new(1));
        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || gate.wait_turn(3))
        };
        gate.abort();
        assert!(matches!(waiter.join().unwrap(), Err(FrameworkError::Aborted)));
    }
}
