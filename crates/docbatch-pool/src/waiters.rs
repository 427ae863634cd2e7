use std::collections::VecDeque;
use std::task::Waker;

/// FIFO queue of tasks waiting for a pool slot.
///
/// A waiter stays registered until it either obtains a slot or is dropped;
/// waking only ever touches the front entry. Whoever leaves the queue while
/// slots may still be free is responsible for waking the next waiter, so a
/// release is never lost to a waiter that gave up.
#[derive(Debug, Default)]
pub(crate) struct WaitQueue {
    waiters: VecDeque<(u64, Waker)>,
    next_token: u64,
}

impl WaitQueue {
    /// Register a waker, or refresh the waker stored under `token`.
    pub(crate) fn register(&mut self, token: Option<u64>, waker: &Waker) -> u64 {
        if let Some(token) = token {
            if let Some((_, stored)) = self.waiters.iter_mut().find(|(t, _)| *t == token) {
                stored.clone_from(waker);
                return token;
            }
        }

        let token = self.next_token;
        self.next_token = self.next_token.wrapping_add(1);
        self.waiters.push_back((token, waker.clone()));
        token
    }

    pub(crate) fn remove(&mut self, token: u64) {
        self.waiters.retain(|(t, _)| *t != token);
    }

    pub(crate) fn wake_front(&self) {
        if let Some((_, waker)) = self.waiters.front() {
            waker.wake_by_ref();
        }
    }

    pub(crate) fn wake_all(&mut self) {
        for (_, waker) in self.waiters.drain(..) {
            waker.wake();
        }
    }

    /// Whether a caller holding `token` (or no token yet) may take a slot now.
    pub(crate) fn is_turn(&self, token: Option<u64>) -> bool {
        match (token, self.waiters.front()) {
            (_, None) => true,
            (Some(token), Some((front, _))) => token == *front,
            (None, Some(_)) => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}
