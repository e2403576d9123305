use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

/// Multi-granularity lock modes with the textbook compatibility
/// matrix. Intention modes (IS/IX) are taken on coarser resources
/// before S/X on finer ones; SIX is S plus IX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Is,
    Ix,
    S,
    Six,
    X,
}

const MODE_COUNT: usize = 5;

impl LockMode {
    fn idx(&self) -> usize {
        match self {
            LockMode::Is => 0,
            LockMode::Ix => 1,
            LockMode::S => 2,
            LockMode::Six => 3,
            LockMode::X => 4,
        }
    }
}

/// Whether two holders may coexist on one resource.
pub fn compatible(a: LockMode, b: LockMode) -> bool {
    const T: bool = true;
    const F: bool = false;
    // rows/cols: IS, IX, S, SIX, X
    const MATRIX: [[bool; 5]; 5] = [
        [T, T, T, T, F],
        [T, T, F, F, F],
        [T, F, T, F, F],
        [T, F, F, F, F],
        [F, F, F, F, F],
    ];
    MATRIX[a.idx()][b.idx()]
}

struct GrState {
    holder_counts: [u32; MODE_COUNT],
    // FIFO of waiting tickets; a waiter may only be granted when it
    // is at the front, so late readers cannot starve a writer.
    waiters: VecDeque<(u64, LockMode)>,
    next_ticket: u64,
}

impl GrState {
    fn compatible_with_holders(&self, mode: LockMode) -> bool {
        for i in 0..MODE_COUNT {
            if self.holder_counts[i] == 0 {
                continue;
            }
            let held = [LockMode::Is, LockMode::Ix, LockMode::S, LockMode::Six, LockMode::X][i];
            if !compatible(mode, held) {
                return false;
            }
        }
        true
    }

    fn holders_total(&self) -> u32 {
        self.holder_counts.iter().sum()
    }
}

/// One granular lock: per-mode holder counts plus a FIFO waiter
/// queue. Blocking waits sit on the condvar and re-check their
/// position in the queue.
pub struct GrLock {
    state: Mutex<GrState>,
    cond: Condvar,
}

impl GrLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GrState {
                holder_counts: [0; MODE_COUNT],
                waiters: VecDeque::new(),
                next_ticket: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquire `mode`, blocking behind earlier waiters.
    pub fn lock(&self, mode: LockMode) {
        let mut state = self.state.lock().unwrap();

        if state.waiters.is_empty() && state.compatible_with_holders(mode) {
            state.holder_counts[mode.idx()] += 1;
            return;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_back((ticket, mode));

        loop {
            state = self.cond.wait(state).unwrap();
            let at_front = state.waiters.front().map(|(t, _)| *t) == Some(ticket);
            if at_front && state.compatible_with_holders(mode) {
                state.waiters.pop_front();
                state.holder_counts[mode.idx()] += 1;
                // The next waiter may be compatible with us too.
                self.cond.notify_all();
                return;
            }
        }
    }

    /// Acquire `mode` only if that is possible right now.
    pub fn try_lock(&self, mode: LockMode) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.waiters.is_empty() && state.compatible_with_holders(mode) {
            state.holder_counts[mode.idx()] += 1;
            return true;
        }
        false
    }

    /// Release one holder of `mode`. Returns true when the lock has
    /// no holders and no waiters left.
    pub fn unlock(&self, mode: LockMode) -> bool {
        let mut state = self.state.lock().unwrap();
        assert!(state.holder_counts[mode.idx()] > 0, "unlock without hold");
        state.holder_counts[mode.idx()] -= 1;
        self.cond.notify_all();
        state.holders_total() == 0 && state.waiters.is_empty()
    }

    /// Atomically trade a held `old` for `new`. When the trade is not
    /// immediately compatible the caller waits at the front of the
    /// queue, so an upgrade cannot be overtaken.
    pub fn upgrade(&self, old: LockMode, new: LockMode) {
        let mut state = self.state.lock().unwrap();
        assert!(state.holder_counts[old.idx()] > 0, "upgrade without hold");
        state.holder_counts[old.idx()] -= 1;

        if state.compatible_with_holders(new) {
            state.holder_counts[new.idx()] += 1;
            self.cond.notify_all();
            return;
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        state.waiters.push_front((ticket, new));

        loop {
            state = self.cond.wait(state).unwrap();
            let at_front = state.waiters.front().map(|(t, _)| *t) == Some(ticket);
            if at_front && state.compatible_with_holders(new) {
                state.waiters.pop_front();
                state.holder_counts[new.idx()] += 1;
                self.cond.notify_all();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_matrix_basics() {
        assert!(compatible(LockMode::Is, LockMode::Ix));
        assert!(compatible(LockMode::S, LockMode::S));
        assert!(!compatible(LockMode::S, LockMode::Ix));
        assert!(!compatible(LockMode::Six, LockMode::S));
        assert!(compatible(LockMode::Six, LockMode::Is));
        for m in [LockMode::Is, LockMode::Ix, LockMode::S, LockMode::Six, LockMode::X].iter() {
            assert!(!compatible(*m, LockMode::X));
            assert!(!compatible(LockMode::X, *m));
        }
    }

    #[test]
    fn test_try_lock_respects_holders() {
        let l = GrLock::new();
        assert!(l.try_lock(LockMode::S));
        assert!(l.try_lock(LockMode::S));
        assert!(!l.try_lock(LockMode::X));
        assert!(!l.unlock(LockMode::S));
        assert!(!l.try_lock(LockMode::X));
        assert!(l.unlock(LockMode::S));
        assert!(l.try_lock(LockMode::X));
    }

    #[test]
    fn test_blocked_writer_gets_lock_after_readers_leave() {
        let l = Arc::new(GrLock::new());
        l.lock(LockMode::S);

        let l2 = Arc::clone(&l);
        let t = std::thread::spawn(move || {
            l2.lock(LockMode::X);
            l2.unlock(LockMode::X);
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        l.unlock(LockMode::S);
        t.join().unwrap();
    }

    #[test]
    fn test_upgrade_s_to_x() {
        let l = Arc::new(GrLock::new());
        l.lock(LockMode::S);
        l.upgrade(LockMode::S, LockMode::X);
        assert!(!l.try_lock(LockMode::Is));
        l.unlock(LockMode::X);
        assert!(l.try_lock(LockMode::Is));
    }
}
