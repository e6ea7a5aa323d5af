/// Index after `current`, wrapping at `total`. An empty show stays at 0.
pub fn next_slide_index(current: usize, total: usize) -> usize {
    if total == 0 { 0 } else { (current + 1) % total }
}

/// An advance that has been started but not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub generation: u64,
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed {
    pub current: usize,
    pub next: usize,
}

/// Current/next indices plus the bookkeeping that keeps at most one advance
/// logically in flight.
#[derive(Debug)]
pub struct PlaybackState {
    total: usize,
    current: usize,
    next: usize,
    generation: u64,
    in_flight: Option<InFlight>,
    deferred: Option<u64>,
}

impl PlaybackState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            current: 0,
            next: next_slide_index(0, total),
            generation: 0,
            in_flight: None,
            deferred: None,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn next(&self) -> usize {
        self.next
    }

    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    /// Opens a new generation for the `current -> next` advance.
    pub fn begin(&mut self) -> InFlight {
        self.generation += 1;
        let advance = InFlight {
            generation: self.generation,
            from: self.current,
            to: self.next,
        };
        self.in_flight = Some(advance);
        self.deferred = None;
        advance
    }

    /// Commits the in-flight advance if it belongs to `generation`.
    /// Stale generations are ignored.
    pub fn commit(&mut self, generation: u64) -> Option<Committed> {
        match self.in_flight {
            Some(advance) if advance.generation == generation => {
                self.in_flight = None;
                self.deferred = None;
                self.current = advance.to;
                self.next = next_slide_index(self.current, self.total);
                Some(Committed {
                    current: self.current,
                    next: self.next,
                })
            }
            _ => None,
        }
    }

    /// Commits whatever advance is still pending, regardless of generation.
    pub fn flush(&mut self) -> Option<Committed> {
        let generation = self.in_flight?.generation;
        self.commit(generation)
    }

    /// Remembers a settle that came due while paused. Returns false for stale generations.
    pub fn defer(&mut self, generation: u64) -> bool {
        if self.in_flight.map(|a| a.generation) == Some(generation) {
            self.deferred = Some(generation);
            true
        } else {
            false
        }
    }

    pub fn take_deferred(&mut self) -> Option<u64> {
        self.deferred.take()
    }

    /// Up to `count` slides starting at `next`, skipping the current one.
    pub fn lookahead(&self, count: usize) -> Vec<usize> {
        if self.total == 0 {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(count);
        for step in 0..count.min(self.total) {
            let index = (self.next + step) % self.total;
            if index != self.current && !out.contains(&index) {
                out.push(index);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_index_wraps() {
        assert_eq!(next_slide_index(0, 3), 1);
        assert_eq!(next_slide_index(2, 3), 0);
        assert_eq!(next_slide_index(0, 1), 0);
        assert_eq!(next_slide_index(5, 0), 0);
    }

    #[test]
    fn commit_moves_window_forward() {
        let mut state = PlaybackState::new(3);
        let advance = state.begin();
        assert_eq!((advance.from, advance.to), (0, 1));
        assert_eq!(
            state.commit(advance.generation),
            Some(Committed { current: 1, next: 2 })
        );
        assert!(state.in_flight().is_none());
    }

    #[test]
    fn stale_generation_is_ignored() {
        let mut state = PlaybackState::new(3);
        let first = state.begin();
        state.flush();
        let second = state.begin();
        assert_eq!(state.commit(first.generation), None);
        assert!(!state.defer(first.generation));
        assert_eq!(state.current(), 1);
        assert_eq!(
            state.commit(second.generation),
            Some(Committed { current: 2, next: 0 })
        );
    }

    #[test]
    fn deferred_settle_is_cleared_by_commit() {
        let mut state = PlaybackState::new(2);
        let advance = state.begin();
        assert!(state.defer(advance.generation));
        assert_eq!(state.take_deferred(), Some(advance.generation));
        assert_eq!(state.take_deferred(), None);

        assert!(state.defer(advance.generation));
        state.commit(advance.generation);
        assert_eq!(state.take_deferred(), None);
    }

    #[test]
    fn lookahead_wraps_and_skips_current() {
        let mut state = PlaybackState::new(4);
        assert_eq!(state.lookahead(2), vec![1, 2]);
        for _ in 0..3 {
            let g = state.begin().generation;
            state.commit(g);
        }
        assert_eq!(state.current(), 3);
        assert_eq!(state.lookahead(2), vec![0, 1]);
        assert_eq!(state.lookahead(10), vec![0, 1, 2]);

        assert!(PlaybackState::new(1).lookahead(2).is_empty());
        assert!(PlaybackState::new(0).lookahead(2).is_empty());
    }
}
