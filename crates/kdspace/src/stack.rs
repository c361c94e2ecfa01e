//! Arena-backed traversal stack shared by all queries.

use crate::tree::NIL;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    pub(crate) node: usize,
    /// Squared lower bound on the distance from the query to anything under `node`.
    pub(crate) bound: f64,
}

const EMPTY_FRAME: Frame = Frame {
    node: NIL,
    bound: 0.0,
};

/// Counters accumulated by a [`SearchStack`] across the queries it served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub queries: u64,
    pub nodes_visited: u64,
    pub nodes_pruned: u64,
    pub distance_evaluations: u64,
    /// Highest number of frames live at once.
    pub max_stack: usize,
}

/// Scratch state for one in-flight query at a time.
///
/// Frames live in a flat array indexed by `top`, so a query never recurses and a warmed-up
/// stack never allocates. The stack is sized to the tree height plus one, which is the most a
/// depth-first descent that pushes both children can hold; it still grows on demand so a stack
/// created for a shallow tree can be reused on a deeper one.
///
/// A tree may be queried concurrently through several stacks. One stack must not be shared.
#[derive(Debug, Clone, Default)]
pub struct SearchStack {
    frames: Vec<Frame>,
    top: usize,
    pub(crate) stats: SearchStats,
}

impl SearchStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: vec![EMPTY_FRAME; capacity],
            top: 0,
            stats: SearchStats::default(),
        }
    }

    /// Number of frames available without growing.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    /// Returns the counters collected so far and starts counting from zero.
    pub fn take_stats(&mut self) -> SearchStats {
        std::mem::take(&mut self.stats)
    }

    /// Clears frames left by a previous query and makes room for `capacity` frames.
    pub(crate) fn reset(&mut self, capacity: usize) {
        if self.frames.len() < capacity {
            self.frames.resize(capacity, EMPTY_FRAME);
        }
        self.top = 0;
        self.stats.queries += 1;
    }

    #[inline]
    pub(crate) fn push(&mut self, node: usize, bound: f64) {
        let frame = Frame { node, bound };
        if self.top == self.frames.len() {
            self.frames.push(frame);
        } else {
            self.frames[self.top] = frame;
        }
        self.top += 1;
        if self.top > self.stats.max_stack {
            self.stats.max_stack = self.top;
        }
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> Option<Frame> {
        if self.top == 0 {
            return None;
        }
        self.top -= 1;
        Some(self.frames[self.top])
    }
}
