//! Bounded frame hand-off between the capture and recognition threads.
//!
//! Live capture keeps the freshest frames: pushing into a full queue evicts
//! the oldest one. Replay waits for space instead.

use rollcall_hw::Frame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Outcome of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    /// Queued after evicting the oldest waiting frame.
    Evicted,
    /// The other side has gone away; the frame was discarded.
    Closed,
}

#[derive(Default)]
struct State {
    frames: VecDeque<Frame>,
    closed: bool,
}

pub struct FrameQueue {
    state: Mutex<State>,
    ready: Condvar,
    space: Condvar,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            ready: Condvar::new(),
            space: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `frame`, evicting the oldest frame if the queue is full.
    pub fn push_latest(&self, frame: Frame) -> Push {
        let mut state = self.lock();
        if state.closed {
            return Push::Closed;
        }
        let evicted = if state.frames.len() >= self.capacity {
            state.frames.pop_front();
            true
        } else {
            false
        };
        state.frames.push_back(frame);
        self.ready.notify_one();
        if evicted {
            Push::Evicted
        } else {
            Push::Queued
        }
    }

    /// Queue `frame`, blocking until there is room.
    pub fn push_wait(&self, frame: Frame) -> Push {
        let mut state = self.lock();
        while state.frames.len() >= self.capacity && !state.closed {
            state = self.space.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.closed {
            return Push::Closed;
        }
        state.frames.push_back(frame);
        self.ready.notify_one();
        Push::Queued
    }

    /// Next frame in order. Returns `None` once the queue is closed and empty.
    pub fn pop(&self) -> Option<Frame> {
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.frames.pop_front() {
                self.space.notify_one();
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Refuse further pushes and wake every waiter. Queued frames can still
    /// be popped.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
        self.space.notify_all();
    }

    /// Closes the queue when dropped, so an early return or a panic on
    /// either side never leaves the other side waiting.
    pub fn close_on_drop(&self) -> CloseOnDrop<'_> {
        CloseOnDrop(self)
    }
}

pub struct CloseOnDrop<'a>(&'a FrameQueue);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}
