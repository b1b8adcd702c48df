use std::collections::VecDeque;

/// FIFO of tasks waiting for a free execution slot
#[derive(Debug)]
pub struct DispatchQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for DispatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DispatchQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append to the tail. Retried and redirected tasks come back this way
    /// and lose their original position.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Remove from the head
    pub fn shift(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Takes every pending item in FIFO order, leaving the queue empty
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }
}
