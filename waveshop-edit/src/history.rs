//! Bounded linear undo/redo stack

use std::collections::VecDeque;

use tracing::trace;

/// Linear history with a cursor
///
/// Pushing discards everything after the cursor. When the stack grows past
/// its limit the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    cursor: Option<usize>,
    limit: usize,
}

impl<T> History<T> {
    /// History holding at most `limit` entries (minimum 1)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            cursor: None,
            limit,
        }
    }

    pub fn push(&mut self, entry: T) {
        match self.cursor {
            Some(cursor) => self.entries.truncate(cursor + 1),
            None => self.entries.clear(),
        }
        self.entries.push_back(entry);

        if self.entries.len() > self.limit {
            self.entries.pop_front();
            trace!(limit = self.limit, "history full, evicted oldest entry");
        }
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Step back; `None` when already at the oldest entry
    pub fn undo(&mut self) -> Option<&T> {
        let cursor = self.cursor.filter(|&c| c > 0)? - 1;
        self.cursor = Some(cursor);
        self.entries.get(cursor)
    }

    /// Step forward; `None` when already at the newest entry
    pub fn redo(&mut self) -> Option<&T> {
        let cursor = self.cursor.filter(|&c| c + 1 < self.entries.len())? + 1;
        self.cursor = Some(cursor);
        self.entries.get(cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    /// Entry under the cursor
    pub fn current(&self) -> Option<&T> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    /// Cursor position, `None` while empty
    pub fn index(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_keeps_newest() {
        let mut history = History::new(20);
        for i in 0..25 {
            history.push(i);
        }
        assert_eq!(history.len(), 20);
        assert_eq!(history.index(), Some(19));
        assert_eq!(history.current(), Some(&24));
        assert_eq!(history.iter().next(), Some(&5));

        for _ in 0..19 {
            assert!(history.undo().is_some());
        }
        assert_eq!(history.index(), Some(0));
        assert_eq!(history.current(), Some(&5));
        assert!(history.undo().is_none());
        assert_eq!(history.index(), Some(0));
    }

    #[test]
    fn test_undo_redo() {
        let mut history = History::new(10);
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());

        history.push("a");
        history.push("b");
        history.push("c");

        assert_eq!(history.undo(), Some(&"b"));
        assert_eq!(history.undo(), Some(&"a"));
        assert!(!history.can_undo());
        assert_eq!(history.redo(), Some(&"b"));
        assert!(history.can_redo());
        assert_eq!(history.redo(), Some(&"c"));
        assert!(history.redo().is_none());
    }

    #[test]
    fn test_push_discards_redo_branch() {
        let mut history = History::new(10);
        history.push(1);
        history.push(2);
        history.push(3);
        history.undo();
        history.undo();

        history.push(4);
        assert_eq!(history.iter().copied().collect::<Vec<_>>(), vec![1, 4]);
        assert!(!history.can_redo());
        assert_eq!(history.index(), Some(1));
    }

    #[test]
    fn test_zero_limit_holds_one() {
        let mut history = History::new(0);
        history.push(1);
        history.push(2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.current(), Some(&2));

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.index(), None);
    }
}
