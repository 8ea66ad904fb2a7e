use serde::{Deserialize, Serialize};

/// Correlates a confirmation step with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pending confirmations, resolved newest-first unless a caller names an id.
#[derive(Debug)]
pub struct PendingQueue<T> {
    entries: Vec<(RequestId, T)>,
    next_id: u64,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, entry: T) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push((id, entry));
        id
    }

    /// Remove the most recently enqueued entry.
    pub fn pop_latest(&mut self) -> Option<(RequestId, T)> {
        self.entries.pop()
    }

    pub fn take(&mut self, id: RequestId) -> Option<T> {
        let pos = self.entries.iter().position(|(i, _)| *i == id)?;
        Some(self.entries.remove(pos).1)
    }

    /// The oldest entry matching `pred`, left in place.
    pub fn find_mut(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<(RequestId, &mut T)> {
        self.entries
            .iter_mut()
            .find(|(_, e)| pred(e))
            .map(|(id, e)| (*id, e))
    }

    /// `take(id)` when an id is given, otherwise `pop_latest`.
    pub fn resolve(&mut self, id: Option<RequestId>) -> Option<(RequestId, T)> {
        match id {
            Some(id) => self.take(id).map(|e| (id, e)),
            None => self.pop_latest(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
