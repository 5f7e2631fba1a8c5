//! Local notification list.
//!
//! Newest first, de-duplicated by id, bounded.  Read state is tracked
//! locally and mirrored upstream by the caller through the channel.

use std::collections::HashSet;

use crate::channel::Notification;

/// Oldest entries are dropped beyond this.
const MAX_ENTRIES: usize = 200;

#[derive(Debug, Default)]
pub struct Inbox {
    items: Vec<Notification>,
    seen: HashSet<String>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the top.  Returns `false` for an id already present.
    pub fn push(&mut self, notification: Notification) -> bool {
        if !self.seen.insert(notification.id.clone()) {
            return false;
        }
        self.items.insert(0, notification);
        if self.items.len() > MAX_ENTRIES {
            for dropped in self.items.drain(MAX_ENTRIES..) {
                self.seen.remove(&dropped.id);
            }
        }
        true
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread(&self) -> usize {
        self.items.iter().filter(|n| !n.read).count()
    }

    /// Returns whether anything changed.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    /// Returns how many entries flipped to read.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for n in self.items.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            kind: "like".to_string(),
            actor: None,
            message: format!("notification {id}"),
            read: false,
            created_at: None,
        }
    }

    #[test]
    fn newest_first_and_deduplicated() {
        let mut inbox = Inbox::new();
        assert!(inbox.push(note("a")));
        assert!(inbox.push(note("b")));
        assert!(!inbox.push(note("a")));

        let ids: Vec<_> = inbox.items().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(inbox.unread(), 2);
    }

    #[test]
    fn mark_read_only_reports_real_changes() {
        let mut inbox = Inbox::new();
        inbox.push(note("a"));
        assert!(inbox.mark_read("a"));
        assert!(!inbox.mark_read("a"));
        assert!(!inbox.mark_read("missing"));
        assert_eq!(inbox.unread(), 0);
    }

    #[test]
    fn mark_all_read_counts_flips() {
        let mut inbox = Inbox::new();
        inbox.push(note("a"));
        inbox.push(note("b"));
        inbox.mark_read("a");
        assert_eq!(inbox.mark_all_read(), 1);
        assert_eq!(inbox.mark_all_read(), 0);
    }

    #[test]
    fn bounded_size_forgets_dropped_ids() {
        let mut inbox = Inbox::new();
        for i in 0..=MAX_ENTRIES {
            inbox.push(note(&i.to_string()));
        }
        assert_eq!(inbox.len(), MAX_ENTRIES);
        // "0" was the oldest and fell off, so it can come back.
        assert!(inbox.push(note("0")));
    }
}
