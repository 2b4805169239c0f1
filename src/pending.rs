//! Deadline-ordered list of armed alarms.
//!
//! Entries are `(deadline, alarm)` pairs kept sorted non-decreasing by
//! deadline, earliest at the front. The deadline is captured at insertion
//! and is stable while the entry is in the list: an alarm is always removed
//! before its deadline is recomputed. Ties keep insertion order, so alarms
//! that share a deadline fire in the order they were scheduled.
//!
//! The list is short in practice and is only touched under the service
//! monitor, so a sorted vector with linear removal is sufficient.

use crate::alarm::Alarm;

pub(crate) struct PendingList {
    entries: Vec<(u64, Alarm)>,
}

impl PendingList {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The entry with the earliest deadline.
    pub(crate) fn front(&self) -> Option<&(u64, Alarm)> {
        self.entries.first()
    }

    /// Insert after every entry with a deadline less than or equal to
    /// `deadline_ms` (equal deadlines never preempt each other).
    ///
    /// The alarm must not already be in the list.
    pub(crate) fn insert(&mut self, deadline_ms: u64, alarm: Alarm) {
        debug_assert!(
            !self.entries.iter().any(|(_, entry)| entry.same(&alarm)),
            "alarm `{}` is already pending",
            alarm.name()
        );
        let pos = self
            .entries
            .partition_point(|&(entry_deadline, _)| entry_deadline <= deadline_ms);
        self.entries.insert(pos, (deadline_ms, alarm));
        debug_assert!(self.is_sorted());
    }

    /// Remove the alarm if present. Returns whether it was in the list.
    pub(crate) fn remove(&mut self, alarm: &Alarm) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, entry)| !entry.same(alarm));
        self.entries.len() != before
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &(u64, Alarm)> {
        self.entries.iter()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    fn is_sorted(&self) -> bool {
        self.entries
            .windows(2)
            .all(|pair| pair[0].0 <= pair[1].0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alarm(name: &str) -> Alarm {
        Alarm::new(name).expect("alarm creation failed")
    }

    #[test]
    fn keeps_entries_sorted_by_deadline() {
        let mut list = PendingList::new();
        list.insert(300, alarm("c"));
        list.insert(100, alarm("a"));
        list.insert(200, alarm("b"));

        let deadlines: Vec<u64> = list.iter().map(|&(deadline, _)| deadline).collect();
        assert_eq!(deadlines, vec![100, 200, 300]);
        assert_eq!(list.front().map(|&(deadline, _)| deadline), Some(100));
    }

    #[test]
    fn equal_deadlines_keep_insertion_order() {
        let mut list = PendingList::new();
        list.insert(100, alarm("first"));
        list.insert(100, alarm("second"));
        list.insert(50, alarm("early"));

        let names: Vec<&str> = list.iter().map(|(_, entry)| entry.name()).collect();
        assert_eq!(names, vec!["early", "first", "second"]);
    }

    #[test]
    fn remove_by_identity_not_name() {
        let mut list = PendingList::new();
        let a = alarm("dup");
        let b = alarm("dup");
        list.insert(100, a.clone());
        list.insert(200, b.clone());

        assert!(list.remove(&a));
        assert_eq!(list.iter().count(), 1);
        assert!(list.front().is_some_and(|(_, entry)| entry.same(&b)));
        assert!(!list.remove(&a));
    }

    #[test]
    fn clear_empties_the_list() {
        let mut list = PendingList::new();
        list.insert(10, alarm("x"));
        assert_eq!(list.iter().count(), 1);
        list.clear();
        assert_eq!(list.iter().count(), 0);
        assert!(list.front().is_none());
    }
}
