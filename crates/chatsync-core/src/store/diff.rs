// ── Ordered list diffing ──
//
// Turns two snapshots of an ordered, keyed list into the minimal set of
// inserts, removals, moves and in-place updates. Retained items on the
// longest increasing subsequence of their old positions stay put; every
// other retained item is reported as a move.

use std::collections::HashMap;
use std::hash::Hash;

use crate::model::{Channel, ChannelId, Member, Message, User};

/// Items that have a stable identity inside a list.
pub trait Keyed {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;
}

impl Keyed for Channel {
    type Key = ChannelId;

    fn key(&self) -> ChannelId {
        self.cid.clone()
    }
}

impl Keyed for Member {
    type Key = String;

    fn key(&self) -> String {
        self.user_id.clone()
    }
}

impl Keyed for User {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for Message {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// One difference between two list snapshots.
///
/// `Removed` and `Moved::from` index the old list; `Added`, `Updated` and
/// `Moved::to` index the new one.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Added { index: usize, item: T },
    Updated { index: usize, item: T },
    Moved { from: usize, to: usize, item: T },
    Removed { index: usize, item: T },
}

impl<T> Change<T> {
    pub fn item(&self) -> &T {
        match self {
            Self::Added { item, .. }
            | Self::Updated { item, .. }
            | Self::Moved { item, .. }
            | Self::Removed { item, .. } => item,
        }
    }
}

/// Diff `old` against `new`. Output order: removals (old positions,
/// descending), then inserts, moves and updates (new positions, ascending).
pub fn diff<T: Keyed + Clone + PartialEq>(old: &[T], new: &[T]) -> Vec<Change<T>> {
    let old_index: HashMap<T::Key, usize> =
        old.iter().enumerate().map(|(i, item)| (item.key(), i)).collect();
    let new_keys: HashMap<T::Key, usize> =
        new.iter().enumerate().map(|(i, item)| (item.key(), i)).collect();

    let mut changes = Vec::new();

    for (index, item) in old.iter().enumerate().rev() {
        if !new_keys.contains_key(&item.key()) {
            changes.push(Change::Removed {
                index,
                item: item.clone(),
            });
        }
    }

    // Old positions of retained items, in new order.
    let retained: Vec<(usize, usize)> = new
        .iter()
        .enumerate()
        .filter_map(|(to, item)| old_index.get(&item.key()).map(|&from| (from, to)))
        .collect();
    let olds: Vec<usize> = retained.iter().map(|&(from, _)| from).collect();
    let stable = longest_increasing(&olds);

    let mut retained_iter = retained.iter().enumerate().peekable();
    for (index, item) in new.iter().enumerate() {
        match retained_iter.peek() {
            Some(&(pos, &(from, to))) if to == index => {
                retained_iter.next();
                if !stable.contains(&pos) {
                    changes.push(Change::Moved {
                        from,
                        to,
                        item: item.clone(),
                    });
                } else if old.get(from) != Some(item) {
                    changes.push(Change::Updated {
                        index,
                        item: item.clone(),
                    });
                }
            }
            _ => changes.push(Change::Added {
                index,
                item: item.clone(),
            }),
        }
    }

    changes
}

/// Positions (into `seq`) of one longest strictly increasing subsequence.
fn longest_increasing(seq: &[usize]) -> std::collections::HashSet<usize> {
    // tails[k]: position in `seq` of the smallest tail of an increasing
    // run of length k + 1.
    let mut tails: Vec<usize> = Vec::new();
    let mut prev: Vec<Option<usize>> = vec![None; seq.len()];

    for (pos, &value) in seq.iter().enumerate() {
        let slot = tails.partition_point(|&t| seq[t] < value);
        if slot > 0 {
            prev[pos] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(pos);
        } else {
            tails[slot] = pos;
        }
    }

    let mut out = std::collections::HashSet::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(pos) = cursor {
        out.insert(pos);
        cursor = prev[pos];
    }
    out
}
