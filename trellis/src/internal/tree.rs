use std::{collections::HashMap, rc::Rc};

use crate::{
    ListenerId, Message,
    listener::{Entry, Location},
    topic::{MULTI_WILDCARD, SINGLE_WILDCARD, Topic, is_wildcard},
};

type EntryRef<P, R> = Rc<Entry<P, R>>;

pub(crate) struct Node<P, R> {
    listeners: Vec<EntryRef<P, R>>,
    once: Vec<EntryRef<P, R>>,
    retained: Option<Message<P>>,
    children: HashMap<String, Node<P, R>>,
}

impl<P, R> Default for Node<P, R> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            once: Vec::new(),
            retained: None,
            children: HashMap::new(),
        }
    }
}

impl<P, R> Node<P, R> {
    fn child(&self, path: &[String]) -> Option<&Node<P, R>> {
        path.iter()
            .try_fold(self, |node, segment| node.children.get(segment))
    }

    fn child_mut(&mut self, path: &[String]) -> Option<&mut Node<P, R>> {
        path.iter()
            .try_fold(self, |node, segment| node.children.get_mut(segment))
    }

    fn child_or_insert(&mut self, path: &[String]) -> &mut Node<P, R> {
        path.iter().fold(self, |node, segment| {
            node.children.entry(segment.clone()).or_default()
        })
    }

    fn own_count(&self) -> usize {
        self.listeners.len() + self.once.len()
    }

    fn subtree_count(&self) -> usize {
        self.own_count()
            + self
                .children
                .values()
                .map(Node::subtree_count)
                .sum::<usize>()
    }

    fn remove(&mut self, id: ListenerId) -> Option<EntryRef<P, R>> {
        take_by_id(&mut self.listeners, id).or_else(|| take_by_id(&mut self.once, id))
    }

    fn remove_anywhere(&mut self, id: ListenerId) -> Option<EntryRef<P, R>> {
        if let Some(entry) = self.remove(id) {
            return Some(entry);
        }
        self.children
            .values_mut()
            .find_map(|child| child.remove_anywhere(id))
    }

    fn drain_own(&mut self, out: &mut Vec<EntryRef<P, R>>) {
        out.append(&mut self.listeners);
        out.append(&mut self.once);
    }

    fn drain_subtree(&mut self, out: &mut Vec<EntryRef<P, R>>) {
        self.drain_own(out);
        for child in self.children.values_mut() {
            child.drain_subtree(out);
        }
    }

    /// Fire-set of this node: permanent listeners, then once-listeners.
    /// Once-listeners leave the node as they are selected.
    fn select(&mut self, out: &mut Vec<EntryRef<P, R>>) {
        out.extend(self.listeners.iter().cloned());
        out.append(&mut self.once);
    }

    /// Depth-first walk: literal child, then `*`, then `**`.
    fn collect(&mut self, rest: &[String], out: &mut Vec<EntryRef<P, R>>) {
        let Some((segment, tail)) = rest.split_first() else {
            self.select(out);
            return;
        };
        if let Some(literal) = self.children.get_mut(segment) {
            literal.collect(tail, out);
        }
        if let Some(single) = self.children.get_mut(SINGLE_WILDCARD) {
            single.collect(tail, out);
        }
        if let Some(multi) = self.children.get_mut(MULTI_WILDCARD) {
            multi.select(out);
        }
    }

    fn collect_retained<'a>(&'a self, out: &mut Vec<&'a Message<P>>) {
        if let Some(message) = &self.retained {
            out.push(message);
        }
        for child in self.children.values() {
            child.collect_retained(out);
        }
    }
}

fn is_below(location: &Location, path: &[String]) -> bool {
    matches!(location, Location::Path(p) if p.len() > path.len() && p.starts_with(path))
}

fn take_by_id<P, R>(list: &mut Vec<EntryRef<P, R>>, id: ListenerId) -> Option<EntryRef<P, R>> {
    let pos = list.iter().position(|e| e.id == id)?;
    Some(list.remove(pos))
}

/// Trie of subscriptions keyed by topic segment.
///
/// Wildcard tokens are ordinary keys in the children map. Nodes are created
/// lazily and only removed by [`clear_under`](Self::clear_under) and
/// [`clear`](Self::clear).
///
/// Once-listeners selected by [`collect`](Self::collect) leave their node but
/// stay reachable in `pending` until dispatch settles them, so removals made
/// by listeners mid-dispatch still find them.
pub(crate) struct Tree<P, R> {
    root: Node<P, R>,
    any: Vec<EntryRef<P, R>>,
    pending: Vec<EntryRef<P, R>>,
    last_id: u64,
}

impl<P, R> Default for Tree<P, R> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            any: Vec::new(),
            pending: Vec::new(),
            last_id: 0,
        }
    }
}

impl<P, R> Tree<P, R> {
    pub(crate) fn next_id(&mut self) -> ListenerId {
        self.last_id += 1;
        ListenerId::new(self.last_id)
    }

    /// Register an entry at its location.
    ///
    /// Returns the retained message of the terminal node when the entry is
    /// a permanent listener on a wildcard-free path.
    pub(crate) fn insert(&mut self, entry: EntryRef<P, R>) -> Option<Message<P>>
    where
        P: Clone,
    {
        let path = match &entry.location {
            Location::Any => None,
            Location::Path(path) => Some(path.clone()),
        };
        let Some(path) = path else {
            self.any.push(entry);
            return None;
        };

        let replay = !entry.once && !path.iter().any(|s| is_wildcard(s));
        let node = self.root.child_or_insert(&path);
        if entry.once {
            node.once.push(entry);
        } else {
            node.listeners.push(entry);
        }
        if replay { node.retained.clone() } else { None }
    }

    /// Remove one registration from the node it was inserted into.
    pub(crate) fn remove(&mut self, location: &Location, id: ListenerId) -> Option<EntryRef<P, R>> {
        let found = match location {
            Location::Any => take_by_id(&mut self.any, id),
            Location::Path(path) => self.root.child_mut(path).and_then(|node| node.remove(id)),
        };
        found.or_else(|| take_by_id(&mut self.pending, id))
    }

    /// Remove one registration wherever it lives.
    pub(crate) fn remove_anywhere(&mut self, id: ListenerId) -> Option<EntryRef<P, R>> {
        take_by_id(&mut self.any, id)
            .or_else(|| self.root.remove_anywhere(id))
            .or_else(|| take_by_id(&mut self.pending, id))
    }

    /// Remove one registration living strictly below `path`.
    pub(crate) fn remove_under(&mut self, path: &[String], id: ListenerId) -> Option<EntryRef<P, R>> {
        let found = self.root.child_mut(path).and_then(|node| {
            node.children
                .values_mut()
                .find_map(|child| child.remove_anywhere(id))
        });
        found.or_else(|| {
            let pos = self
                .pending
                .iter()
                .position(|e| e.id == id && is_below(&e.location, path))?;
            Some(self.pending.remove(pos))
        })
    }

    /// Remove every registration made with exactly this path.
    pub(crate) fn remove_all_at(&mut self, path: &[String]) -> Vec<EntryRef<P, R>> {
        let mut removed = Vec::new();
        if let Some(node) = self.root.child_mut(path) {
            node.drain_own(&mut removed);
        }
        removed.extend(self.take_pending(|e| matches!(&e.location, Location::Path(p) if p == path)));
        removed
    }

    /// Entries to invoke for `topic`, in dispatch order.
    ///
    /// Path matches come first, root-level "any" listeners last. Selected
    /// once-listeners leave their node and are parked as pending until
    /// [`settle`](Self::settle) or [`restore_once`](Self::restore_once).
    pub(crate) fn collect(&mut self, topic: &Topic) -> Vec<EntryRef<P, R>> {
        let mut out = Vec::new();
        self.root.collect(topic.segments(), &mut out);
        self.pending.extend(out.iter().filter(|e| e.once).cloned());
        out.extend(self.any.iter().cloned());
        out
    }

    /// Mark a selected once-listener as fired. Returns false if it was
    /// removed since it was selected.
    pub(crate) fn settle(&mut self, id: ListenerId) -> bool {
        take_by_id(&mut self.pending, id).is_some()
    }

    /// Put back once-listeners that were selected but never invoked.
    /// Entries removed in the meantime stay removed.
    pub(crate) fn restore_once(&mut self, entries: Vec<EntryRef<P, R>>) {
        for entry in entries.into_iter().rev() {
            if !self.settle(entry.id) {
                continue;
            }
            if let Location::Path(path) = &entry.location {
                let node = self.root.child_or_insert(path);
                node.once.insert(0, entry);
            }
        }
    }

    /// Store `message` as the retained value of the exact node at `topic`.
    pub(crate) fn retain(&mut self, topic: &Topic, message: Message<P>) {
        self.root.child_or_insert(topic.segments()).retained = Some(message);
    }

    pub(crate) fn retained(&self) -> Vec<&Message<P>> {
        let mut out = Vec::new();
        self.root.collect_retained(&mut out);
        out
    }

    /// Retained messages strictly below `path`.
    pub(crate) fn retained_under(&self, path: &[String]) -> Vec<&Message<P>> {
        let mut out = Vec::new();
        if let Some(node) = self.root.child(path) {
            for child in node.children.values() {
                child.collect_retained(&mut out);
            }
        }
        out
    }

    /// Destroy every node strictly below `path`, listeners and retained
    /// messages included. The node at `path` keeps its own listeners.
    pub(crate) fn clear_under(&mut self, path: &[String]) -> Vec<EntryRef<P, R>> {
        let mut removed = Vec::new();
        if let Some(node) = self.root.child_mut(path) {
            for child in node.children.values_mut() {
                child.drain_subtree(&mut removed);
            }
            node.children.clear();
        }
        removed.extend(self.take_pending(|e| is_below(&e.location, path)));
        removed
    }

    /// Reset to an empty tree. Listener ids keep counting up.
    pub(crate) fn clear(&mut self) -> Vec<EntryRef<P, R>> {
        let mut removed = std::mem::take(&mut self.any);
        self.root.drain_subtree(&mut removed);
        removed.append(&mut self.pending);
        self.root = Node::default();
        removed
    }

    fn take_pending<F>(&mut self, select: F) -> Vec<EntryRef<P, R>>
    where
        F: Fn(&Entry<P, R>) -> bool,
    {
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|e| select(e));
        self.pending = kept;
        taken
    }

    pub(crate) fn count(&self) -> usize {
        self.any.len() + self.root.subtree_count()
    }

    pub(crate) fn count_at(&self, location: &Location) -> usize {
        match location {
            Location::Any => self.any.len(),
            Location::Path(path) => self.root.child(path).map_or(0, Node::own_count),
        }
    }

    pub(crate) fn count_under(&self, path: &[String]) -> usize {
        self.root.child(path).map_or(0, |node| {
            node.children.values().map(Node::subtree_count).sum()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{ListenerResult, listener::Callback, topic::Pattern};

    type TestTree = Tree<u32, &'static str>;

    fn add(tree: &mut TestTree, pattern: &str, name: &'static str, once: bool) -> ListenerId {
        let id = tree.next_id();
        let location = if pattern == "<any>" {
            Location::Any
        } else {
            Location::Path(Pattern::parse(pattern, ".").unwrap().segments().to_vec())
        };
        tree.insert(Rc::new(Entry {
            id,
            pattern: Arc::from(pattern),
            location,
            once,
            callback: named(name),
        }));
        id
    }

    fn named(name: &'static str) -> Callback<u32, &'static str> {
        Rc::new(move |_: &Message<u32>| -> Option<ListenerResult<&'static str>> { Some(Ok(name)) })
    }

    fn fired(tree: &mut TestTree, topic: &str) -> Vec<&'static str> {
        let topic = Topic::parse(topic, ".").unwrap();
        let msg = Message::new("ignored", 0);
        tree.collect(&topic)
            .iter()
            .filter_map(|e| (e.callback)(&msg))
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn traversal_order_is_literal_single_multi_then_any() {
        let mut tree = TestTree::default();
        add(&mut tree, "<any>", "any", false);
        add(&mut tree, "a.**", "a.**", false);
        add(&mut tree, "a.*.c", "a.*.c", false);
        add(&mut tree, "a.b.c", "a.b.c", false);
        add(&mut tree, "*.b.c", "*.b.c", false);
        add(&mut tree, "**", "**", false);

        assert_eq!(
            fired(&mut tree, "a.b.c"),
            ["a.b.c", "a.*.c", "a.**", "*.b.c", "**", "any"]
        );
    }

    #[test]
    fn multi_wildcard_node_does_not_fire_at_its_own_depth() {
        let mut tree = TestTree::default();
        add(&mut tree, "a.**", "multi", false);
        assert!(fired(&mut tree, "a").is_empty());
        assert_eq!(fired(&mut tree, "a.b"), ["multi"]);
        assert_eq!(fired(&mut tree, "a.b.c.d"), ["multi"]);
    }

    #[test]
    fn once_listeners_fire_after_permanent_and_are_consumed() {
        let mut tree = TestTree::default();
        add(&mut tree, "x", "once", true);
        add(&mut tree, "x", "perm", false);
        assert_eq!(fired(&mut tree, "x"), ["perm", "once"]);
        assert_eq!(fired(&mut tree, "x"), ["perm"]);
        assert_eq!(tree.count(), 1);
    }

    #[test]
    fn restore_once_puts_entries_back_in_order() {
        let mut tree = TestTree::default();
        add(&mut tree, "x", "first", true);
        add(&mut tree, "x", "second", true);
        let topic = Topic::parse("x", ".").unwrap();
        let selected = tree.collect(&topic);
        assert_eq!(tree.count(), 0);
        tree.restore_once(selected);
        assert_eq!(fired(&mut tree, "x"), ["first", "second"]);
    }

    #[test]
    fn removed_pending_entries_are_not_restored() {
        let mut tree = TestTree::default();
        let gone = add(&mut tree, "x", "gone", true);
        add(&mut tree, "x", "kept", true);
        let loc = Location::Path(vec!["x".into()]);
        let selected = tree.collect(&Topic::parse("x", ".").unwrap());

        assert!(tree.remove(&loc, gone).is_some());
        assert!(tree.remove(&loc, gone).is_none());
        tree.restore_once(selected);

        assert_eq!(fired(&mut tree, "x"), ["kept"]);
    }

    #[test]
    fn settled_entries_cannot_be_removed_or_restored() {
        let mut tree = TestTree::default();
        let id = add(&mut tree, "x", "once", true);
        let selected = tree.collect(&Topic::parse("x", ".").unwrap());

        assert!(tree.settle(id));
        assert!(tree.remove_anywhere(id).is_none());
        tree.restore_once(selected);
        assert_eq!(tree.count(), 0);
    }

    #[test]
    fn clearing_reaches_pending_entries() {
        let mut tree = TestTree::default();
        add(&mut tree, "user.a", "a", true);
        add(&mut tree, "other", "other", true);
        let user = tree.collect(&Topic::parse("user.a", ".").unwrap());
        let other = tree.collect(&Topic::parse("other", ".").unwrap());

        assert_eq!(tree.clear_under(&["user".to_string()]).len(), 1);
        tree.restore_once(user);
        assert_eq!(tree.count_under(&["user".to_string()]), 0);

        assert_eq!(tree.clear().len(), 1);
        tree.restore_once(other);
        assert_eq!(tree.count(), 0);
    }

    #[test]
    fn remove_under_ignores_registrations_outside_the_path() {
        let mut tree = TestTree::default();
        let inside = add(&mut tree, "svc.a.b", "inside", false);
        let outside = add(&mut tree, "other.a", "outside", false);
        let own = add(&mut tree, "svc", "own", false);
        let path = vec!["svc".to_string()];

        assert!(tree.remove_under(&path, outside).is_none());
        assert!(tree.remove_under(&path, own).is_none());
        assert!(tree.remove_under(&path, inside).is_some());
        assert_eq!(tree.count(), 2);
    }

    #[test]
    fn remove_targets_exact_registration() {
        let mut tree = TestTree::default();
        let a = add(&mut tree, "x", "a", false);
        add(&mut tree, "x", "b", false);
        let loc = Location::Path(vec!["x".into()]);

        assert!(tree.remove(&loc, a).is_some());
        assert!(tree.remove(&loc, a).is_none());
        assert_eq!(fired(&mut tree, "x"), ["b"]);
    }

    #[test]
    fn remove_anywhere_finds_nested_and_any() {
        let mut tree = TestTree::default();
        let deep = add(&mut tree, "a.b.*", "deep", false);
        let any = add(&mut tree, "<any>", "any", false);
        assert!(tree.remove_anywhere(deep).is_some());
        assert!(tree.remove_anywhere(any).is_some());
        assert_eq!(tree.count(), 0);
    }

    #[test]
    fn retained_is_returned_only_for_permanent_literal_inserts() {
        let mut tree = TestTree::default();
        let topic = Topic::parse("a.b", ".").unwrap();
        tree.retain(&topic, Message::new("a.b", 7));

        let id = tree.next_id();
        let replay = tree.insert(Rc::new(Entry {
            id,
            pattern: Arc::from("a.b"),
            location: Location::Path(vec!["a".into(), "b".into()]),
            once: false,
            callback: named("l"),
        }));
        assert_eq!(replay.map(|m| *m.payload()), Some(7));

        let id = tree.next_id();
        let replay = tree.insert(Rc::new(Entry {
            id,
            pattern: Arc::from("a.*"),
            location: Location::Path(vec!["a".into(), "*".into()]),
            once: false,
            callback: named("w"),
        }));
        assert!(replay.is_none());
    }

    #[test]
    fn clear_under_keeps_prefix_node_and_siblings() {
        let mut tree = TestTree::default();
        add(&mut tree, "user", "own", false);
        add(&mut tree, "user.a", "a", false);
        add(&mut tree, "user.a.b", "ab", false);
        add(&mut tree, "user.**", "all", false);
        add(&mut tree, "other.a", "other", false);
        tree.retain(&Topic::parse("user.a", ".").unwrap(), Message::new("user.a", 1));
        tree.retain(&Topic::parse("user", ".").unwrap(), Message::new("user", 2));

        let path = vec!["user".to_string()];
        assert_eq!(tree.count_under(&path), 3);
        assert_eq!(tree.clear_under(&path).len(), 3);
        assert_eq!(tree.count(), 2);
        assert_eq!(tree.retained().len(), 1);
        assert_eq!(fired(&mut tree, "user"), ["own"]);
        assert_eq!(fired(&mut tree, "other.a"), ["other"]);
    }

    #[test]
    fn clear_drops_everything() {
        let mut tree = TestTree::default();
        add(&mut tree, "a", "a", false);
        add(&mut tree, "<any>", "any", false);
        tree.retain(&Topic::parse("a", ".").unwrap(), Message::new("a", 1));
        assert_eq!(tree.clear().len(), 2);
        assert_eq!(tree.count(), 0);
        assert!(tree.retained().is_empty());
    }
}
