use std::{cell::RefCell, fmt, rc::Rc};

use crate::{ListenerResult, Message};

/// A recording listener.
///
/// Every message delivered to [`listener`](Self::listener) is kept in order
/// of arrival. Clones share the same record.
pub struct Spy<P> {
    records: Rc<RefCell<Vec<Message<P>>>>,
}

impl<P: Clone + 'static> Spy<P> {
    pub fn new() -> Self {
        Self {
            records: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// A listener that records each message and returns `R::default()`.
    pub fn listener<R: Default>(&self) -> impl Fn(&Message<P>) -> ListenerResult<R> + use<P, R> {
        let records = self.records.clone();
        move |message: &Message<P>| {
            records.borrow_mut().push(message.clone());
            Ok(R::default())
        }
    }

    /// Returns true if at least one message was recorded.
    pub fn was_called(&self) -> bool {
        !self.records.borrow().is_empty()
    }

    pub fn call_count(&self) -> usize {
        self.records.borrow().len()
    }

    /// Topics of the recorded messages, as the listener saw them.
    pub fn topics(&self) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .map(|m| m.topic().to_string())
            .collect()
    }

    pub fn payloads(&self) -> Vec<P> {
        self.records
            .borrow()
            .iter()
            .map(|m| m.payload().clone())
            .collect()
    }

    pub fn last(&self) -> Option<Message<P>> {
        self.records.borrow().last().cloned()
    }

    /// Recorded messages satisfying `predicate`.
    pub fn matching<F>(&self, predicate: F) -> Vec<Message<P>>
    where
        F: Fn(&Message<P>) -> bool,
    {
        self.records
            .borrow()
            .iter()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl<P: Clone + 'static> Default for Spy<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Clone for Spy<P> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl<P> fmt::Debug for Spy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spy")
            .field("calls", &self.records.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Emitter;

    #[test]
    fn records_in_arrival_order() {
        let emitter = Emitter::<u32>::default();
        let spy = Spy::new();
        emitter.on("a.*", spy.listener()).unwrap();

        emitter.emit("a.x", 1).unwrap();
        emitter.emit("b.x", 2).unwrap();
        emitter.emit("a.y", 3).unwrap();

        assert_eq!(spy.call_count(), 2);
        assert_eq!(spy.topics(), ["a.x", "a.y"]);
        assert_eq!(spy.payloads(), [1, 3]);
        assert_eq!(spy.last().map(|m| *m.payload()), Some(3));
    }

    #[test]
    fn clones_share_the_record() {
        let spy = Spy::<u32>::new();
        let other = spy.clone();
        let listener = other.listener::<()>();
        listener(&Message::new("t", 9)).unwrap();

        assert!(spy.was_called());
        assert_eq!(spy.matching(|m| *m.payload() == 9).len(), 1);
        spy.clear();
        assert!(!other.was_called());
    }
}
