use std::{fmt, sync::Arc};

/// A single filter condition, usually natural language.
///
/// The crate never looks inside a predicate; translators and classifiers do.
pub type Predicate = Arc<str>;

/// Ordered, append-only list of predicates.
///
/// Appending never touches the receiver: [`PredicateList::push`] returns a new
/// list whose prefix is shared with the old one. Two lists pushed from the same
/// parent see only their own last element, so branches never leak into each
/// other.
#[derive(Clone, Default)]
pub struct PredicateList {
    tail: Option<Arc<Node>>,
}

struct Node {
    predicate: Predicate,
    prev: Option<Arc<Node>>,
    len: usize,
}

impl PredicateList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new list equal to `self` with `predicate` appended.
    pub fn push(&self, predicate: impl Into<Predicate>) -> Self {
        let node = Node {
            predicate: predicate.into(),
            prev: self.tail.clone(),
            len: self.len() + 1,
        };
        Self {
            tail: Some(Arc::new(node)),
        }
    }

    /// Get the number of predicates in the list
    pub fn len(&self) -> usize {
        self.tail.as_ref().map_or(0, |node| node.len)
    }

    /// Check if no predicate has been added
    pub fn is_empty(&self) -> bool {
        self.tail.is_none()
    }

    /// Most recently appended predicate
    pub fn last(&self) -> Option<&Predicate> {
        self.tail.as_ref().map(|node| &node.predicate)
    }

    /// Predicates in insertion order
    pub fn to_vec(&self) -> Vec<Predicate> {
        let mut out = Vec::with_capacity(self.len());
        let mut cursor = self.tail.as_deref();
        while let Some(node) = cursor {
            out.push(node.predicate.clone());
            cursor = node.prev.as_deref();
        }
        out.reverse();
        out
    }

    /// Iterate predicates in insertion order
    pub fn iter(&self) -> impl Iterator<Item = Predicate> {
        self.to_vec().into_iter()
    }
}

impl<P: Into<Predicate>> FromIterator<P> for PredicateList {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PredicateList::new(), |list, predicate| list.push(predicate))
    }
}

impl PartialEq for PredicateList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.to_vec() == other.to_vec()
    }
}

impl Eq for PredicateList {}

impl fmt::Debug for PredicateList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}

// Iterative drop; a long chain would otherwise recurse once per node.
impl Drop for PredicateList {
    fn drop(&mut self) {
        let mut cursor = self.tail.take();
        while let Some(node) = cursor {
            match Arc::try_unwrap(node) {
                Ok(mut node) => cursor = node.prev.take(),
                Err(_) => break,
            }
        }
    }
}
