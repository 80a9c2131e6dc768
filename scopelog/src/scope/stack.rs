//! Persistent scope stack
//!
//! A [`ScopeStack`] is an immutable linked list: pushing or popping returns a
//! new stack and leaves the original untouched. Clones share their nodes, so
//! handing a snapshot to a forked task costs one reference count bump.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::domain::EntityKey;

/// A named, stack-disciplined region of execution
#[derive(Debug)]
pub struct Scope {
    name: String,
    key: EntityKey,
    depth: usize,
    created: Instant,
    ended: OnceLock<Instant>,
}

impl Scope {
    pub(crate) fn new(name: String, depth: usize) -> Self {
        Self { name, key: EntityKey::unique(), depth, created: Instant::now(), ended: OnceLock::new() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key of the entity tracking this scope
    #[must_use]
    pub fn key(&self) -> EntityKey {
        self.key
    }

    /// 1-based nesting depth (the outermost scope has depth 1)
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[must_use]
    pub fn creation_time(&self) -> Instant {
        self.created
    }

    /// `None` while the scope is still open
    #[must_use]
    pub fn destruction_time(&self) -> Option<Instant> {
        self.ended.get().copied()
    }

    /// Time between creation and destruction, once the scope has ended
    #[must_use]
    pub fn lifetime(&self) -> Option<Duration> {
        self.destruction_time().map(|end| end.duration_since(self.created))
    }

    pub(crate) fn mark_ended(&self) {
        let _ = self.ended.set(Instant::now());
    }
}

#[derive(Debug)]
struct Node {
    scope: Arc<Scope>,
    parent: Option<Arc<Node>>,
}

/// Immutable stack of scopes, innermost on top
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    head: Option<Arc<Node>>,
}

impl ScopeStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.top().map_or(0, |scope| scope.depth())
    }

    /// Innermost scope
    #[must_use]
    pub fn top(&self) -> Option<&Arc<Scope>> {
        self.head.as_ref().map(|node| &node.scope)
    }

    /// New stack with a scope named `name` on top
    #[must_use]
    pub fn push(&self, name: impl Into<String>) -> (Arc<Scope>, ScopeStack) {
        let scope = Arc::new(Scope::new(name.into(), self.depth() + 1));
        let node = Node { scope: Arc::clone(&scope), parent: self.head.clone() };
        (scope, ScopeStack { head: Some(Arc::new(node)) })
    }

    /// Stack without its innermost scope (empty stays empty)
    #[must_use]
    pub fn parent(&self) -> ScopeStack {
        ScopeStack { head: self.head.as_ref().and_then(|node| node.parent.clone()) }
    }

    /// Iterate innermost to outermost
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Scope>> {
        std::iter::successors(self.head.as_deref(), |node| node.parent.as_deref())
            .map(|node| &node.scope)
    }

    /// Scope names, innermost to outermost
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.iter().map(|scope| scope.name().to_string()).collect()
    }

    /// Scope names outermost first, joined with `/`
    #[must_use]
    pub fn path(&self) -> String {
        let mut names = self.names();
        names.reverse();
        names.join("/")
    }
}
