//! Per-task current scope tracking
//!
//! Each logical task sees its own [`ScopeStack`] through a task-local slot.
//! [`fork`] snapshots the caller's stack into a fresh slot for the child, so
//! pushes and pops in one branch never leak into the parent or a sibling.
//!
//! Tokio tasks started without [`fork`] or [`spawn`] have no slot. Their
//! stacks are kept in a table keyed by task id, starting empty, and dropped
//! once they empty again. Code running outside any tokio task falls back to a
//! per-thread stack.

use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use tokio::task::{self, JoinHandle};

use super::stack::{Scope, ScopeStack};

tokio::task_local! {
    static TASK_STACK: RefCell<ScopeStack>;
}

thread_local! {
    static THREAD_STACK: RefCell<ScopeStack> = RefCell::new(ScopeStack::new());
}

type UnforkedStacks = Mutex<HashMap<task::Id, ScopeStack>>;

fn unforked_stacks() -> &'static UnforkedStacks {
    static STACKS: OnceLock<UnforkedStacks> = OnceLock::new();
    STACKS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Stack of the calling logical task
#[must_use]
pub fn current() -> ScopeStack {
    if let Ok(stack) = TASK_STACK.try_with(|stack| stack.borrow().clone()) {
        return stack;
    }
    match task::try_id() {
        Some(id) => unforked_stacks()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .unwrap_or_default(),
        None => THREAD_STACK.with(|stack| stack.borrow().clone()),
    }
}

/// Scope names of the calling task, innermost to outermost
#[must_use]
pub fn current_names() -> Vec<String> {
    current().names()
}

fn set_current(next: ScopeStack) {
    if TASK_STACK.try_with(|stack| *stack.borrow_mut() = next.clone()).is_ok() {
        return;
    }
    match task::try_id() {
        Some(id) => {
            let mut stacks = unforked_stacks().lock().unwrap_or_else(PoisonError::into_inner);
            if next.is_empty() {
                stacks.remove(&id);
            } else {
                stacks.insert(id, next);
            }
        }
        None => THREAD_STACK.with(|stack| *stack.borrow_mut() = next),
    }
}

/// Run `future` with its own copy of the caller's scope stack.
///
/// The snapshot is taken when `fork` is called, not when the future is first
/// polled.
pub fn fork<F: Future>(future: F) -> impl Future<Output = F::Output> {
    TASK_STACK.scope(RefCell::new(current()), future)
}

/// Synchronous counterpart of [`fork`].
pub fn fork_sync<R>(f: impl FnOnce() -> R) -> R {
    TASK_STACK.sync_scope(RefCell::new(current()), f)
}

/// Spawn a tokio task that inherits a snapshot of the caller's scope stack.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(fork(future))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeEventKind {
    Pushed,
    Popped,
}

/// Lifecycle notification delivered to observers
///
/// For `Pushed`, `stack` already contains `scope`. For `Popped`, `stack` is
/// the stack just before `scope` is removed.
#[derive(Debug)]
pub struct ScopeEvent<'a> {
    pub kind: ScopeEventKind,
    pub scope: &'a Arc<Scope>,
    pub stack: &'a ScopeStack,
}

type Observer = Box<dyn Fn(&ScopeEvent<'_>) + Send + Sync>;

/// Opens scopes on the calling task's stack and notifies observers
///
/// Observers run synchronously inside `begin_scope` and scope end. They must
/// not subscribe further observers from within a notification.
#[derive(Default)]
pub struct ScopeTracker {
    observers: RwLock<Vec<Observer>>,
}

impl std::fmt::Debug for ScopeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.observers.read().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("ScopeTracker").field("observers", &count).finish()
    }
}

impl ScopeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for push/pop notifications
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&ScopeEvent<'_>) + Send + Sync + 'static,
    {
        self.observers.write().unwrap_or_else(PoisonError::into_inner).push(Box::new(observer));
    }

    /// Push a scope named `name` onto the calling task's stack.
    ///
    /// The scope ends when the returned guard is dropped or [`ScopeGuard::end`]
    /// is called.
    pub fn begin_scope(self: &Arc<Self>, name: impl Into<String>) -> ScopeGuard {
        let (scope, stack) = current().push(name);
        set_current(stack.clone());
        self.notify(ScopeEventKind::Pushed, &scope, &stack);
        ScopeGuard { tracker: Arc::clone(self), scope }
    }

    fn end_scope(&self, scope: &Arc<Scope>) {
        let stack = current();
        match stack.top() {
            Some(top) if Arc::ptr_eq(top, scope) => {}
            top => {
                if std::thread::panicking() {
                    return;
                }
                let found = top.map_or_else(
                    || "an empty stack".to_string(),
                    |top| format!("'{}' at depth {}", top.name(), top.depth()),
                );
                panic!(
                    "Scope stack violation: ending '{}' at depth {} but the current task's \
                     innermost scope is {found}",
                    scope.name(),
                    scope.depth(),
                );
            }
        }

        scope.mark_ended();
        self.notify(ScopeEventKind::Popped, scope, &stack);
        set_current(stack.parent());
    }

    fn notify(&self, kind: ScopeEventKind, scope: &Arc<Scope>, stack: &ScopeStack) {
        let event = ScopeEvent { kind, scope, stack };
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer(&event);
        }
    }
}

/// Handle to an open scope; ends it on drop
#[must_use = "the scope ends as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    tracker: Arc<ScopeTracker>,
    scope: Arc<Scope>,
}

impl ScopeGuard {
    #[must_use]
    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    /// End the scope now
    pub fn end(self) {
        drop(self);
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.tracker.end_scope(&self.scope);
    }
}
