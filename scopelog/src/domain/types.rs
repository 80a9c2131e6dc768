//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent common bugs like passing an entity id where
//! an owner key is expected, and make function signatures more expressive.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use scopelog_common::LogColor;

/// Identity of the object owning an entity
///
/// The registry looks entities up by key. The root context always uses
/// [`EntityKey::ROOT`]; every scope draws a fresh key from a process-wide
/// counter, so keys are never shared between scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(pub u64);

static NEXT_KEY: AtomicU64 = AtomicU64::new(1);

impl EntityKey {
    pub const ROOT: EntityKey = EntityKey(0);

    /// Allocate a key no other owner has used
    #[must_use]
    pub fn unique() -> Self {
        EntityKey(NEXT_KEY.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "root")
        } else {
            write!(f, "scope#{}", self.0)
        }
    }
}

/// Entity id as written to the log
///
/// Assigned on first registration, starting at 1. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity#{}", self.0)
    }
}

/// Timeline step stamped on every entity record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Frame(pub u64);

impl Frame {
    #[must_use]
    pub fn next(self) -> Frame {
        Frame(self.0 + 1)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame#{}", self.0)
    }
}

/// Process ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pid(pub u32);

impl Pid {
    /// PID of the current process
    #[must_use]
    pub fn current() -> Self {
        Pid(std::process::id())
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PID:{}", self.0)
    }
}

/// Severity of a host log line
///
/// The `Display` form is the category string written to `EntityLog` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Console color used for lines of this level
    #[must_use]
    pub fn color(self) -> LogColor {
        match self {
            LogLevel::Trace => LogColor::DarkGray,
            LogLevel::Debug => LogColor::Gray,
            LogLevel::Information => LogColor::White,
            LogLevel::Warning => LogColor::Yellow,
            LogLevel::Error => LogColor::Red,
            LogLevel::Critical => LogColor::Magenta,
        }
    }

    /// Matching level of the `log` facade
    #[must_use]
    pub fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Trace => log::Level::Trace,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Information => log::Level::Info,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Error | LogLevel::Critical => log::Level::Error,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Information => "Information",
            LogLevel::Warning => "Warning",
            LogLevel::Error => "Error",
            LogLevel::Critical => "Critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_display() {
        assert_eq!(EntityKey::ROOT.to_string(), "root");
        assert_eq!(EntityKey(12).to_string(), "scope#12");
    }

    #[test]
    fn test_unique_keys_never_root() {
        let a = EntityKey::unique();
        let b = EntityKey::unique();
        assert_ne!(a, b);
        assert!(!a.is_root());
        assert!(!b.is_root());
    }

    #[test]
    fn test_frame_next() {
        assert_eq!(Frame(0).next(), Frame(1));
        assert_eq!(Frame(41).next().to_string(), "Frame#42");
    }

    #[test]
    fn test_log_level_category_and_color() {
        assert_eq!(LogLevel::Information.to_string(), "Information");
        assert_eq!(LogLevel::Information.color(), LogColor::White);
        assert_eq!(LogLevel::Warning.color(), LogColor::Yellow);
        assert_eq!(LogLevel::Critical.as_log_level(), log::Level::Error);
    }

    #[test]
    fn test_pid_display() {
        assert_eq!(Pid(1234).to_string(), "PID:1234");
    }
}
