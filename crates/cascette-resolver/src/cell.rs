//! Parse-once cell for lazily loaded tables

use crate::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Observable state of a [`TableCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellState {
    /// Not parsed yet, or the last attempt failed
    Unparsed,
    /// A thread holds the lock and is parsing
    Parsing,
    /// Parsed and published
    Parsed,
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unparsed => "unparsed",
            Self::Parsing => "parsing",
            Self::Parsed => "parsed",
        })
    }
}

/// Holds a value that is built at most once per cell.
///
/// Readers of a published value take no lock. The first caller of
/// [`get_or_try_init`](Self::get_or_try_init) takes the mutex and runs the
/// initialiser; concurrent callers block on the mutex and then see the
/// published value. If the initialiser fails nothing is published and the
/// next caller tries again.
pub struct TableCell<T> {
    value: OnceLock<Arc<T>>,
    init_lock: Mutex<()>,
    parsing: AtomicBool,
}

impl<T> Default for TableCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableCell")
            .field("state", &self.state())
            .finish()
    }
}

impl<T> TableCell<T> {
    /// Empty cell.
    pub fn new() -> Self {
        Self {
            value: OnceLock::new(),
            init_lock: Mutex::new(()),
            parsing: AtomicBool::new(false),
        }
    }

    /// Current state.
    pub fn state(&self) -> CellState {
        if self.value.get().is_some() {
            CellState::Parsed
        } else if self.parsing.load(Ordering::Acquire) {
            CellState::Parsing
        } else {
            CellState::Unparsed
        }
    }

    /// Published value, if any.
    pub fn get(&self) -> Option<Arc<T>> {
        self.value.get().cloned()
    }

    /// Published value, building it with `init` if needed.
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.value.get() {
            return Ok(Arc::clone(value));
        }

        let _guard = self.init_lock.lock();
        if let Some(value) = self.value.get() {
            return Ok(Arc::clone(value));
        }

        let result = {
            let _parsing = ParsingFlag::raise(&self.parsing);
            init()
        };

        let value = Arc::new(result?);
        Ok(Arc::clone(self.value.get_or_init(|| value)))
    }
}

/// Marks a cell as parsing until dropped, including on unwind.
struct ParsingFlag<'a>(&'a AtomicBool);

impl<'a> ParsingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ParsingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
