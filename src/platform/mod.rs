//! Platform Abstraction Layer
//!
//! The bridge is single threaded and cooperative. Deferred work (context
//! dispatch, host-bus responses) is handed to a `Scheduler`:
//!
//! - Browser: `setTimeout` and `wasm_bindgen_futures::spawn_local`
//! - Native: a `futures` local pool plus a FIFO of deferred calls, drained
//!   explicitly with `run_until_stalled`
//!
//! Module stdout/stderr lines go to a `ConsoleSink`.

#[cfg(target_arch = "wasm32")]
#[cfg(target_os = "unknown")] // Browser WASM (no WASI)
pub mod web;

use std::cell::RefCell;
use std::future::Future;

#[cfg(not(target_arch = "wasm32"))]
use futures::executor::{LocalPool, LocalSpawner};
#[cfg(not(target_arch = "wasm32"))]
use futures::task::LocalSpawnExt;
#[cfg(not(target_arch = "wasm32"))]
use std::collections::VecDeque;

/// Runs deferred and asynchronous work on the current thread
pub struct Scheduler {
    #[cfg(not(target_arch = "wasm32"))]
    pool: RefCell<LocalPool>,
    #[cfg(not(target_arch = "wasm32"))]
    spawner: LocalSpawner,
    #[cfg(not(target_arch = "wasm32"))]
    deferred: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

#[cfg(not(target_arch = "wasm32"))]
impl Scheduler {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner,
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        if let Err(err) = self.spawner.spawn_local(future) {
            log::error!("failed to spawn task: {err}");
        }
    }

    /// Run `task` on a later turn
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        self.deferred.borrow_mut().push_back(Box::new(task));
    }

    pub fn pending(&self) -> usize {
        self.deferred.borrow().len()
    }

    /// Drain deferred calls and spawned futures until neither makes progress
    ///
    /// Returns the number of deferred calls that ran. A nested call while
    /// the pool is already being driven only drains deferred calls.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.deferred.borrow_mut().pop_front();
            if let Some(task) = task {
                task();
                ran += 1;
                continue;
            }

            if let Ok(mut pool) = self.pool.try_borrow_mut() {
                pool.run_until_stalled();
            }

            if self.deferred.borrow().is_empty() {
                return ran;
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl Scheduler {
    pub fn new() -> Self {
        Self {}
    }

    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        wasm_bindgen_futures::spawn_local(future);
    }

    /// Run `task` on a later turn of the browser event loop
    pub fn defer(&self, task: impl FnOnce() + 'static) {
        web::set_timeout(task);
    }

    pub fn pending(&self) -> usize {
        0
    }

    /// The browser event loop drives everything; nothing to drain here
    pub fn run_until_stalled(&self) -> usize {
        0
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination for flushed module output lines
pub trait ConsoleSink {
    fn write_line(&self, stream: i32, line: &str);
}

/// Forwards stdout to `log::info!` and stderr to `log::error!`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogConsole;

impl ConsoleSink for LogConsole {
    fn write_line(&self, stream: i32, line: &str) {
        if stream == crate::extension::abi::fd::STDERR {
            log::error!(target: "extension", "{line}");
        } else {
            log::info!(target: "extension", "{line}");
        }
    }
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct CapturedConsole {
    lines: RefCell<Vec<(i32, String)>>,
}

impl CapturedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(i32, String)> {
        self.lines.borrow().clone()
    }

    /// Lines written to one stream
    pub fn stream(&self, stream: i32) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl ConsoleSink for CapturedConsole {
    fn write_line(&self, stream: i32, line: &str) {
        self.lines.borrow_mut().push((stream, line.to_string()));
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_deferred_runs_in_order() {
        let scheduler = Scheduler::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = Rc::clone(&order);
            scheduler.defer(move || order.borrow_mut().push(i));
        }
        assert_eq!(scheduler.pending(), 3);
        assert_eq!(scheduler.run_until_stalled(), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(scheduler.run_until_stalled(), 0);
    }

    #[test]
    fn test_spawned_future_can_defer() {
        let scheduler = Rc::new(Scheduler::new());
        let hit = Rc::new(Cell::new(false));

        let inner = Rc::clone(&scheduler);
        let flag = Rc::clone(&hit);
        scheduler.spawn(async move {
            inner.defer(move || flag.set(true));
        });

        assert_eq!(scheduler.run_until_stalled(), 1);
        assert!(hit.get());
    }

    #[test]
    fn test_captured_console() {
        let console = CapturedConsole::new();
        console.write_line(1, "out");
        console.write_line(2, "err");
        assert_eq!(console.stream(1), vec!["out".to_string()]);
        assert_eq!(console.lines().len(), 2);
    }
}
