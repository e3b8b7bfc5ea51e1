//! C standard library shim
//!
//! The subset of libc a small sandboxed module links against, implemented
//! over the adapter's linear memory, stack and heap. POSIX-style failures
//! return a sentinel and set the errno cell; only `exit`, `abort` and
//! memory traps unwind as a `Fault`.
//!
//! `Libc` is a borrowed view of an adapter. Each function borrows adapter
//! state only for its own duration; the few that call back into the module
//! (`exit` running `atexit` handlers) release it first.

pub mod errno;
pub mod format;
pub mod math;
pub mod regex;
pub mod stdio;
pub mod stdlib;
pub mod string;
pub mod time;

use super::abi::NULL;
use super::adapter::{Adapter, AdapterState};
use super::error::{Fault, MemoryError};
use super::memory::LinearMemory;
use std::collections::{BTreeMap, HashMap};

pub use self::regex::CompiledRegex;

/// Largest value returned by `rand`
pub const RAND_MAX: i32 = 0x7fff_ffff;

/// Per-adapter libc state
#[derive(Debug)]
pub struct LibcState {
    /// Address of the errno cell, allocated on first use
    errno: u32,
    env: BTreeMap<String, String>,
    rand_seed: u32,
    strtok_next: u32,
    regexes: HashMap<u32, CompiledRegex>,
    streams: BTreeMap<i32, Vec<u8>>,
    atexit: Vec<u32>,
    at_quick_exit: Vec<u32>,
    error_messages: HashMap<i32, u32>,
    signal_messages: HashMap<i32, u32>,
}

impl LibcState {
    pub fn new(env: BTreeMap<String, String>) -> Self {
        Self {
            errno: NULL,
            env,
            rand_seed: 1,
            strtok_next: NULL,
            regexes: HashMap::new(),
            streams: BTreeMap::new(),
            atexit: Vec::new(),
            at_quick_exit: Vec::new(),
            error_messages: HashMap::new(),
            signal_messages: HashMap::new(),
        }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Forget everything that points into the heap
    pub fn reset(&mut self) {
        self.errno = NULL;
        self.strtok_next = NULL;
        self.regexes.clear();
        self.streams.clear();
        self.atexit.clear();
        self.at_quick_exit.clear();
        self.error_messages.clear();
        self.signal_messages.clear();
    }

    /// Take every partial line still buffered, stdout first
    pub fn drain_streams(&mut self) -> Vec<(i32, String)> {
        std::mem::take(&mut self.streams)
            .into_iter()
            .filter(|(_, buffer)| !buffer.is_empty())
            .map(|(stream, buffer)| (stream, String::from_utf8_lossy(&buffer).into_owned()))
            .collect()
    }
}

/// The libc import surface of one adapter
pub struct Libc<'a> {
    adapter: &'a Adapter,
}

impl<'a> Libc<'a> {
    pub(crate) fn new(adapter: &'a Adapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &'a Adapter {
        self.adapter
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut AdapterState) -> R) -> Result<R, Fault> {
        self.adapter.with_state(f)
    }

    fn memory<R>(
        &self,
        f: impl FnOnce(&mut LinearMemory) -> Result<R, MemoryError>,
    ) -> Result<R, Fault> {
        Ok(self.with_state(|state| f(&mut state.memory))??)
    }

    /// Read a string argument; `None` for NULL
    fn string(&self, ptr: u32) -> Result<Option<String>, Fault> {
        self.adapter.read_cstring(ptr)
    }

    /// Record `code` in the errno cell
    pub fn set_errno(&self, code: i32) -> Result<(), Fault> {
        let cell = self.__errno_location()?;
        if cell != NULL {
            self.with_state(|state| state.memory.write_i32(cell, code))??;
        }
        Ok(())
    }

    pub fn errno(&self) -> Result<i32, Fault> {
        let cell = self.__errno_location()?;
        if cell == NULL {
            return Ok(0);
        }
        Ok(self.with_state(|state| state.memory.read_i32(cell))??)
    }

    /// Set errno and return `sentinel`
    fn fail<T>(&self, code: i32, sentinel: T) -> Result<T, Fault> {
        self.set_errno(code)?;
        Ok(sentinel)
    }

    /// Log an unsupported call, set `ENOSYS` and return `sentinel`
    fn unsupported<T>(&self, name: &str, sentinel: T) -> Result<T, Fault> {
        log::warn!("{name}: Operation is not supported");
        self.fail(errno::ENOSYS, sentinel)
    }
}
