//! `<time.h>`
//!
//! Only the wall clock in whole seconds is real. Calendar conversion and
//! clocks are not available inside the sandbox.

use super::Libc;
use crate::extension::abi::NULL;
use crate::extension::error::Fault;

/// Seconds since the Unix epoch
#[cfg(target_arch = "wasm32")]
pub fn now_seconds() -> i64 {
    (js_sys::Date::now() / 1000.0).floor() as i64
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Libc<'_> {
    /// `time_t` is 64 bits; also stored through `out` when non-NULL
    pub fn time(&self, out: u32) -> Result<i64, Fault> {
        let now = now_seconds();
        if out != NULL {
            self.memory(|memory| memory.write_i64(out, now))?;
        }
        Ok(now)
    }

    pub fn difftime(&self, end: i64, begin: i64) -> f64 {
        (end - begin) as f64
    }

    pub fn clock(&self) -> Result<i64, Fault> {
        self.unsupported("clock", -1)
    }

    pub fn clock_gettime(&self, _clock: i32, _out: u32) -> Result<i32, Fault> {
        self.unsupported("clock_gettime", -1)
    }

    pub fn mktime(&self, _tm: u32) -> Result<i64, Fault> {
        self.unsupported("mktime", -1)
    }

    pub fn gmtime(&self, _timer: u32) -> Result<u32, Fault> {
        self.unsupported("gmtime", NULL)
    }

    pub fn localtime(&self, _timer: u32) -> Result<u32, Fault> {
        self.unsupported("localtime", NULL)
    }

    pub fn asctime(&self, _tm: u32) -> Result<u32, Fault> {
        self.unsupported("asctime", NULL)
    }

    pub fn ctime(&self, _timer: u32) -> Result<u32, Fault> {
        self.unsupported("ctime", NULL)
    }

    pub fn strftime(&self, _dst: u32, _size: u32, _fmt: u32, _tm: u32) -> Result<u32, Fault> {
        self.unsupported("strftime", 0)
    }

    pub fn nanosleep(&self, _req: u32, _rem: u32) -> Result<i32, Fault> {
        self.unsupported("nanosleep", -1)
    }
}

#[cfg(test)]
mod tests {
    use super::now_seconds;

    #[test]
    fn test_now_is_after_2020() {
        assert!(now_seconds() > 1_577_836_800);
    }
}
