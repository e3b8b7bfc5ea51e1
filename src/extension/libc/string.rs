//! `<string.h>`

use super::Libc;
use crate::extension::abi::NULL;
use crate::extension::error::Fault;
use std::cmp::Ordering;

/// Sign of the first differing byte, C style
fn compare(a: &[u8], b: &[u8]) -> i32 {
    for (x, y) in a.iter().zip(b) {
        if x != y {
            return *x as i32 - *y as i32;
        }
    }
    match a.len().cmp(&b.len()) {
        Ordering::Less => -(b[a.len()] as i32),
        Ordering::Greater => a[b.len()] as i32,
        Ordering::Equal => 0,
    }
}

impl Libc<'_> {
    /// Bytes of the string at `ptr`, empty for NULL
    pub(super) fn cbytes(&self, ptr: u32) -> Result<Vec<u8>, Fault> {
        if ptr == NULL {
            return Ok(Vec::new());
        }
        self.memory(|memory| memory.read_cbytes(ptr))
    }

    /// Copy `bytes` plus a terminator into a fresh heap block
    pub(super) fn heap_string(&self, bytes: &[u8]) -> Result<u32, Fault> {
        self.with_state(|state| -> Result<u32, Fault> {
            let ptr = state.heap.alloc(bytes.len() as u32 + 1);
            if ptr != NULL {
                state.memory.write_cstring(ptr, bytes)?;
            }
            Ok(ptr)
        })?
    }

    pub fn memcpy(&self, dst: u32, src: u32, n: u32) -> Result<u32, Fault> {
        self.memory(|memory| memory.copy_within(src, dst, n))?;
        Ok(dst)
    }

    pub fn memmove(&self, dst: u32, src: u32, n: u32) -> Result<u32, Fault> {
        self.memcpy(dst, src, n)
    }

    pub fn memset(&self, dst: u32, c: i32, n: u32) -> Result<u32, Fault> {
        self.memory(|memory| memory.fill(dst, n, c as u8))?;
        Ok(dst)
    }

    pub fn memcmp(&self, a: u32, b: u32, n: u32) -> Result<i32, Fault> {
        let (a, b) = self.memory(|memory| Ok((memory.read(a, n)?, memory.read(b, n)?)))?;
        Ok(compare(&a, &b))
    }

    pub fn memchr(&self, s: u32, c: i32, n: u32) -> Result<u32, Fault> {
        let bytes = self.memory(|memory| memory.read(s, n))?;
        Ok(bytes
            .iter()
            .position(|&b| b == c as u8)
            .map(|i| s + i as u32)
            .unwrap_or(NULL))
    }

    pub fn strlen(&self, s: u32) -> Result<u32, Fault> {
        if s == NULL {
            return Ok(0);
        }
        self.memory(|memory| memory.strlen(s))
    }

    pub fn strcpy(&self, dst: u32, src: u32) -> Result<u32, Fault> {
        let bytes = self.cbytes(src)?;
        self.memory(|memory| memory.write_cstring(dst, &bytes))?;
        Ok(dst)
    }

    /// Copies at most `n` bytes, padding with NULs
    pub fn strncpy(&self, dst: u32, src: u32, n: u32) -> Result<u32, Fault> {
        let mut bytes = self.cbytes(src)?;
        bytes.truncate(n as usize);
        bytes.resize(n as usize, 0);
        self.memory(|memory| memory.write(dst, &bytes))?;
        Ok(dst)
    }

    pub fn strcat(&self, dst: u32, src: u32) -> Result<u32, Fault> {
        let end = dst + self.strlen(dst)?;
        let bytes = self.cbytes(src)?;
        self.memory(|memory| memory.write_cstring(end, &bytes))?;
        Ok(dst)
    }

    pub fn strncat(&self, dst: u32, src: u32, n: u32) -> Result<u32, Fault> {
        let end = dst + self.strlen(dst)?;
        let mut bytes = self.cbytes(src)?;
        bytes.truncate(n as usize);
        self.memory(|memory| memory.write_cstring(end, &bytes))?;
        Ok(dst)
    }

    pub fn strcmp(&self, a: u32, b: u32) -> Result<i32, Fault> {
        Ok(compare(&self.cbytes(a)?, &self.cbytes(b)?))
    }

    pub fn strncmp(&self, a: u32, b: u32, n: u32) -> Result<i32, Fault> {
        let mut a = self.cbytes(a)?;
        let mut b = self.cbytes(b)?;
        a.truncate(n as usize);
        b.truncate(n as usize);
        Ok(compare(&a, &b))
    }

    /// Collation in the C.UTF-8 locale is code point order
    pub fn strcoll(&self, a: u32, b: u32) -> Result<i32, Fault> {
        let a = self.string(a)?.unwrap_or_default();
        let b = self.string(b)?.unwrap_or_default();
        Ok(match a.chars().cmp(b.chars()) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        })
    }

    /// Identity transform; copies only when the result fits in `n`
    pub fn strxfrm(&self, dst: u32, src: u32, n: u32) -> Result<u32, Fault> {
        let bytes = self.cbytes(src)?;
        let len = bytes.len() as u32;
        if dst != NULL && len < n {
            self.memory(|memory| memory.write_cstring(dst, &bytes))?;
        }
        Ok(len)
    }

    pub fn strdup(&self, s: u32) -> Result<u32, Fault> {
        if s == NULL {
            return self.fail(super::errno::EINVAL, NULL);
        }
        let bytes = self.cbytes(s)?;
        self.heap_string(&bytes)
    }

    pub fn strndup(&self, s: u32, n: u32) -> Result<u32, Fault> {
        if s == NULL {
            return self.fail(super::errno::EINVAL, NULL);
        }
        let mut bytes = self.cbytes(s)?;
        bytes.truncate(n as usize);
        self.heap_string(&bytes)
    }

    /// The terminator itself is found when `c` is 0
    pub fn strchr(&self, s: u32, c: i32) -> Result<u32, Fault> {
        let bytes = self.cbytes(s)?;
        let c = c as u8;
        if c == 0 {
            return Ok(s + bytes.len() as u32);
        }
        Ok(bytes
            .iter()
            .position(|&b| b == c)
            .map(|i| s + i as u32)
            .unwrap_or(NULL))
    }

    pub fn strrchr(&self, s: u32, c: i32) -> Result<u32, Fault> {
        let bytes = self.cbytes(s)?;
        let c = c as u8;
        if c == 0 {
            return Ok(s + bytes.len() as u32);
        }
        Ok(bytes
            .iter()
            .rposition(|&b| b == c)
            .map(|i| s + i as u32)
            .unwrap_or(NULL))
    }

    pub fn strstr(&self, haystack: u32, needle: u32) -> Result<u32, Fault> {
        let hay = self.cbytes(haystack)?;
        let needle = self.cbytes(needle)?;
        if needle.is_empty() {
            return Ok(haystack);
        }
        Ok(hay
            .windows(needle.len())
            .position(|w| w == needle.as_slice())
            .map(|i| haystack + i as u32)
            .unwrap_or(NULL))
    }

    pub fn strspn(&self, s: u32, accept: u32) -> Result<u32, Fault> {
        let bytes = self.cbytes(s)?;
        let accept = self.cbytes(accept)?;
        Ok(bytes.iter().take_while(|b| accept.contains(b)).count() as u32)
    }

    pub fn strcspn(&self, s: u32, reject: u32) -> Result<u32, Fault> {
        let bytes = self.cbytes(s)?;
        let reject = self.cbytes(reject)?;
        Ok(bytes.iter().take_while(|b| !reject.contains(b)).count() as u32)
    }

    pub fn strpbrk(&self, s: u32, accept: u32) -> Result<u32, Fault> {
        let bytes = self.cbytes(s)?;
        let accept = self.cbytes(accept)?;
        Ok(bytes
            .iter()
            .position(|b| accept.contains(b))
            .map(|i| s + i as u32)
            .unwrap_or(NULL))
    }

    /// Split in place; the scan position is kept between calls
    pub fn strtok(&self, s: u32, delim: u32) -> Result<u32, Fault> {
        let start = if s != NULL {
            s
        } else {
            self.with_state(|state| state.libc.strtok_next)?
        };
        if start == NULL {
            return Ok(NULL);
        }

        let delim = self.cbytes(delim)?;
        let bytes = self.cbytes(start)?;
        let Some(begin) = bytes.iter().position(|b| !delim.contains(b)) else {
            self.with_state(|state| state.libc.strtok_next = NULL)?;
            return Ok(NULL);
        };

        let token = start + begin as u32;
        let next = match bytes[begin..].iter().position(|b| delim.contains(b)) {
            Some(len) => {
                let end = token + len as u32;
                self.memory(|memory| memory.write_u8(end, 0))?;
                end + 1
            }
            None => NULL,
        };
        self.with_state(|state| state.libc.strtok_next = next)?;
        Ok(token)
    }
}
