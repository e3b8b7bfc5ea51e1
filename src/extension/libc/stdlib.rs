//! `<stdlib.h>`: allocation, conversion, randomness, environment and
//! process lifecycle

use super::errno::{EINVAL, ENOMEM, ERANGE};
use super::{Libc, RAND_MAX};
use crate::extension::abi::{DivT, LLDivT, NULL, fd};
use crate::extension::error::Fault;

/// Outcome of scanning an integer prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInt {
    pub negative: bool,
    pub magnitude: u64,
    pub overflow: bool,
    /// Bytes consumed, 0 when no digits were found
    pub end: usize,
}

impl ParsedInt {
    /// Clamp into `[min, max]`, reporting whether it had to
    fn signed(&self, min: i64, max: i64) -> (i64, bool) {
        if self.negative {
            let limit = min.unsigned_abs();
            if self.overflow || self.magnitude > limit {
                (min, true)
            } else {
                (0i64.wrapping_sub_unsigned(self.magnitude), false)
            }
        } else if self.overflow || self.magnitude > max as u64 {
            (max, true)
        } else {
            (self.magnitude as i64, false)
        }
    }

    /// Unsigned result with C negation semantics
    fn unsigned(&self, max: u64) -> (u64, bool) {
        if self.overflow || self.magnitude > max {
            return (max, true);
        }
        if self.negative {
            (self.magnitude.wrapping_neg() & max, false)
        } else {
            (self.magnitude, false)
        }
    }
}

/// Scan `[ws][+-][0x]digits` in `base` (0 detects the base from the prefix)
pub fn parse_int(bytes: &[u8], base: u32) -> Option<ParsedInt> {
    if base == 1 || base > 36 {
        return None;
    }

    let mut i = bytes.iter().take_while(|b| b.is_ascii_whitespace()).count();
    let mut negative = false;
    if let Some(sign @ (b'+' | b'-')) = bytes.get(i) {
        negative = *sign == b'-';
        i += 1;
    }

    let has_hex_prefix = bytes.get(i) == Some(&b'0')
        && matches!(bytes.get(i + 1), Some(b'x' | b'X'))
        && bytes.get(i + 2).is_some_and(|b| b.is_ascii_hexdigit());
    let base = match base {
        0 if has_hex_prefix => {
            i += 2;
            16
        }
        0 if bytes.get(i) == Some(&b'0') => 8,
        0 => 10,
        16 if has_hex_prefix => {
            i += 2;
            16
        }
        other => other,
    };

    let start = i;
    let mut magnitude: u64 = 0;
    let mut overflow = false;
    while let Some(digit) = bytes.get(i).and_then(|b| (*b as char).to_digit(base)) {
        match magnitude
            .checked_mul(base as u64)
            .and_then(|m| m.checked_add(digit as u64))
        {
            Some(next) => magnitude = next,
            None => overflow = true,
        }
        i += 1;
    }

    if i == start {
        return None;
    }
    Some(ParsedInt {
        negative,
        magnitude,
        overflow,
        end: i,
    })
}

/// Longest prefix of `bytes` that reads as a decimal float
pub fn parse_float(bytes: &[u8]) -> Option<(f64, usize)> {
    let lead = bytes.iter().take_while(|b| b.is_ascii_whitespace()).count();
    let mut i = lead;
    if matches!(bytes.get(i), Some(b'+' | b'-')) {
        i += 1;
    }

    let rest = &bytes[i..];
    for word in ["infinity", "inf", "nan"] {
        if rest.len() >= word.len() && rest[..word.len()].eq_ignore_ascii_case(word.as_bytes()) {
            let end = i + word.len();
            let text = std::str::from_utf8(&bytes[lead..end]).ok()?;
            return text.parse().ok().map(|v| (v, end));
        }
    }

    let digits_from = |mut j: usize| {
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        j
    };

    let int_end = digits_from(i);
    let mut end = int_end;
    if bytes.get(end) == Some(&b'.') {
        end = digits_from(end + 1);
    }
    if end == i || (end == i + 1 && int_end == i) {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut j = end + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_end = digits_from(j);
        if exp_end > j {
            end = exp_end;
        }
    }

    let text = std::str::from_utf8(&bytes[lead..end]).ok()?;
    text.parse().ok().map(|v| (v, end))
}

impl Libc<'_> {
    pub fn malloc(&self, size: u32) -> Result<u32, Fault> {
        let ptr = self.with_state(|state| state.heap.alloc(size))?;
        if ptr == NULL && size > 0 {
            return self.fail(ENOMEM, NULL);
        }
        Ok(ptr)
    }

    pub fn calloc(&self, count: u32, size: u32) -> Result<u32, Fault> {
        let ptr = self.with_state(|state| state.heap.calloc(&mut state.memory, count, size))??;
        if ptr == NULL && count > 0 && size > 0 {
            return self.fail(ENOMEM, NULL);
        }
        Ok(ptr)
    }

    pub fn realloc(&self, ptr: u32, size: u32) -> Result<u32, Fault> {
        let moved = self.with_state(|state| -> Result<u32, Fault> {
            let moved = state.heap.realloc(&mut state.memory, ptr, size)?;
            if moved != ptr && ptr != NULL {
                state.contexts.forget(ptr);
                state.references.release(ptr);
            }
            Ok(moved)
        })??;
        if moved == NULL && size > 0 {
            return self.fail(ENOMEM, NULL);
        }
        Ok(moved)
    }

    pub fn free(&self, ptr: u32) -> Result<(), Fault> {
        self.with_state(|state| {
            state.free(ptr);
        })
    }

    /// Read a string argument as bytes, `None` for NULL
    fn bytes_arg(&self, ptr: u32) -> Result<Option<Vec<u8>>, Fault> {
        if ptr == NULL {
            return Ok(None);
        }
        self.cbytes(ptr).map(Some)
    }

    fn set_end(&self, endptr: u32, value: u32) -> Result<(), Fault> {
        if endptr != NULL {
            self.memory(|memory| memory.write_u32(endptr, value))?;
        }
        Ok(())
    }

    /// Shared body of the `strto*` integer family
    fn strto(&self, s: u32, endptr: u32, base: i32) -> Result<Option<ParsedInt>, Fault> {
        let Some(bytes) = self.bytes_arg(s)? else {
            return self.fail(EINVAL, None);
        };
        let Ok(base) = u32::try_from(base) else {
            self.set_end(endptr, s)?;
            return self.fail(EINVAL, None);
        };
        let parsed = parse_int(&bytes, base);
        let end = parsed.map(|p| s + p.end as u32).unwrap_or(s);
        self.set_end(endptr, end)?;
        if parsed.is_none() && (base == 1 || base > 36) {
            return self.fail(EINVAL, None);
        }
        Ok(parsed)
    }

    pub fn strtol(&self, s: u32, endptr: u32, base: i32) -> Result<i32, Fault> {
        let Some(parsed) = self.strto(s, endptr, base)? else {
            return Ok(0);
        };
        let (value, clamped) = parsed.signed(i32::MIN as i64, i32::MAX as i64);
        if clamped {
            self.set_errno(ERANGE)?;
        }
        Ok(value as i32)
    }

    pub fn strtoll(&self, s: u32, endptr: u32, base: i32) -> Result<i64, Fault> {
        let Some(parsed) = self.strto(s, endptr, base)? else {
            return Ok(0);
        };
        let (value, clamped) = parsed.signed(i64::MIN, i64::MAX);
        if clamped {
            self.set_errno(ERANGE)?;
        }
        Ok(value)
    }

    pub fn strtoul(&self, s: u32, endptr: u32, base: i32) -> Result<u32, Fault> {
        let Some(parsed) = self.strto(s, endptr, base)? else {
            return Ok(0);
        };
        let (value, clamped) = parsed.unsigned(u32::MAX as u64);
        if clamped {
            self.set_errno(ERANGE)?;
        }
        Ok(value as u32)
    }

    pub fn strtoull(&self, s: u32, endptr: u32, base: i32) -> Result<u64, Fault> {
        let Some(parsed) = self.strto(s, endptr, base)? else {
            return Ok(0);
        };
        let (value, clamped) = parsed.unsigned(u64::MAX);
        if clamped {
            self.set_errno(ERANGE)?;
        }
        Ok(value)
    }

    pub fn strtod(&self, s: u32, endptr: u32) -> Result<f64, Fault> {
        let Some(bytes) = self.bytes_arg(s)? else {
            return self.fail(EINVAL, 0.0);
        };
        match parse_float(&bytes) {
            Some((value, end)) => {
                self.set_end(endptr, s + end as u32)?;
                if value.is_infinite() && !bytes.iter().any(|b| b.eq_ignore_ascii_case(&b'i')) {
                    self.set_errno(ERANGE)?;
                }
                Ok(value)
            }
            None => {
                self.set_end(endptr, s)?;
                Ok(0.0)
            }
        }
    }

    pub fn strtof(&self, s: u32, endptr: u32) -> Result<f32, Fault> {
        self.strtod(s, endptr).map(|v| v as f32)
    }

    pub fn atoi(&self, s: u32) -> Result<i32, Fault> {
        let bytes = self.bytes_arg(s)?.unwrap_or_default();
        Ok(parse_int(&bytes, 10)
            .map(|p| p.signed(i64::MIN, i64::MAX).0 as i32)
            .unwrap_or(0))
    }

    pub fn atol(&self, s: u32) -> Result<i32, Fault> {
        self.atoi(s)
    }

    pub fn atoll(&self, s: u32) -> Result<i64, Fault> {
        let bytes = self.bytes_arg(s)?.unwrap_or_default();
        Ok(parse_int(&bytes, 10)
            .map(|p| p.signed(i64::MIN, i64::MAX).0)
            .unwrap_or(0))
    }

    pub fn atof(&self, s: u32) -> Result<f64, Fault> {
        let bytes = self.bytes_arg(s)?.unwrap_or_default();
        Ok(parse_float(&bytes).map(|(v, _)| v).unwrap_or(0.0))
    }

    pub fn abs(&self, value: i32) -> i32 {
        value.wrapping_abs()
    }

    pub fn labs(&self, value: i32) -> i32 {
        value.wrapping_abs()
    }

    pub fn llabs(&self, value: i64) -> i64 {
        value.wrapping_abs()
    }

    /// `div_t div(int, int)`, returned through `out`
    pub fn div(&self, out: u32, numerator: i32, denominator: i32) -> Result<(), Fault> {
        if denominator == 0 {
            return Err(Fault::Trap("integer divide by zero".to_string()));
        }
        let result = DivT {
            quot: numerator.wrapping_div(denominator),
            rem: numerator.wrapping_rem(denominator),
        };
        self.memory(|memory| memory.write_pod(out, &result))
    }

    pub fn ldiv(&self, out: u32, numerator: i32, denominator: i32) -> Result<(), Fault> {
        self.div(out, numerator, denominator)
    }

    pub fn lldiv(&self, out: u32, numerator: i64, denominator: i64) -> Result<(), Fault> {
        if denominator == 0 {
            return Err(Fault::Trap("integer divide by zero".to_string()));
        }
        let result = LLDivT {
            quot: numerator.wrapping_div(denominator),
            rem: numerator.wrapping_rem(denominator),
        };
        self.memory(|memory| memory.write_pod(out, &result))
    }

    /// Linear congruential generator over `[0, RAND_MAX]`
    pub fn rand(&self) -> Result<i32, Fault> {
        self.with_state(|state| {
            let next = state
                .libc
                .rand_seed
                .wrapping_mul(1_103_515_245)
                .wrapping_add(12_345);
            state.libc.rand_seed = next;
            (next & RAND_MAX as u32) as i32
        })
    }

    pub fn srand(&self, seed: u32) -> Result<(), Fault> {
        self.with_state(|state| state.libc.rand_seed = seed)
    }

    /// Value of `name`, pushed onto the argument stack
    pub fn getenv(&self, name: u32) -> Result<u32, Fault> {
        let Some(name) = self.string(name)?.filter(|n| !n.is_empty()) else {
            return self.fail(EINVAL, NULL);
        };
        let value = self.with_state(|state| state.libc.env.get(&name).cloned())?;
        self.adapter.push_str(value.as_deref())
    }

    pub fn secure_getenv(&self, name: u32) -> Result<u32, Fault> {
        self.getenv(name)
    }

    pub fn setenv(&self, name: u32, value: u32, overwrite: i32) -> Result<i32, Fault> {
        let name = self.string(name)?.filter(|n| !n.is_empty() && !n.contains('='));
        let value = self.string(value)?;
        let (Some(name), Some(value)) = (name, value) else {
            return self.fail(EINVAL, -1);
        };
        self.with_state(|state| {
            if overwrite != 0 || !state.libc.env.contains_key(&name) {
                state.libc.env.insert(name, value);
            }
        })?;
        Ok(0)
    }

    pub fn unsetenv(&self, name: u32) -> Result<i32, Fault> {
        let Some(name) = self.string(name)?.filter(|n| !n.is_empty() && !n.contains('=')) else {
            return self.fail(EINVAL, -1);
        };
        self.with_state(|state| state.libc.env.remove(&name))?;
        Ok(0)
    }

    /// Accepts exactly `NAME=VALUE`
    pub fn putenv(&self, assignment: u32) -> Result<i32, Fault> {
        let Some(assignment) = self.string(assignment)? else {
            return self.fail(EINVAL, -1);
        };
        let parts: Vec<&str> = assignment.split('=').collect();
        let [name, value] = parts.as_slice() else {
            return self.fail(EINVAL, -1);
        };
        if name.is_empty() {
            return self.fail(EINVAL, -1);
        }
        let (name, value) = (name.to_string(), value.to_string());
        self.with_state(|state| state.libc.env.insert(name, value))?;
        Ok(0)
    }

    pub fn clearenv(&self) -> Result<i32, Fault> {
        self.with_state(|state| state.libc.env.clear())?;
        Ok(0)
    }

    pub fn system(&self, _command: u32) -> Result<i32, Fault> {
        log::warn!("system: Operation is not supported");
        Ok(-1)
    }

    pub fn atexit(&self, callback: u32) -> Result<i32, Fault> {
        if callback == NULL {
            return Ok(-1);
        }
        self.with_state(|state| state.libc.atexit.push(callback))?;
        Ok(0)
    }

    pub fn at_quick_exit(&self, callback: u32) -> Result<i32, Fault> {
        if callback == NULL {
            return Ok(-1);
        }
        self.with_state(|state| state.libc.at_quick_exit.push(callback))?;
        Ok(0)
    }

    /// Run exit handlers, most recently registered first
    fn run_handlers(&self, quick: bool) -> Result<(), Fault> {
        loop {
            let next = self.with_state(|state| {
                if quick {
                    state.libc.at_quick_exit.pop()
                } else {
                    state.libc.atexit.pop()
                }
            })?;
            let Some(callback) = next else {
                return Ok(());
            };
            self.adapter.table().call(callback, &[])?;
        }
    }

    /// Run `atexit` handlers, flush output and unwind with the exit status
    pub fn exit(&self, code: i32) -> Result<(), Fault> {
        self.run_handlers(false)?;
        self.fflush(NULL)?;
        Err(Fault::Exit(code))
    }

    /// Exit without running handlers or flushing
    #[allow(non_snake_case)]
    pub fn _Exit(&self, code: i32) -> Result<(), Fault> {
        Err(Fault::Exit(code))
    }

    pub fn quick_exit(&self, code: i32) -> Result<(), Fault> {
        self.run_handlers(true)?;
        Err(Fault::Exit(code))
    }

    pub fn abort(&self) -> Result<(), Fault> {
        Err(Fault::Abort)
    }

    pub fn __assert_fail(&self, condition: u32, file: u32, line: u32, function: u32) -> Result<(), Fault> {
        let condition = self.string(condition)?.unwrap_or_default();
        let file = self.string(file)?.unwrap_or_default();
        let function = self.string(function)?.unwrap_or_default();
        let message = format!("Assertion failed: {condition} ({file}: {function}: {line})\n");
        self.write_stream(fd::STDERR, message.as_bytes())?;
        Err(Fault::Abort)
    }
}
