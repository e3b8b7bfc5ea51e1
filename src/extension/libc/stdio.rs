//! `<stdio.h>` output
//!
//! stdout and stderr are line buffered: bytes accumulate per stream and only
//! complete lines reach the console sink, or whatever is pending on an
//! explicit flush.

use super::Libc;
use super::format::{VaList, format};
use crate::extension::abi::{NULL, fd};
use crate::extension::error::Fault;

/// `EOF`
pub const EOF: i32 = -1;

impl Libc<'_> {
    /// Expand a format string against a variadic buffer
    pub fn vformat(&self, fmt: u32, args: u32) -> Result<Vec<u8>, Fault> {
        if fmt == NULL {
            return Ok(Vec::new());
        }
        self.memory(|memory| {
            let fmt = memory.read_cbytes(fmt)?;
            let mut args = VaList::new(memory, args);
            format(&fmt, &mut args)
        })
    }

    /// Append to a stream buffer, flushing completed lines
    pub fn write_stream(&self, stream: i32, bytes: &[u8]) -> Result<(), Fault> {
        if stream != fd::STDOUT && stream != fd::STDERR {
            log::debug!("dropping {} bytes written to stream {stream}", bytes.len());
            return Ok(());
        }

        let lines = self.with_state(|state| {
            let buffer = state.libc.streams.entry(stream).or_default();
            buffer.extend_from_slice(bytes);

            let mut lines = Vec::new();
            while let Some(end) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                lines.push(String::from_utf8_lossy(&line[..end]).into_owned());
            }
            lines
        })?;

        for line in lines {
            self.adapter.console().write_line(stream, &line);
        }
        Ok(())
    }

    /// Write out a partial line; `NULL` flushes every stream
    pub fn fflush(&self, stream: u32) -> Result<i32, Fault> {
        let pending = self.with_state(|state| {
            if stream == NULL {
                state.libc.drain_streams()
            } else {
                state
                    .libc
                    .streams
                    .remove(&(stream as i32))
                    .filter(|b| !b.is_empty())
                    .map(|b| vec![(stream as i32, String::from_utf8_lossy(&b).into_owned())])
                    .unwrap_or_default()
            }
        })?;

        for (stream, line) in pending {
            self.adapter.console().write_line(stream, &line);
        }
        Ok(0)
    }

    pub fn printf(&self, fmt: u32, args: u32) -> Result<i32, Fault> {
        self.fprintf(fd::STDOUT as u32, fmt, args)
    }

    pub fn vprintf(&self, fmt: u32, args: u32) -> Result<i32, Fault> {
        self.printf(fmt, args)
    }

    pub fn fprintf(&self, stream: u32, fmt: u32, args: u32) -> Result<i32, Fault> {
        let output = self.vformat(fmt, args)?;
        self.write_stream(stream as i32, &output)?;
        Ok(output.len() as i32)
    }

    pub fn vfprintf(&self, stream: u32, fmt: u32, args: u32) -> Result<i32, Fault> {
        self.fprintf(stream, fmt, args)
    }

    pub fn sprintf(&self, dst: u32, fmt: u32, args: u32) -> Result<i32, Fault> {
        let output = self.vformat(fmt, args)?;
        if dst != NULL {
            self.memory(|memory| memory.write_cstring(dst, &output))?;
        }
        Ok(output.len() as i32)
    }

    pub fn vsprintf(&self, dst: u32, fmt: u32, args: u32) -> Result<i32, Fault> {
        self.sprintf(dst, fmt, args)
    }

    /// Writes at most `size - 1` bytes plus a terminator; returns the
    /// untruncated length
    pub fn snprintf(&self, dst: u32, size: u32, fmt: u32, args: u32) -> Result<i32, Fault> {
        let output = self.vformat(fmt, args)?;
        if dst != NULL && size > 0 {
            let keep = output.len().min(size as usize - 1);
            self.memory(|memory| memory.write_cstring(dst, &output[..keep]))?;
        }
        Ok(output.len() as i32)
    }

    pub fn vsnprintf(&self, dst: u32, size: u32, fmt: u32, args: u32) -> Result<i32, Fault> {
        self.snprintf(dst, size, fmt, args)
    }

    pub fn puts(&self, s: u32) -> Result<i32, Fault> {
        let mut bytes = self.cbytes(s)?;
        bytes.push(b'\n');
        self.write_stream(fd::STDOUT, &bytes)?;
        Ok(bytes.len() as i32)
    }

    pub fn fputs(&self, s: u32, stream: u32) -> Result<i32, Fault> {
        if s == NULL {
            return Ok(EOF);
        }
        let bytes = self.cbytes(s)?;
        self.write_stream(stream as i32, &bytes)?;
        Ok(bytes.len() as i32)
    }

    pub fn fputc(&self, c: i32, stream: u32) -> Result<i32, Fault> {
        self.write_stream(stream as i32, &[c as u8])?;
        Ok(c & 0xff)
    }

    pub fn putchar(&self, c: i32) -> Result<i32, Fault> {
        self.fputc(c, fd::STDOUT as u32)
    }
}
