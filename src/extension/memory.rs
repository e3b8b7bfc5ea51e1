//! Linear memory and the two allocators layered over it
//!
//! `LinearMemory` is the module's byte buffer. On wasm32 it wraps the
//! `WebAssembly.Memory` handed to the module as `env.memory`; natively it is
//! a plain `Vec<u8>` so the whole bridge can run under `cargo test`.
//!
//! `Stack` is a bump allocator used to marshal transient call arguments and
//! return values. `Heap` is a first-fit, address-ordered free list backing
//! `malloc` and every handle the bridge hands to the module.

use super::abi::{NULL, PAGE_SIZE};
use super::error::MemoryError;
use bytemuck::Pod;
use std::collections::BTreeMap;

#[cfg(target_arch = "wasm32")]
use js_sys::{ArrayBuffer, Uint8Array, WebAssembly};
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;

/// Heap allocations are rounded to this many bytes
pub const ALIGNMENT: u32 = 8;

/// Chunk size used when scanning for a string terminator
const SCAN_CHUNK: u32 = 256;

fn align_up(value: u32) -> Option<u32> {
    value
        .checked_add(ALIGNMENT - 1)
        .map(|v| v & !(ALIGNMENT - 1))
}

/// The module's linear memory
#[cfg(target_arch = "wasm32")]
pub struct LinearMemory {
    memory: WebAssembly::Memory,
}

#[cfg(not(target_arch = "wasm32"))]
pub struct LinearMemory {
    data: Vec<u8>,
}

#[cfg(target_arch = "wasm32")]
impl LinearMemory {
    pub fn new(memory: WebAssembly::Memory) -> Self {
        Self { memory }
    }

    /// The JS memory object imported by the module
    pub fn js_memory(&self) -> &WebAssembly::Memory {
        &self.memory
    }

    /// Memory size in bytes
    pub fn size(&self) -> u32 {
        let buffer: ArrayBuffer = self.memory.buffer().unchecked_into();
        buffer.byte_length()
    }

    fn read_into(&self, offset: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check_bounds(offset, buf.len() as u32)?;
        let view = Uint8Array::new_with_byte_offset_and_length(
            &self.memory.buffer(),
            offset,
            buf.len() as u32,
        );
        view.copy_to(buf);
        Ok(())
    }

    /// Write bytes into memory
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.check_bounds(offset, data.len() as u32)?;
        let view = Uint8Array::new_with_byte_offset_and_length(
            &self.memory.buffer(),
            offset,
            data.len() as u32,
        );
        view.copy_from(data);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl LinearMemory {
    /// Allocate `pages` zeroed WebAssembly pages
    pub fn new(pages: u32) -> Self {
        Self {
            data: vec![0u8; (pages as usize) * PAGE_SIZE as usize],
        }
    }

    /// Memory size in bytes
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn read_into(&self, offset: u32, buf: &mut [u8]) -> Result<(), MemoryError> {
        self.check_bounds(offset, buf.len() as u32)?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    /// Write bytes into memory
    pub fn write(&mut self, offset: u32, data: &[u8]) -> Result<(), MemoryError> {
        self.check_bounds(offset, data.len() as u32)?;
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl LinearMemory {
    /// Number of whole pages
    pub fn pages(&self) -> u32 {
        self.size() / PAGE_SIZE
    }

    pub fn check_bounds(&self, offset: u32, size: u32) -> Result<(), MemoryError> {
        let memory_size = self.size();
        if offset as u64 + size as u64 > memory_size as u64 {
            return Err(MemoryError::OutOfBounds {
                address: offset,
                size,
                memory_size,
            });
        }
        Ok(())
    }

    /// Read `len` bytes starting at `offset`
    pub fn read(&self, offset: u32, len: u32) -> Result<Vec<u8>, MemoryError> {
        let mut buf = vec![0u8; len as usize];
        self.read_into(offset, &mut buf)?;
        Ok(buf)
    }

    pub fn read_pod<T: Pod>(&self, offset: u32) -> Result<T, MemoryError> {
        let bytes = self.read(offset, std::mem::size_of::<T>() as u32)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn write_pod<T: Pod>(&mut self, offset: u32, value: &T) -> Result<(), MemoryError> {
        self.write(offset, bytemuck::bytes_of(value))
    }

    pub fn read_u8(&self, offset: u32) -> Result<u8, MemoryError> {
        self.read_pod(offset)
    }

    pub fn read_u32(&self, offset: u32) -> Result<u32, MemoryError> {
        self.read_pod::<[u8; 4]>(offset).map(u32::from_le_bytes)
    }

    pub fn read_i32(&self, offset: u32) -> Result<i32, MemoryError> {
        self.read_pod::<[u8; 4]>(offset).map(i32::from_le_bytes)
    }

    pub fn read_i64(&self, offset: u32) -> Result<i64, MemoryError> {
        self.read_pod::<[u8; 8]>(offset).map(i64::from_le_bytes)
    }

    pub fn read_f64(&self, offset: u32) -> Result<f64, MemoryError> {
        self.read_pod::<[u8; 8]>(offset).map(f64::from_le_bytes)
    }

    pub fn write_u8(&mut self, offset: u32, value: u8) -> Result<(), MemoryError> {
        self.write(offset, &[value])
    }

    pub fn write_u32(&mut self, offset: u32, value: u32) -> Result<(), MemoryError> {
        self.write(offset, &value.to_le_bytes())
    }

    pub fn write_i32(&mut self, offset: u32, value: i32) -> Result<(), MemoryError> {
        self.write(offset, &value.to_le_bytes())
    }

    pub fn write_i64(&mut self, offset: u32, value: i64) -> Result<(), MemoryError> {
        self.write(offset, &value.to_le_bytes())
    }

    pub fn write_f64(&mut self, offset: u32, value: f64) -> Result<(), MemoryError> {
        self.write(offset, &value.to_le_bytes())
    }

    /// Length of the NUL-terminated string at `ptr`
    pub fn strlen(&self, ptr: u32) -> Result<u32, MemoryError> {
        let size = self.size();
        let mut cursor = ptr;
        loop {
            if cursor >= size {
                return Err(MemoryError::Unterminated { address: ptr });
            }
            let chunk = self.read(cursor, SCAN_CHUNK.min(size - cursor))?;
            if let Some(pos) = chunk.iter().position(|&b| b == 0) {
                return Ok(cursor - ptr + pos as u32);
            }
            cursor += chunk.len() as u32;
        }
    }

    /// Bytes of the NUL-terminated string at `ptr`, without the terminator
    pub fn read_cbytes(&self, ptr: u32) -> Result<Vec<u8>, MemoryError> {
        let len = self.strlen(ptr)?;
        self.read(ptr, len)
    }

    /// Read a NUL-terminated string; `None` for the null pointer
    pub fn read_cstring(&self, ptr: u32) -> Result<Option<String>, MemoryError> {
        if ptr == NULL {
            return Ok(None);
        }
        let bytes = self.read_cbytes(ptr)?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Read a string with explicit length
    pub fn read_string(&self, ptr: u32, len: u32) -> Result<String, MemoryError> {
        let bytes = self.read(ptr, len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Write `bytes` followed by a NUL terminator
    pub fn write_cstring(&mut self, ptr: u32, bytes: &[u8]) -> Result<(), MemoryError> {
        self.check_bounds(ptr, bytes.len() as u32 + 1)?;
        self.write(ptr, bytes)?;
        self.write_u8(ptr + bytes.len() as u32, 0)
    }

    pub fn fill(&mut self, offset: u32, len: u32, byte: u8) -> Result<(), MemoryError> {
        self.write(offset, &vec![byte; len as usize])
    }

    /// Copy with `memmove` semantics
    pub fn copy_within(&mut self, src: u32, dst: u32, len: u32) -> Result<(), MemoryError> {
        let bytes = self.read(src, len)?;
        self.write(dst, &bytes)
    }
}

/// A half-open `[start, end)` address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBlock {
    pub start: u32,
    pub end: u32,
}

impl MemoryBlock {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// A value pushed onto the argument stack
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StackValue<'a> {
    Int(u32),
    Float(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
}

/// Bump allocator for transient values
///
/// Every push records its address and width so unwinding is strictly LIFO.
#[derive(Debug, Clone)]
pub struct Stack {
    low: u32,
    high: u32,
    offset: u32,
    frames: Vec<MemoryBlock>,
}

impl Stack {
    pub fn new(low: u32, high: u32) -> Self {
        let low = low.max(1);
        Self {
            low,
            high: high.max(low),
            offset: low,
            frames: Vec::new(),
        }
    }

    /// Current top of the stack
    pub fn pointer(&self) -> u32 {
        self.offset
    }

    /// Number of live pushes
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn remaining(&self) -> u32 {
        self.high - self.offset
    }

    /// Byte width used for an integer, from its leading zero count
    pub fn int_width(value: u32) -> u32 {
        match value.leading_zeros() {
            24.. => 1,
            16..=23 => 2,
            _ => 4,
        }
    }

    /// Push a value, returning its address or `NULL` if it does not fit
    pub fn push(
        &mut self,
        memory: &mut LinearMemory,
        value: StackValue<'_>,
    ) -> Result<u32, MemoryError> {
        let bytes: Vec<u8> = match value {
            StackValue::Int(v) => {
                let width = Self::int_width(v) as usize;
                v.to_le_bytes()[..width].to_vec()
            }
            StackValue::Float(v) => v.to_le_bytes().to_vec(),
            StackValue::Str(s) => {
                let mut bytes = Vec::with_capacity(s.len() + 1);
                bytes.extend_from_slice(s.as_bytes());
                bytes.push(0);
                bytes
            }
            StackValue::Bytes(b) => b.to_vec(),
        };

        let width = bytes.len() as u32;
        if width == 0 || width > self.remaining() {
            return Ok(NULL);
        }

        let ptr = self.offset;
        memory.write(ptr, &bytes)?;
        self.offset += width;
        self.frames.push(MemoryBlock::new(ptr, ptr + width));
        Ok(ptr)
    }

    /// Pop the most recent push, returning its address
    pub fn pop(&mut self) -> u32 {
        match self.frames.pop() {
            Some(block) => {
                self.offset = block.start;
                block.start
            }
            None => NULL,
        }
    }

    /// Mark the current position for a later `restore`
    pub fn mark(&self) -> u32 {
        self.offset
    }

    /// Unwind every push made since `mark`, most recent first
    pub fn restore(&mut self, mark: u32) -> Vec<u32> {
        let mut popped = Vec::new();
        while let Some(block) = self.frames.last() {
            if block.start < mark {
                break;
            }
            popped.push(block.start);
            self.frames.pop();
        }
        self.offset = mark.clamp(self.low, self.high);
        popped
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.offset = self.low;
    }
}

/// First-fit heap allocator
#[derive(Debug, Clone)]
pub struct Heap {
    low: u32,
    high: u32,
    free: Vec<MemoryBlock>,
    allocated: BTreeMap<u32, u32>,
}

impl Heap {
    /// A heap over `[low, high)`; address 0 is never handed out
    pub fn new(low: u32, high: u32) -> Self {
        let low = align_up(low.max(1)).unwrap_or(high);
        let mut heap = Self {
            low,
            high,
            free: Vec::new(),
            allocated: BTreeMap::new(),
        };
        heap.reset();
        heap
    }

    pub fn reset(&mut self) {
        self.allocated.clear();
        self.free.clear();
        if self.low < self.high {
            self.free.push(MemoryBlock::new(self.low, self.high));
        }
    }

    pub fn free_blocks(&self) -> &[MemoryBlock] {
        &self.free
    }

    pub fn allocation_count(&self) -> usize {
        self.allocated.len()
    }

    pub fn bytes_free(&self) -> u32 {
        self.free.iter().map(MemoryBlock::len).sum()
    }

    pub fn is_allocated(&self, ptr: u32) -> bool {
        self.allocated.contains_key(&ptr)
    }

    /// Usable size of the allocation starting at `ptr`
    pub fn size_of(&self, ptr: u32) -> Option<u32> {
        self.allocated.get(&ptr).map(|end| end - ptr)
    }

    /// Allocate `size` bytes, `NULL` on failure or for zero size
    pub fn alloc(&mut self, size: u32) -> u32 {
        let Some(size) = align_up(size).filter(|s| *s > 0) else {
            return NULL;
        };

        let Some(index) = self.free.iter().position(|b| b.len() >= size) else {
            return NULL;
        };

        let block = &mut self.free[index];
        let ptr = block.start;
        block.start += size;
        if block.is_empty() {
            self.free.remove(index);
        }

        self.allocated.insert(ptr, ptr + size);
        ptr
    }

    /// Free an allocation; unknown addresses are ignored
    pub fn free(&mut self, ptr: u32) -> bool {
        match self.allocated.remove(&ptr) {
            Some(end) => {
                self.release(MemoryBlock::new(ptr, end));
                true
            }
            None => false,
        }
    }

    /// Return a block to the free list, merging with its neighbours
    fn release(&mut self, block: MemoryBlock) {
        if block.is_empty() {
            return;
        }

        let index = self.free.partition_point(|b| b.start < block.start);
        self.free.insert(index, block);

        if index + 1 < self.free.len() && self.free[index].end == self.free[index + 1].start {
            self.free[index].end = self.free[index + 1].end;
            self.free.remove(index + 1);
        }

        if index > 0 && self.free[index - 1].end == self.free[index].start {
            self.free[index - 1].end = self.free[index].end;
            self.free.remove(index);
        }
    }

    /// Resize an allocation, moving it when it cannot grow in place
    ///
    /// A failed resize returns `NULL` and leaves the original block intact.
    pub fn realloc(
        &mut self,
        memory: &mut LinearMemory,
        ptr: u32,
        size: u32,
    ) -> Result<u32, MemoryError> {
        if ptr == NULL {
            return Ok(self.alloc(size));
        }

        if size == 0 {
            self.free(ptr);
            return Ok(NULL);
        }

        let Some(&end) = self.allocated.get(&ptr) else {
            return Ok(NULL);
        };
        let Some(wanted) = align_up(size) else {
            return Ok(NULL);
        };

        let current = end - ptr;
        if wanted <= current {
            self.allocated.insert(ptr, ptr + wanted);
            self.release(MemoryBlock::new(ptr + wanted, end));
            return Ok(ptr);
        }

        let extra = wanted - current;
        if let Some(index) = self.free.iter().position(|b| b.start == end && b.len() >= extra) {
            let block = &mut self.free[index];
            block.start += extra;
            if block.is_empty() {
                self.free.remove(index);
            }
            self.allocated.insert(ptr, ptr + wanted);
            return Ok(ptr);
        }

        let moved = self.alloc(size);
        if moved == NULL {
            return Ok(NULL);
        }

        memory.copy_within(ptr, moved, current)?;
        self.free(ptr);
        Ok(moved)
    }

    /// Allocate a zeroed array, `NULL` when `count * size` overflows
    pub fn calloc(
        &mut self,
        memory: &mut LinearMemory,
        count: u32,
        size: u32,
    ) -> Result<u32, MemoryError> {
        let Some(total) = count.checked_mul(size) else {
            return Ok(NULL);
        };

        let ptr = self.alloc(total);
        if ptr != NULL {
            let len = self.size_of(ptr).unwrap_or(total);
            memory.fill(ptr, len, 0)?;
        }
        Ok(ptr)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    fn assert_free_list_valid(heap: &Heap) {
        for pair in heap.free_blocks().windows(2) {
            assert!(pair[0].end < pair[1].start, "blocks overlap or touch: {:?}", pair);
        }
        for block in heap.free_blocks() {
            assert!(!block.is_empty());
        }
    }

    #[test]
    fn test_memory_bounds() {
        let mut mem = LinearMemory::new(1);
        assert_eq!(mem.size(), 65536);
        assert!(mem.write_u32(65532, 7).is_ok());
        assert_eq!(mem.read_u32(65532).unwrap(), 7);
        assert!(matches!(
            mem.write_u32(65534, 7),
            Err(MemoryError::OutOfBounds { address: 65534, size: 4, .. })
        ));
        assert!(mem.read(u32::MAX, 2).is_err());
    }

    #[test]
    fn test_memory_cstrings() {
        let mut mem = LinearMemory::new(1);
        mem.write_cstring(100, b"hello").unwrap();
        assert_eq!(mem.strlen(100).unwrap(), 5);
        assert_eq!(mem.read_cstring(100).unwrap().as_deref(), Some("hello"));
        assert_eq!(mem.read_cstring(NULL).unwrap(), None);

        mem.fill(65530, 6, b'x').unwrap();
        assert!(matches!(
            mem.strlen(65530),
            Err(MemoryError::Unterminated { address: 65530 })
        ));
    }

    #[test]
    fn test_memory_copy_overlapping() {
        let mut mem = LinearMemory::new(1);
        mem.write(10, b"abcdef").unwrap();
        mem.copy_within(10, 12, 4).unwrap();
        assert_eq!(mem.read(10, 6).unwrap(), b"ababcd");
    }

    #[test]
    fn test_stack_int_widths() {
        assert_eq!(Stack::int_width(0), 1);
        assert_eq!(Stack::int_width(0xff), 1);
        assert_eq!(Stack::int_width(0x100), 2);
        assert_eq!(Stack::int_width(0xffff), 2);
        assert_eq!(Stack::int_width(0x1_0000), 4);
        assert_eq!(Stack::int_width(u32::MAX), 4);
    }

    #[test]
    fn test_stack_int_push_keeps_value() {
        let mut mem = LinearMemory::new(1);
        let mut stack = Stack::new(1024, 1100);

        for value in [0x7f, 0x100, 0xffff, 0x1_0000, 0x12_3456, u32::MAX] {
            let ptr = stack.push(&mut mem, StackValue::Int(value)).unwrap();
            let width = Stack::int_width(value);
            let mut bytes = [0u8; 4];
            bytes[..width as usize].copy_from_slice(&mem.read(ptr, width).unwrap());
            assert_eq!(u32::from_le_bytes(bytes), value);
            assert_eq!(stack.pointer(), ptr + width);
        }
    }

    #[test]
    fn test_stack_push_pop_restore() {
        let mut mem = LinearMemory::new(1);
        let mut stack = Stack::new(1024, 1100);

        let mark = stack.mark();
        let a = stack.push(&mut mem, StackValue::Int(5)).unwrap();
        let b = stack.push(&mut mem, StackValue::Str("hi")).unwrap();
        let c = stack.push(&mut mem, StackValue::Float(1.5)).unwrap();
        assert_eq!(a, 1024);
        assert_eq!(b, 1025);
        assert_eq!(c, 1028);
        assert_eq!(mem.read_cstring(b).unwrap().as_deref(), Some("hi"));
        assert_eq!(mem.read_f64(c).unwrap(), 1.5);

        assert_eq!(stack.pop(), c);
        assert_eq!(stack.pointer(), c);
        assert_eq!(stack.restore(mark), vec![b, a]);
        assert_eq!(stack.pointer(), 1024);
        assert_eq!(stack.pop(), NULL);
    }

    #[test]
    fn test_stack_overflow_returns_null() {
        let mut mem = LinearMemory::new(1);
        let mut stack = Stack::new(1024, 1030);
        assert_eq!(stack.push(&mut mem, StackValue::Bytes(&[0; 8])).unwrap(), NULL);
        assert_eq!(stack.depth(), 0);
        assert_ne!(stack.push(&mut mem, StackValue::Bytes(&[0; 6])).unwrap(), NULL);
    }

    #[test]
    fn test_heap_alloc_is_aligned_and_first_fit() {
        let mut heap = Heap::new(3, 1024);
        let a = heap.alloc(3);
        let b = heap.alloc(9);
        assert_eq!(a, 8);
        assert_eq!(b, 16);
        assert_eq!(heap.size_of(b), Some(16));
        assert_eq!(heap.alloc(0), NULL);
        assert_eq!(heap.alloc(4096), NULL);

        heap.free(a);
        assert_eq!(heap.alloc(8), a);
    }

    #[test]
    fn test_heap_free_coalesces() {
        let mut heap = Heap::new(8, 8 + 64);
        let ptrs: Vec<u32> = (0..8).map(|_| heap.alloc(8)).collect();
        assert!(heap.free_blocks().is_empty());

        for &p in &[ptrs[1], ptrs[5], ptrs[3], ptrs[2], ptrs[4]] {
            assert!(heap.free(p));
            assert_free_list_valid(&heap);
        }
        assert_eq!(heap.free_blocks(), &[MemoryBlock::new(ptrs[1], ptrs[6])]);

        assert!(!heap.free(ptrs[1]));
        assert!(!heap.free(NULL));
        assert!(!heap.free(9999));

        for &p in &[ptrs[0], ptrs[6], ptrs[7]] {
            heap.free(p);
        }
        assert_eq!(heap.free_blocks(), &[MemoryBlock::new(8, 72)]);
        assert_eq!(heap.allocation_count(), 0);
    }

    #[test]
    fn test_heap_random_sequence_keeps_invariants() {
        let mut heap = Heap::new(8, 4096);
        let mut live = Vec::new();
        let mut seed = 0x2545_f491u32;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if seed % 3 == 0 && !live.is_empty() {
                let p = live.swap_remove((seed as usize / 3) % live.len());
                assert!(heap.free(p));
            } else {
                let p = heap.alloc(seed % 120 + 1);
                if p != NULL {
                    live.push(p);
                }
            }
            assert_free_list_valid(&heap);
        }
        for p in live {
            heap.free(p);
        }
        assert_eq!(heap.free_blocks(), &[MemoryBlock::new(8, 4096)]);
    }

    #[test]
    fn test_heap_realloc_preserves_prefix() {
        let mut mem = LinearMemory::new(1);
        let mut heap = Heap::new(8, 1024);

        let p = heap.alloc(8);
        mem.write(p, b"abcdefgh").unwrap();
        let blocker = heap.alloc(8);

        let moved = heap.realloc(&mut mem, p, 32).unwrap();
        assert_ne!(moved, p);
        assert_eq!(mem.read(moved, 8).unwrap(), b"abcdefgh");
        assert!(!heap.is_allocated(p));

        let shrunk = heap.realloc(&mut mem, moved, 4).unwrap();
        assert_eq!(shrunk, moved);
        assert_eq!(heap.size_of(shrunk), Some(8));
        assert_eq!(mem.read(shrunk, 4).unwrap(), b"abcd");

        let grown = heap.realloc(&mut mem, shrunk, 24).unwrap();
        assert_eq!(grown, shrunk);

        assert_eq!(heap.realloc(&mut mem, NULL, 8).unwrap(), p);
        assert_eq!(heap.realloc(&mut mem, blocker, 0).unwrap(), NULL);
        assert!(!heap.is_allocated(blocker));
    }

    #[test]
    fn test_heap_failed_realloc_keeps_original() {
        let mut mem = LinearMemory::new(1);
        let mut heap = Heap::new(8, 40);
        let p = heap.alloc(8);
        let _q = heap.alloc(8);
        mem.write(p, b"keep").unwrap();
        assert_eq!(heap.realloc(&mut mem, p, 64).unwrap(), NULL);
        assert!(heap.is_allocated(p));
        assert_eq!(mem.read(p, 4).unwrap(), b"keep");
    }

    #[test]
    fn test_heap_calloc() {
        let mut mem = LinearMemory::new(1);
        let mut heap = Heap::new(8, 1024);
        mem.fill(8, 32, 0xaa).unwrap();

        let p = heap.calloc(&mut mem, 4, 4).unwrap();
        assert_eq!(mem.read(p, 16).unwrap(), vec![0u8; 16]);
        assert_eq!(heap.calloc(&mut mem, u32::MAX, 2).unwrap(), NULL);
    }
}
