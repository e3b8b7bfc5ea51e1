//! printf-style format interpreter
//!
//! Arguments are read from the module's variadic buffer. Integer slots are
//! 4 bytes; doubles and `ll`-qualified integers take 8-byte aligned slots.
//! A directive this interpreter does not know is copied to the output as
//! written.

use crate::extension::abi::NULL;
use crate::extension::error::MemoryError;
use crate::extension::memory::LinearMemory;

/// Cursor over a variadic argument buffer
pub struct VaList<'m> {
    memory: &'m LinearMemory,
    cursor: u32,
}

impl<'m> VaList<'m> {
    pub fn new(memory: &'m LinearMemory, ptr: u32) -> Self {
        Self {
            memory,
            cursor: ptr,
        }
    }

    /// Address of the next unread slot
    pub fn position(&self) -> u32 {
        self.cursor
    }

    /// Claim the next `size`-byte slot aligned to `size`
    fn slot(&mut self, size: u32) -> Result<u32, MemoryError> {
        let (cursor, memory_size) = (self.cursor, self.memory.size());
        let out_of_bounds = || MemoryError::OutOfBounds {
            address: cursor,
            size,
            memory_size,
        };
        let address = cursor
            .checked_add(size - 1)
            .map(|end| end & !(size - 1))
            .ok_or_else(out_of_bounds)?;
        self.memory.check_bounds(address, size)?;
        self.cursor = address.checked_add(size).ok_or_else(out_of_bounds)?;
        Ok(address)
    }

    pub fn next_u32(&mut self) -> Result<u32, MemoryError> {
        let address = self.slot(4)?;
        self.memory.read_u32(address)
    }

    pub fn next_i32(&mut self) -> Result<i32, MemoryError> {
        self.next_u32().map(|v| v as i32)
    }

    pub fn next_i64(&mut self) -> Result<i64, MemoryError> {
        let address = self.slot(8)?;
        self.memory.read_i64(address)
    }

    pub fn next_f64(&mut self) -> Result<f64, MemoryError> {
        let address = self.slot(8)?;
        self.memory.read_f64(address)
    }

    fn string(&self, ptr: u32) -> Result<Option<Vec<u8>>, MemoryError> {
        if ptr == NULL {
            return Ok(None);
        }
        self.memory.read_cbytes(ptr).map(Some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Length {
    #[default]
    Int,
    Char,
    Short,
    Long,
    LongLong,
    LongDouble,
}

#[derive(Debug, Default)]
struct Directive {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    length: Length,
}

impl Directive {
    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        }
    }

    /// Pad `prefix` + `body` to the field width
    fn emit(&self, out: &mut Vec<u8>, prefix: &[u8], body: &[u8], zero_pad: bool) {
        let len = prefix.len() + body.len();
        let fill = self.width.saturating_sub(len);
        if self.left {
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
            out.extend(std::iter::repeat_n(b' ', fill));
        } else if zero_pad && self.zero {
            out.extend_from_slice(prefix);
            out.extend(std::iter::repeat_n(b'0', fill));
            out.extend_from_slice(body);
        } else {
            out.extend(std::iter::repeat_n(b' ', fill));
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
        }
    }
}

fn digits(fmt: &[u8], mut i: usize) -> (Option<usize>, usize) {
    let start = i;
    let mut value = 0usize;
    while i < fmt.len() && fmt[i].is_ascii_digit() {
        value = value.saturating_mul(10).saturating_add((fmt[i] - b'0') as usize);
        i += 1;
    }
    if i == start { (None, i) } else { (Some(value), i) }
}

/// Expand `fmt` against the arguments in `args`
pub fn format(fmt: &[u8], args: &mut VaList<'_>) -> Result<Vec<u8>, MemoryError> {
    let mut out = Vec::with_capacity(fmt.len());
    let len = fmt.len();
    let mut i = 0;

    while i < len {
        if fmt[i] != b'%' {
            out.push(fmt[i]);
            i += 1;
            continue;
        }

        let start = i;
        i += 1;
        if i < len && fmt[i] == b'%' {
            out.push(b'%');
            i += 1;
            continue;
        }

        let mut d = Directive::default();
        while i < len {
            match fmt[i] {
                b'-' => d.left = true,
                b'+' => d.plus = true,
                b' ' => d.space = true,
                b'#' => d.alt = true,
                b'0' => d.zero = true,
                _ => break,
            }
            i += 1;
        }

        if i < len && fmt[i] == b'*' {
            let width = args.next_i32()?;
            d.left |= width < 0;
            d.width = width.unsigned_abs() as usize;
            i += 1;
        } else {
            let (width, next) = digits(fmt, i);
            d.width = width.unwrap_or(0);
            i = next;
        }

        if i < len && fmt[i] == b'.' {
            i += 1;
            if i < len && fmt[i] == b'*' {
                let precision = args.next_i32()?;
                d.precision = usize::try_from(precision).ok();
                i += 1;
            } else {
                let (precision, next) = digits(fmt, i);
                d.precision = Some(precision.unwrap_or(0));
                i = next;
            }
        }

        while i < len {
            d.length = match (fmt[i], d.length) {
                (b'h', Length::Short) => Length::Char,
                (b'h', _) => Length::Short,
                (b'l', Length::Long) => Length::LongLong,
                (b'l', _) => Length::Long,
                (b'q' | b'j', _) => Length::LongLong,
                (b'z' | b't', _) => Length::Long,
                (b'L', _) => Length::LongDouble,
                _ => break,
            };
            i += 1;
        }

        if i >= len {
            out.extend_from_slice(&fmt[start..]);
            break;
        }

        let conversion = fmt[i];
        i += 1;
        match conversion {
            b'd' | b'i' => {
                let value = match d.length {
                    Length::LongLong => args.next_i64()?,
                    Length::Char => args.next_i32()? as i8 as i64,
                    Length::Short => args.next_i32()? as i16 as i64,
                    _ => args.next_i32()? as i64,
                };
                let body = integer_digits(value.unsigned_abs(), 10, false, d.precision);
                let prefix = d.sign(value < 0);
                d.emit(&mut out, prefix.as_bytes(), &body, d.precision.is_none());
            }
            b'u' | b'x' | b'X' | b'o' => {
                let value = match d.length {
                    Length::LongLong => args.next_i64()? as u64,
                    Length::Char => args.next_u32()? as u8 as u64,
                    Length::Short => args.next_u32()? as u16 as u64,
                    _ => args.next_u32()? as u64,
                };
                let (radix, upper) = match conversion {
                    b'x' => (16, false),
                    b'X' => (16, true),
                    b'o' => (8, false),
                    _ => (10, false),
                };
                let mut body = integer_digits(value, radix, upper, d.precision);
                let prefix: &[u8] = match conversion {
                    b'x' if d.alt && value != 0 => b"0x",
                    b'X' if d.alt && value != 0 => b"0X",
                    _ => b"",
                };
                if conversion == b'o' && d.alt && body.first() != Some(&b'0') {
                    body.insert(0, b'0');
                }
                d.emit(&mut out, prefix, &body, d.precision.is_none());
            }
            b'c' => {
                let value = args.next_i32()? as u8;
                d.emit(&mut out, b"", &[value], false);
            }
            b's' | b'S' => {
                let ptr = args.next_u32()?;
                let mut body = args.string(ptr)?.unwrap_or_else(|| b"(null)".to_vec());
                if let Some(precision) = d.precision {
                    body.truncate(precision);
                }
                d.emit(&mut out, b"", &body, false);
            }
            b'p' => {
                let ptr = args.next_u32()?;
                d.emit(&mut out, b"0x", format!("{ptr:x}").as_bytes(), false);
            }
            b'f' | b'F' | b'e' | b'E' | b'g' | b'G' => {
                let value = args.next_f64()?;
                let upper = conversion.is_ascii_uppercase();
                let negative = value.is_sign_negative() && !value.is_nan();
                let prefix = d.sign(negative);
                if !value.is_finite() {
                    let text = match (value.is_nan(), upper) {
                        (true, false) => "nan",
                        (true, true) => "NAN",
                        (false, false) => "inf",
                        (false, true) => "INF",
                    };
                    d.emit(&mut out, prefix.as_bytes(), text.as_bytes(), false);
                    continue;
                }
                let precision = d.precision.unwrap_or(6);
                let magnitude = value.abs();
                let body = match conversion.to_ascii_lowercase() {
                    b'f' => fixed(magnitude, precision, d.alt),
                    b'e' => exponential(magnitude, precision, d.alt, upper),
                    _ => general(magnitude, precision, d.alt, upper),
                };
                d.emit(&mut out, prefix.as_bytes(), body.as_bytes(), true);
            }
            b'n' => {
                // the count is never written back
                args.next_u32()?;
            }
            _ => out.extend_from_slice(&fmt[start..i]),
        }
    }

    Ok(out)
}

fn integer_digits(value: u64, radix: u32, upper: bool, precision: Option<usize>) -> Vec<u8> {
    if value == 0 && precision == Some(0) {
        return Vec::new();
    }
    let text = match (radix, upper) {
        (16, false) => format!("{value:x}"),
        (16, true) => format!("{value:X}"),
        (8, _) => format!("{value:o}"),
        _ => value.to_string(),
    };
    let min = precision.unwrap_or(1);
    let mut body = vec![b'0'; min.saturating_sub(text.len())];
    body.extend_from_slice(text.as_bytes());
    body
}

fn fixed(value: f64, precision: usize, alt: bool) -> String {
    let mut text = format!("{value:.precision$}");
    if alt && precision == 0 {
        text.push('.');
    }
    text
}

/// Mantissa and decimal exponent as Rust renders them
fn split_exponent(value: f64, precision: usize) -> (String, i32) {
    let text = format!("{value:.precision$e}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => (mantissa.to_string(), exponent.parse().unwrap_or(0)),
        None => (text, 0),
    }
}

fn exponential(value: f64, precision: usize, alt: bool, upper: bool) -> String {
    let (mut mantissa, exponent) = split_exponent(value, precision);
    if alt && precision == 0 {
        mantissa.push('.');
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{mantissa}{e}{sign}{:02}", exponent.unsigned_abs())
}

fn general(value: f64, precision: usize, alt: bool, upper: bool) -> String {
    let precision = precision.max(1);
    let exponent = if value == 0.0 {
        0
    } else {
        split_exponent(value, precision - 1).1
    };

    let text = if exponent < -4 || exponent >= precision as i32 {
        exponential(value, precision - 1, alt, upper)
    } else {
        fixed(value, (precision as i32 - 1 - exponent) as usize, alt)
    };

    if alt {
        return text;
    }

    let (number, suffix) = match text.find(['e', 'E']) {
        Some(at) => text.split_at(at),
        None => (text.as_str(), ""),
    };
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    format!("{number}{suffix}")
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    /// Lay out arguments the way a wasm32 caller packs its variadic buffer
    enum Arg<'a> {
        Int(i32),
        Long(i64),
        Double(f64),
        Str(&'a str),
    }

    fn run(fmt: &str, args: &[Arg<'_>]) -> String {
        let mut memory = LinearMemory::new(1);
        let mut strings = 4096;
        let mut cursor = 1024u32;
        for arg in args {
            match arg {
                Arg::Int(v) => {
                    memory.write_i32(cursor, *v).unwrap();
                    cursor += 4;
                }
                Arg::Long(v) => {
                    cursor = (cursor + 7) & !7;
                    memory.write_i64(cursor, *v).unwrap();
                    cursor += 8;
                }
                Arg::Double(v) => {
                    cursor = (cursor + 7) & !7;
                    memory.write_f64(cursor, *v).unwrap();
                    cursor += 8;
                }
                Arg::Str(s) => {
                    memory.write_cstring(strings, s.as_bytes()).unwrap();
                    memory.write_u32(cursor, strings).unwrap();
                    strings += s.len() as u32 + 1;
                    cursor += 4;
                }
            }
        }
        let mut va = VaList::new(&memory, 1024);
        String::from_utf8(format(fmt.as_bytes(), &mut va).unwrap()).unwrap()
    }

    #[test]
    fn test_va_list_past_end_of_address_space() {
        let memory = LinearMemory::new(1);
        let mut va = VaList::new(&memory, 0xFFFF_FFFE);
        assert!(matches!(
            format(b"%d", &mut va),
            Err(MemoryError::OutOfBounds { address: 0xFFFF_FFFE, .. })
        ));

        let mut va = VaList::new(&memory, 0xFFFF_FFF9);
        assert!(matches!(va.next_f64(), Err(MemoryError::OutOfBounds { .. })));

        // the cursor does not move past a slot it failed to read
        let mut va = VaList::new(&memory, 65534);
        assert!(va.next_u32().is_err());
        assert_eq!(va.position(), 65534);
    }

    #[test]
    fn test_int_and_string() {
        assert_eq!(run("%d-%s", &[Arg::Int(42), Arg::Str("ok")]), "42-ok");
    }

    #[test]
    fn test_percent_consumes_nothing() {
        assert_eq!(run("%%", &[]), "%");
        assert_eq!(run("100%% %d", &[Arg::Int(7)]), "100% 7");
    }

    #[test]
    fn test_flags_width_precision() {
        assert_eq!(run("[%5d]", &[Arg::Int(42)]), "[   42]");
        assert_eq!(run("[%-5d]", &[Arg::Int(42)]), "[42   ]");
        assert_eq!(run("[%05d]", &[Arg::Int(-42)]), "[-0042]");
        assert_eq!(run("[%+d]", &[Arg::Int(3)]), "[+3]");
        assert_eq!(run("[%.3d]", &[Arg::Int(7)]), "[007]");
        assert_eq!(run("[%*d]", &[Arg::Int(4), Arg::Int(1)]), "[   1]");
        assert_eq!(run("[%.2s]", &[Arg::Str("hello")]), "[he]");
    }

    #[test]
    fn test_unsigned_and_hex() {
        assert_eq!(run("%u", &[Arg::Int(-1)]), "4294967295");
        assert_eq!(run("%x %X %#x", &[Arg::Int(255), Arg::Int(255), Arg::Int(255)]), "ff FF 0xff");
        assert_eq!(run("%o %#o", &[Arg::Int(8), Arg::Int(8)]), "10 010");
        assert_eq!(run("%p", &[Arg::Int(0x400)]), "0x400");
        assert_eq!(run("%c", &[Arg::Int(b'A' as i32)]), "A");
    }

    #[test]
    fn test_long_long_and_double_alignment() {
        assert_eq!(
            run("%d %lld", &[Arg::Int(1), Arg::Long(-5_000_000_000)]),
            "1 -5000000000"
        );
        assert_eq!(run("%d %.2f", &[Arg::Int(1), Arg::Double(3.14159)]), "1 3.14");
    }

    #[test]
    fn test_floats() {
        assert_eq!(run("%f", &[Arg::Double(1.5)]), "1.500000");
        assert_eq!(run("%e", &[Arg::Double(1234.5)]), "1.234500e+03");
        assert_eq!(run("%E", &[Arg::Double(0.00012)]), "1.200000E-04");
        assert_eq!(run("%g", &[Arg::Double(100000.0)]), "100000");
        assert_eq!(run("%g", &[Arg::Double(1000000.0)]), "1e+06");
        assert_eq!(run("%g", &[Arg::Double(0.0001)]), "0.0001");
        assert_eq!(run("%g", &[Arg::Double(2.5)]), "2.5");
        assert_eq!(run("%f", &[Arg::Double(f64::INFINITY)]), "inf");
        assert_eq!(run("%08.3f", &[Arg::Double(-1.5)]), "-001.500");
    }

    #[test]
    fn test_null_string_and_unknown_directive() {
        assert_eq!(run("%s", &[Arg::Int(0)]), "(null)");
        assert_eq!(run("%y %d", &[Arg::Int(3)]), "%y 3");
        assert_eq!(run("trailing %", &[]), "trailing %");
    }
}
