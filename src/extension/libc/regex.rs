//! `<regex.h>` over the `regex` crate
//!
//! Compiled patterns live host side, keyed by the address of the module's
//! `regex_t`. The only field written back is `re_nsub` at offset 0.

use super::Libc;
use crate::extension::abi::{NULL, RegMatch};
use crate::extension::error::Fault;
use ::regex::bytes::{Regex, RegexBuilder};

pub const REG_EXTENDED: i32 = 1;
pub const REG_ICASE: i32 = 2;
pub const REG_NOSUB: i32 = 4;
pub const REG_NEWLINE: i32 = 8;

pub const REG_NOTBOL: i32 = 1;
pub const REG_NOTEOL: i32 = 2;

pub const REG_NOMATCH: i32 = 1;
pub const REG_BADPAT: i32 = 2;

/// A pattern compiled by `regcomp`
#[derive(Debug, Clone)]
pub struct CompiledRegex {
    regex: Regex,
    flags: i32,
}

impl CompiledRegex {
    pub fn compile(pattern: &str, flags: i32) -> Result<Self, ::regex::Error> {
        let source = if flags & REG_EXTENDED != 0 {
            pattern.to_string()
        } else {
            translate_basic(pattern)
        };
        let regex = RegexBuilder::new(&source)
            .case_insensitive(flags & REG_ICASE != 0)
            .multi_line(flags & REG_NEWLINE != 0)
            .dot_matches_new_line(flags & REG_NEWLINE == 0)
            .build()?;
        Ok(Self { regex, flags })
    }

    /// Number of parenthesized subexpressions
    pub fn nsub(&self) -> usize {
        self.regex.captures_len() - 1
    }

    pub fn flags(&self) -> i32 {
        self.flags
    }

    /// Match offsets for the whole match and each group, `UNSET` where a
    /// group did not participate
    pub fn exec(&self, subject: &[u8], slots: usize) -> Option<Vec<RegMatch>> {
        let captures = self.regex.captures(subject)?;
        Some(
            (0..slots)
                .map(|i| match captures.get(i) {
                    Some(m) => RegMatch {
                        rm_so: m.start() as i32,
                        rm_eo: m.end() as i32,
                    },
                    None => RegMatch::UNSET,
                })
                .collect(),
        )
    }

    pub fn is_match(&self, subject: &[u8]) -> bool {
        self.regex.is_match(subject)
    }
}

/// Rewrite a POSIX basic expression into the extended dialect: `\( \) \{ \}
/// \| \+ \?` become operators, and their bare forms become literals
pub fn translate_basic(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(op @ ('(' | ')' | '{' | '}' | '|' | '+' | '?')) => out.push(op),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push_str("\\\\"),
            },
            '(' | ')' | '{' | '}' | '|' | '+' | '?' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

impl Libc<'_> {
    pub fn regcomp(&self, preg: u32, pattern: u32, flags: i32) -> Result<i32, Fault> {
        if preg == NULL {
            return Ok(REG_BADPAT);
        }
        let Some(pattern) = self.string(pattern)? else {
            return Ok(REG_BADPAT);
        };

        let compiled = match CompiledRegex::compile(&pattern, flags) {
            Ok(compiled) => compiled,
            Err(err) => {
                log::debug!("regcomp: {err}");
                return Ok(REG_BADPAT);
            }
        };

        let nsub = compiled.nsub() as u32;
        self.with_state(|state| -> Result<(), Fault> {
            state.memory.write_u32(preg, nsub)?;
            state.libc.regexes.insert(preg, compiled);
            Ok(())
        })??;
        Ok(0)
    }

    pub fn regexec(
        &self,
        preg: u32,
        subject: u32,
        nmatch: u32,
        pmatch: u32,
        eflags: i32,
    ) -> Result<i32, Fault> {
        let Some(compiled) = self.with_state(|state| state.libc.regexes.get(&preg).cloned())?
        else {
            return Ok(REG_BADPAT);
        };
        let subject = self.cbytes(subject)?;
        if eflags & (REG_NOTBOL | REG_NOTEOL) != 0 {
            log::debug!("regexec: eflags {eflags} ignored");
        }

        if compiled.flags() & REG_NOSUB != 0 || nmatch == 0 || pmatch == NULL {
            return Ok(if compiled.is_match(&subject) { 0 } else { REG_NOMATCH });
        }

        let Some(matches) = compiled.exec(&subject, nmatch as usize) else {
            return Ok(REG_NOMATCH);
        };
        self.memory(|memory| {
            for (i, m) in matches.iter().enumerate() {
                memory.write_pod(pmatch + i as u32 * 8, m)?;
            }
            Ok(())
        })?;
        Ok(0)
    }

    pub fn regfree(&self, preg: u32) -> Result<(), Fault> {
        self.with_state(|state| {
            state.libc.regexes.remove(&preg);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_basic() {
        assert_eq!(translate_basic(r"\(ab\)*"), "(ab)*");
        assert_eq!(translate_basic("a+b?"), r"a\+b\?");
        assert_eq!(translate_basic(r"x\{2\}"), "x{2}");
        assert_eq!(translate_basic(r"\."), r"\.");
    }

    #[test]
    fn test_exec_groups() {
        let re = CompiledRegex::compile("(a)|(b)", REG_EXTENDED).unwrap();
        assert_eq!(re.nsub(), 2);

        let matches = re.exec(b"xb", 4).unwrap();
        assert_eq!(matches[0], RegMatch { rm_so: 1, rm_eo: 2 });
        assert_eq!(matches[1], RegMatch::UNSET);
        assert_eq!(matches[2], RegMatch { rm_so: 1, rm_eo: 2 });
        assert_eq!(matches[3], RegMatch::UNSET);

        assert!(re.exec(b"zz", 1).is_none());
    }

    #[test]
    fn test_icase() {
        let re = CompiledRegex::compile("hello", REG_ICASE).unwrap();
        assert!(re.is_match(b"HeLLo world"));
        assert!(CompiledRegex::compile("(", REG_EXTENDED).is_err());
    }
}
