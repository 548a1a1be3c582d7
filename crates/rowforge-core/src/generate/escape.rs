//! Escape handling shared by the `const`/`chars` directives and the pattern
//! compiler: octal, hex and unicode escapes, control-character shorthands,
//! and the regex class shorthands (`\d`, `\s`, `\w`, `\h`, `\H`).

use crate::error::{Result, RowforgeError};

/// Character-sequence spec behind the `.` wildcard: printable ASCII.
pub const PRINTABLE: &str = " -~";

/// Class shorthands, expanded to character-sequence specs.
pub fn class_shorthand(c: char) -> Option<&'static str> {
    Some(match c {
        'd' => "0-9",
        's' => " \t\r\n\u{B}\u{C}",
        'w' => "a-zA-Z0-9_",
        'h' => "0-9a-f",
        'H' => "0-9A-F",
        _ => return None,
    })
}

/// Control-character shorthands.
fn control_shorthand(c: char) -> Option<char> {
    Some(match c {
        '0' => '\0',
        'a' => '\u{7}',
        'b' => '\u{8}',
        'f' => '\u{C}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\u{B}',
        _ => return None,
    })
}

/// POSIX character classes usable as `[:name:]`, as char-sequence specs.
pub fn posix_class(name: &str) -> Option<&'static str> {
    Some(match name {
        "alpha" => "A-Za-z",
        "alnum" => "A-Za-z0-9",
        "ascii" => " -~",
        "blank" => " \t",
        "cntrl" => "\\000-\\037\\177",
        "digit" => "0-9",
        "graph" => "!-~",
        "lower" => "a-z",
        "print" => " -~",
        "punct" => " -/:-@[-^`{-~",
        "space" => "\\s",
        "upper" => "A-Z",
        "word" => "\\w",
        "xdigit" => "0-9a-fA-F",
        _ => return None,
    })
}

fn hex_digits(chars: &[char], start: usize, count: usize) -> Option<u32> {
    if start + count > chars.len() {
        return None;
    }
    let mut v: u32 = 0;
    for c in &chars[start..start + count] {
        v = v.checked_mul(16)? + c.to_digit(16)?;
    }
    Some(v)
}

fn octal_digits(chars: &[char], start: usize) -> Option<u32> {
    if start + 3 > chars.len() {
        return None;
    }
    if !('0'..='2').contains(&chars[start]) {
        return None;
    }
    let mut v: u32 = 0;
    for c in &chars[start..start + 3] {
        v = v * 8 + c.to_digit(8)?;
    }
    Some(v)
}

/// Unescape a directive string. With `regexp` set, the class shorthands
/// expand to their character-sequence specs instead of being taken literally.
pub fn unescape(s: &str, regexp: bool) -> Result<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c != '\\' {
            out.push(c);
            i += 1;
            continue;
        }
        if i + 1 >= chars.len() {
            return Err(RowforgeError::Pattern {
                pattern: s.to_string(),
                message: "escaped string must not end with '\\'".to_string(),
            });
        }
        if let Some(v) = octal_digits(&chars, i + 1) {
            out.push(char_of(v, s)?);
            i += 4;
        } else if (chars[i + 1] == 'x' || chars[i + 1] == 'X') && hex_digits(&chars, i + 2, 2).is_some() {
            out.push(char_of(hex_digits(&chars, i + 2, 2).unwrap(), s)?);
            i += 4;
        } else if chars[i + 1] == 'u' && hex_digits(&chars, i + 2, 4).is_some() {
            out.push(char_of(hex_digits(&chars, i + 2, 4).unwrap(), s)?);
            i += 6;
        } else if chars[i + 1] == 'U' && hex_digits(&chars, i + 2, 8).is_some() {
            out.push(char_of(hex_digits(&chars, i + 2, 8).unwrap(), s)?);
            i += 10;
        } else {
            let c2 = chars[i + 1];
            if regexp {
                if let Some(spec) = class_shorthand(c2) {
                    out.push_str(spec);
                    i += 2;
                    continue;
                }
            }
            if let Some(ctrl) = control_shorthand(c2) {
                out.push(ctrl);
            } else {
                out.push(c2);
            }
            i += 2;
        }
    }
    Ok(out)
}

fn char_of(v: u32, s: &str) -> Result<char> {
    char::from_u32(v).ok_or_else(|| RowforgeError::Pattern {
        pattern: s.to_string(),
        message: format!("invalid character escape U+{:X}", v),
    })
}
