//! Text folding passes
//!
//! Each folder replaces a recognizable literal pattern with compact code points:
//! - Timestamps `DD:DD:DD` become three code points, one per two-digit group
//! - Dotted quads of single characters (`1.2.3.4`) lose their dots
//! - Digit runs become a single code point of the parsed value
//!
//! Folders work on [`Symbol`] sequences rather than plain strings so that a
//! folded code point is never mistaken for literal input by a later pass. A
//! folded `'8'` (from the timestamp group `56`) must not be re-folded as a
//! number, and a folded `'a'` (from the number `97`) must not join a
//! lowercase run.

/// Width of a `DD:DD:DD` timestamp window
pub const TIMESTAMP_WIDTH: usize = 8;

/// Width of a `D.D.D.D` address window
pub const IPV4_WIDTH: usize = 7;

/// A single character in a line being folded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// Character copied from the input line
    Literal(char),
    /// Code point produced by a folder
    Folded(char),
}

impl Symbol {
    /// The character this symbol renders as
    pub fn as_char(self) -> char {
        match self {
            Self::Literal(c) | Self::Folded(c) => c,
        }
    }

    /// Value of a literal ASCII digit
    pub fn digit(self) -> Option<u32> {
        match self {
            Self::Literal(c) if c.is_ascii_digit() => c.to_digit(10),
            _ => None,
        }
    }

    /// Alphabet position (0-25) of a literal ASCII lowercase letter
    pub fn quintet(self) -> Option<u8> {
        match self {
            Self::Literal(c) if c.is_ascii_lowercase() => Some(c as u8 - b'a'),
            _ => None,
        }
    }

    fn is_literal(self, expected: char) -> bool {
        self == Self::Literal(expected)
    }
}

/// Split a line into literal symbols
pub fn symbols(line: &str) -> Vec<Symbol> {
    line.chars().map(Symbol::Literal).collect()
}

/// Render symbols back into text
pub fn render(symbols: &[Symbol]) -> String {
    symbols.iter().map(|s| s.as_char()).collect()
}

/// Fold `DD:DD:DD` windows into three code points valued 0-99.
///
/// No range validation: `99:99:99` folds like any other timestamp.
pub fn fold_timestamps(input: &[Symbol]) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        if let Some(groups) = input.get(i..i + TIMESTAMP_WIDTH).and_then(timestamp_groups) {
            out.extend(groups.into_iter().map(|v| Symbol::Folded(char::from(v))));
            i += TIMESTAMP_WIDTH;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }

    out
}

fn timestamp_groups(window: &[Symbol]) -> Option<[u8; 3]> {
    if !window[2].is_literal(':') || !window[5].is_literal(':') {
        return None;
    }

    let mut groups = [0u8; 3];
    for (group, start) in groups.iter_mut().zip([0, 3, 6]) {
        let tens = window[start].digit()?;
        let ones = window[start + 1].digit()?;
        *group = (tens * 10 + ones) as u8;
    }
    Some(groups)
}

/// Fold dotted quads with single-character parts (`1.2.3.4`) into their four
/// parts.
///
/// The window is recognized by its dots alone, so `a.b.c.d` folds to `abcd`
/// too. Digits come out folded and are left alone by the numeric pass; any
/// other part keeps its symbol kind. Multi-digit octets are not recognized.
pub fn fold_ipv4(input: &[Symbol]) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        match input.get(i..i + IPV4_WIDTH).filter(|w| is_dotted_quad(w)) {
            Some(window) => {
                out.extend(window.iter().step_by(2).map(|&part| match part.digit() {
                    Some(_) => Symbol::Folded(part.as_char()),
                    None => part,
                }));
                i += IPV4_WIDTH;
            }
            None => {
                out.push(input[i]);
                i += 1;
            }
        }
    }

    out
}

fn is_dotted_quad(window: &[Symbol]) -> bool {
    [1, 3, 5].iter().all(|&offset| window[offset].is_literal('.'))
}

/// Fold maximal digit runs into one code point of the parsed value.
///
/// A run whose value is not a valid `char` (too large, or a surrogate) is kept
/// as literal digits.
pub fn fold_numbers(input: &[Symbol]) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(input.len());
    let mut run = String::new();

    for &symbol in input {
        if symbol.digit().is_some() {
            run.push(symbol.as_char());
            continue;
        }
        flush_number(&mut run, &mut out);
        out.push(symbol);
    }
    flush_number(&mut run, &mut out);

    out
}

fn flush_number(run: &mut String, out: &mut Vec<Symbol>) {
    if run.is_empty() {
        return;
    }

    match run.parse::<u32>().ok().and_then(char::from_u32) {
        Some(c) => out.push(Symbol::Folded(c)),
        None => out.extend(run.chars().map(Symbol::Literal)),
    }
    run.clear();
}
