//! "eightfive" bit packing of lowercase runs
//!
//! A lowercase letter carries 5 bits of information (alphabet position
//! 0-25), so a run of letters can be repacked into bytes at 8/5 density.
//! Symbols are packed MSB-first into a bit accumulator; every full byte is
//! emitted and the last partial byte is zero-padded. Runs shorter than
//! [`MIN_PACKED_RUN`] stay literal.
//!
//! Packed output depends only on run content and length, never on what
//! surrounds the run. A search term therefore matches packed data only when
//! its lowercase runs coincide with whole runs (or run prefixes) of the
//! stored line: `"error"` is found in `"an error occurred"`, `"rror"` is not.

use crate::fold::Symbol;

/// Shortest lowercase run worth packing
pub const MIN_PACKED_RUN: usize = 3;

const QUINTET_BITS: u32 = 5;

/// Number of packed bytes for a run of `len` letters
pub const fn packed_len(len: usize) -> usize {
    (len * QUINTET_BITS as usize).div_ceil(8)
}

/// Pack 5-bit symbols into bytes, MSB-first, zero-padding the final byte
pub fn pack_quintets(quintets: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(packed_len(quintets.len()));
    // Holds fewer than 8 pending bits between iterations
    let mut acc: u16 = 0;
    let mut bits: u32 = 0;

    for &quintet in quintets {
        acc = (acc << QUINTET_BITS) | u16::from(quintet & 0x1f);
        bits += QUINTET_BITS;

        if bits >= 8 {
            bits -= 8;
            packed.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }

    if bits > 0 {
        packed.push((acc << (8 - bits)) as u8);
    }

    packed
}

/// Replace every lowercase run of length >= 3 with its packed bytes.
///
/// Packed bytes render as the code points U+0000-U+00FF. Everything that is
/// not a literal lowercase letter passes through unchanged.
pub fn pack_runs(input: &[Symbol]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run = Vec::new();

    for &symbol in input {
        if let Some(quintet) = symbol.quintet() {
            run.push(quintet);
            continue;
        }
        flush_run(&mut run, &mut out);
        out.push(symbol.as_char());
    }
    flush_run(&mut run, &mut out);

    out
}

fn flush_run(run: &mut Vec<u8>, out: &mut String) {
    if run.len() < MIN_PACKED_RUN {
        out.extend(run.iter().map(|&q| char::from(b'a' + q)));
    } else {
        out.extend(pack_quintets(run).into_iter().map(char::from));
    }
    run.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fold::symbols;

    /// Bit-string model: write every quintet as 5 bits, then cut into bytes
    fn reference_pack(quintets: &[u8]) -> Vec<u8> {
        let bits: Vec<bool> = quintets
            .iter()
            .flat_map(|&q| (0..5).rev().map(move |i| (q >> i) & 1 == 1))
            .collect();

        bits.chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |byte, (i, &bit)| byte | (u8::from(bit) << (7 - i)))
            })
            .collect()
    }

    fn sample_run(len: usize, seed: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 7 + seed * 11 + i * i) % 26) as u8).collect()
    }

    #[test]
    fn test_matches_reference_model_for_all_run_lengths() {
        for len in MIN_PACKED_RUN..=32 {
            for seed in 0..26 {
                let run = sample_run(len, seed);
                assert_eq!(pack_quintets(&run), reference_pack(&run), "len {} seed {}", len, seed);
            }
            let all_z = vec![25u8; len];
            assert_eq!(pack_quintets(&all_z), reference_pack(&all_z), "len {} all z", len);
        }
    }

    #[test]
    fn test_output_length_depends_only_on_run_length() {
        for len in MIN_PACKED_RUN..=32 {
            let a = pack_quintets(&vec![0u8; len]);
            let z = pack_quintets(&vec![25u8; len]);
            assert_eq!(a.len(), packed_len(len));
            assert_eq!(z.len(), packed_len(len));
        }
    }

    #[test]
    fn test_known_vectors() {
        // 00000 00001 00010 + pad -> 00000000 01000100
        assert_eq!(pack_quintets(&[0, 1, 2]), vec![0x00, 0x44]);
        assert_eq!(pack_runs(&symbols("abc")), "\u{0}D");
        assert_eq!(pack_runs(&symbols("error")), "\u{24}\u{62}\u{e8}\u{80}");
    }

    #[test]
    fn test_short_runs_stay_literal() {
        assert_eq!(pack_runs(&symbols("")), "");
        assert_eq!(pack_runs(&symbols("a")), "a");
        assert_eq!(pack_runs(&symbols("ab cd")), "ab cd");
        assert_eq!(pack_runs(&symbols("x-y-zz")), "x-y-zz");
    }

    #[test]
    fn test_runs_are_bounded_by_non_lowercase() {
        let packed = pack_runs(&symbols("abcXabc"));
        assert_eq!(packed, "\u{0}DX\u{0}D");
        // Trailing run is packed too
        assert_eq!(pack_runs(&symbols("X abc")), "X \u{0}D");
    }

    #[test]
    fn test_folded_letters_do_not_join_runs() {
        let input = [
            Symbol::Literal('a'),
            Symbol::Literal('b'),
            Symbol::Folded('c'),
        ];
        assert_eq!(pack_runs(&input), "abc");
    }

    #[test]
    fn test_deterministic() {
        let line = symbols("session opened for user root by uid");
        assert_eq!(pack_runs(&line), pack_runs(&line));
    }
}
