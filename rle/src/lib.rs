//! Run-length codec used for accelerator bitmap payloads
//!
//! Every block starts with a one byte header: the upper six bits hold
//! `count - 1`, the lower two bits the block size. A block size of zero is a
//! literal run of `count` bytes, sizes 1 to 3 are a short pattern repeated
//! `count` times.

pub use iter::*;

mod iter;

/// Maximum value of the six bit count field
pub const MAX_BLOCK_COUNT: usize = 64;
/// Longest literal run emitted by the encoder
pub const MAX_LITERAL_LEN: usize = 32;
/// Longest repeatable pattern
pub const MAX_PATTERN_LEN: usize = 3;

const COUNT_SHIFT: u8 = 2;
const BLOCK_SIZE_MASK: u8 = 0x03;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RleError {
    /// The input ended before the block starting at `offset` was complete
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
}

impl std::error::Error for RleError {}

impl std::fmt::Display for RleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RleError::Truncated {
                offset,
                needed,
                available,
            } => write!(
                f,
                "RLE block at offset {offset} needs {needed} bytes, \
                 {available} available"
            ),
        }
    }
}

/// Encode `input`, choosing the block with the best output/input ratio at
/// every position
pub fn encode(mut input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len() / 2);

    while !input.is_empty() {
        let block = best_block(input);
        block.write_to(&mut output);
        input = &input[block.decoded_len()..];
    }

    output
}

pub fn decode(input: &[u8]) -> Result<Vec<u8>, RleError> {
    let mut output = Vec::with_capacity(input.len() * 2);
    for block in RleBlocks::new(input) {
        block?.expand_into(&mut output);
    }
    Ok(output)
}

/// Size of the decoded data without expanding it
pub fn decoded_len(input: &[u8]) -> Result<usize, RleError> {
    RleBlocks::new(input)
        .map(|block| block.map(|b| b.decoded_len()))
        .sum()
}

fn best_block(input: &[u8]) -> RleBlock<'_> {
    let literal_len = input.len().min(MAX_LITERAL_LEN);
    let mut best = RleBlock::Literal(&input[..literal_len]);
    let mut best_cost = block_cost(literal_len + 1, literal_len);

    for pattern_len in 1..=MAX_PATTERN_LEN {
        let Some(count) = repeat_count(input, pattern_len) else {
            break;
        };
        let cost = block_cost(pattern_len + 1, pattern_len * count);
        // ties keep the earlier candidate
        if cost < best_cost {
            best = RleBlock::Repeat {
                pattern: &input[..pattern_len],
                count,
            };
            best_cost = cost;
        }
    }

    best
}

/// How many times the leading `pattern_len` bytes repeat back to back
fn repeat_count(input: &[u8], pattern_len: usize) -> Option<usize> {
    let pattern = input.get(..pattern_len)?;
    Some(
        input
            .chunks_exact(pattern_len)
            .take_while(|chunk| *chunk == pattern)
            .take(MAX_BLOCK_COUNT)
            .count(),
    )
}

/// Encoded bytes per consumed byte, in thousandths
fn block_cost(output_len: usize, input_len: usize) -> usize {
    1000 * output_len / input_len
}

pub(crate) fn make_header(count: usize, block_size: usize) -> u8 {
    debug_assert!((1..=MAX_BLOCK_COUNT).contains(&count));
    debug_assert!(block_size <= MAX_PATTERN_LEN);
    (((count - 1) as u8) << COUNT_SHIFT) | block_size as u8
}

pub(crate) fn header_count(header: u8) -> usize {
    (header >> COUNT_SHIFT) as usize + 1
}

pub(crate) fn header_block_size(header: u8) -> usize {
    (header & BLOCK_SIZE_MASK) as usize
}
