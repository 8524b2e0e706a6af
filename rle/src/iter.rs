use crate::*;

/// A single run-length block as it appears on the wire
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RleBlock<'a> {
    /// Bytes copied verbatim
    Literal(&'a [u8]),
    /// `pattern` repeated `count` times
    Repeat { pattern: &'a [u8], count: usize },
}

impl RleBlock<'_> {
    /// Number of raw bytes this block expands to
    pub fn decoded_len(&self) -> usize {
        match self {
            RleBlock::Literal(bytes) => bytes.len(),
            RleBlock::Repeat { pattern, count } => pattern.len() * count,
        }
    }

    /// Number of encoded bytes, header included
    pub fn encoded_len(&self) -> usize {
        1 + match self {
            RleBlock::Literal(bytes) => bytes.len(),
            RleBlock::Repeat { pattern, .. } => pattern.len(),
        }
    }

    pub(crate) fn write_to(&self, output: &mut Vec<u8>) {
        match self {
            RleBlock::Literal(bytes) => {
                output.push(make_header(bytes.len(), 0));
                output.extend_from_slice(bytes);
            }
            RleBlock::Repeat { pattern, count } => {
                output.push(make_header(*count, pattern.len()));
                output.extend_from_slice(pattern);
            }
        }
    }

    pub(crate) fn expand_into(&self, output: &mut Vec<u8>) {
        match self {
            RleBlock::Literal(bytes) => output.extend_from_slice(bytes),
            RleBlock::Repeat { pattern, count } => {
                for _ in 0..*count {
                    output.extend_from_slice(pattern);
                }
            }
        }
    }
}

/// Iterates over the blocks of an encoded buffer
///
/// Yields an error once if the buffer ends in the middle of a block and
/// stops afterwards.
pub struct RleBlocks<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> RleBlocks<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        RleBlocks { data, offset: 0 }
    }
}

impl<'a> Iterator for RleBlocks<'a> {
    type Item = Result<RleBlock<'a>, RleError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&header, rest) = self.data.split_first()?;
        let count = header_count(header);
        let block_size = header_block_size(header);

        let needed = if block_size == 0 { count } else { block_size };
        if rest.len() < needed {
            let err = RleError::Truncated {
                offset: self.offset,
                needed,
                available: rest.len(),
            };
            self.data = &[];
            return Some(Err(err));
        }

        let (body, remaining) = rest.split_at(needed);
        self.data = remaining;
        self.offset += 1 + needed;

        Some(Ok(if block_size == 0 {
            RleBlock::Literal(body)
        } else {
            RleBlock::Repeat {
                pattern: body,
                count,
            }
        }))
    }
}
