use quarry_core::{ChunkingConfig, QuarryError, QuarryResult};
use serde::{Deserialize, Serialize};

/// Sentence endings a chunk may be cut after.
const SENTENCE_ENDINGS: [[char; 2]; 4] = [['.', ' '], ['.', '\n'], ['!', ' '], ['?', ' ']];

/// A segment of a document produced by [`Chunker::chunk`].
///
/// `start..end` is the character range the chunk was cut from, before
/// whitespace trimming. Later ranges overlap their predecessor by the
/// configured overlap; the first two overlap by twice that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Trimmed text of the chunk.
    pub content: String,
    /// Position of this chunk within the document.
    pub index: usize,
    /// Number of chunks the document produced.
    pub total: usize,
    /// First character of the source range.
    pub start: usize,
    /// One past the last character of the source range.
    pub end: usize,
}

/// Splits documents into overlapping, boundary-aware segments.
///
/// Sizes are measured in characters (Unicode scalar values). A chunk prefers
/// to end at a paragraph break, then at a sentence ending, as long as the
/// break lies past the middle of the window; otherwise it is cut at exactly
/// `chunk_size` characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails with [`QuarryError::InvalidArgument`] unless
    /// `0 < chunk_size` and `overlap < chunk_size`; with a larger overlap the
    /// walk could stop making forward progress.
    pub fn new(chunk_size: usize, overlap: usize) -> QuarryResult<Self> {
        if chunk_size == 0 {
            return Err(QuarryError::InvalidArgument(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(QuarryError::InvalidArgument(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Build from the `[chunking]` section of a config.
    pub fn from_config(config: &ChunkingConfig) -> QuarryResult<Self> {
        Self::new(config.chunk_size, config.overlap)
    }

    /// Target chunk length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters each chunk repeats from its predecessor.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `content` into chunks. Whitespace-only segments are dropped, so
    /// blank input yields no chunks.
    pub fn chunk(&self, content: &str) -> Vec<Chunk> {
        let chars: Vec<char> = content.chars().collect();
        let len = chars.len();

        let mut ranges: Vec<(usize, usize)> = Vec::new();
        if len <= self.chunk_size {
            ranges.push((0, len));
        } else {
            let mut position = 0;
            while position < len {
                let (start, end) = self.next_range(&chars, position);
                ranges.push((start, end));
                if end >= len {
                    break;
                }

                let next = self.advance(position, start, end);
                debug_assert!(next > position, "chunker must advance");
                position = next;
            }
        }

        let pieces: Vec<(String, usize, usize)> = ranges
            .into_iter()
            .filter_map(|(start, end)| {
                let text: String = chars[start..end].iter().collect();
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| (trimmed.to_string(), start, end))
            })
            .collect();

        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(index, (content, start, end))| Chunk {
                content,
                index,
                total,
                start,
                end,
            })
            .collect()
    }

    /// Position of the next chunk: the range length minus the overlap past
    /// `position`. Only called while content remains.
    fn advance(&self, position: usize, start: usize, end: usize) -> usize {
        (position + (end - start)).saturating_sub(self.overlap)
    }

    /// Pick the character range for the chunk beginning at `position`.
    fn next_range(&self, chars: &[char], position: usize) -> (usize, usize) {
        let len = chars.len();
        let start = if position > 0 && self.overlap > 0 {
            position.saturating_sub(self.overlap)
        } else {
            position
        };
        let end = (position + self.chunk_size).min(len);
        if end >= len {
            return (start, end);
        }

        let window = &chars[start..end];
        let midpoint = self.chunk_size / 2;
        // A break is usable only past the midpoint and only if the next
        // chunk still starts after `position`.
        let usable = |cut: usize| cut > midpoint && self.advance(position, start, start + cut) > position;

        if let Some(at) = rfind_pair(window, |pair| pair == ['\n', '\n']) {
            if usable(at) {
                return (start, start + at);
            }
        }
        if let Some(at) = rfind_pair(window, |pair| SENTENCE_ENDINGS.contains(&pair)) {
            // Keep the punctuation, drop the separator.
            if usable(at + 1) {
                return (start, start + at + 1);
            }
        }
        (start, end)
    }
}

/// Index of the last adjacent pair in `window` accepted by `matches`.
fn rfind_pair(window: &[char], matches: impl Fn([char; 2]) -> bool) -> Option<usize> {
    window
        .windows(2)
        .rposition(|w| matches([w[0], w[1]]))
}

/// Split `content` into chunk strings. Convenience wrapper over [`Chunker`].
pub fn chunk_document(content: &str, chunk_size: usize, overlap: usize) -> QuarryResult<Vec<String>> {
    let chunker = Chunker::new(chunk_size, overlap)?;
    Ok(chunker
        .chunk(content)
        .into_iter()
        .map(|c| c.content)
        .collect())
}
