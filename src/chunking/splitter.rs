// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Recursive separator-based text splitter
//!
//! Text is split at the coarsest separator present (paragraph, line,
//! sentence, clause, word). Pieces that fit are merged greedily into chunks
//! of at most `chunk_size` token-equivalents, carrying up to
//! `chunk_overlap` into the next chunk. Pieces that are still too long are
//! split again with the next separator, and hard-cut when none is left.

use crate::config::ChunkingConfig;
use crate::errors::{RagError, Result};
use std::collections::VecDeque;

/// Separators in order of preference; each stays attached to the piece it ends
pub const SEPARATORS: &[&str] = &[
    "\n\n", "\n", "。", "！", "？", "；", "，", ". ", "! ", "? ", " ",
];

/// Token-equivalents of `text`: one per non-ASCII char, a quarter per ASCII char
pub fn estimate_tokens(text: &str) -> usize {
    quarter_units(text).div_ceil(4)
}

// Lengths are tracked in quarter tokens so that sums stay exact
fn quarter_units(text: &str) -> usize {
    text.chars().map(char_units).sum()
}

fn char_units(c: char) -> usize {
    if c.is_ascii() {
        1
    } else {
        4
    }
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_units: usize,
    overlap_units: usize,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(RagError::Config(
                "chunk size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_units: chunk_size * 4,
            overlap_units: chunk_overlap * 4,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split `text` into trimmed, non-empty chunks
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, 0)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, level: usize) -> Vec<String> {
        let found = SEPARATORS
            .iter()
            .enumerate()
            .skip(level)
            .find(|(_, sep)| text.contains(**sep));
        let Some((sep_level, sep)) = found else {
            return self.hard_cut(text);
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in text.split_inclusive(*sep) {
            if quarter_units(piece) <= self.chunk_units {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting));
                fitting.clear();
            }
            chunks.extend(self.split_recursive(piece, sep_level + 1));
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0;

        for piece in pieces {
            let units = quarter_units(piece);
            if total + units > self.chunk_units && !window.is_empty() {
                chunks.push(window.iter().map(|(p, _)| *p).collect::<String>());
                // Keep at most `overlap` of the tail, and leave room for the new piece
                while total > self.overlap_units || (total > 0 && total + units > self.chunk_units)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece, units));
            total += units;
        }
        if !window.is_empty() {
            chunks.push(window.iter().map(|(p, _)| *p).collect::<String>());
        }
        chunks
    }

    fn hard_cut(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let mut end = start;
            let mut units = 0;
            while end < chars.len() && units + char_units(chars[end]) <= self.chunk_units {
                units += char_units(chars[end]);
                end += 1;
            }
            // A single char always fits since chunk_units >= 4
            end = end.max(start + 1);
            chunks.push(chars[start..end].iter().collect());
            if end >= chars.len() {
                break;
            }

            let mut next = end;
            let mut carried = 0;
            while next > start + 1 && carried + char_units(chars[next - 1]) <= self.overlap_units {
                carried += char_units(chars[next - 1]);
                next -= 1;
            }
            start = next;
        }
        chunks
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        let config = ChunkingConfig::default();
        Self {
            chunk_units: config.chunk_size * 4,
            overlap_units: config.chunk_overlap * 4,
        }
    }
}
