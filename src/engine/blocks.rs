//! Balanced block matching.
//!
//! `{{#each}}`, `{{#if}}` and `{{#with}}` blocks nest, so a regex alone
//! cannot find where a block ends. The matcher collects every open and close
//! tag of one kind, merges them by offset and walks them with a stack:
//!
//! ```text
//! {{#each a}} x {{#each b}} y {{/each}} z {{/each}}
//! push        ^ push          pop         pop -> stack empty, emit block
//! ```
//!
//! Only top-level blocks are emitted; nested ones stay inside their parent's
//! `content` and are found again when the pipeline recurses into it.

use crate::error::{Error, Result, Unbalanced};
use regex::Regex;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    Each,
    With,
}

impl BlockKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Each => "each",
            BlockKind::With => "with",
        }
    }

    fn open_tag(self) -> &'static Regex {
        match self {
            BlockKind::If => crate::regex!(r"\{\{#if(?:\s+([^}]*))?\}\}"),
            BlockKind::Each => crate::regex!(r"\{\{#each(?:\s+([^}]*))?\}\}"),
            BlockKind::With => crate::regex!(r"\{\{#with(?:\s+([^}]*))?\}\}"),
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            BlockKind::If => "{{/if}}",
            BlockKind::Each => "{{/each}}",
            BlockKind::With => "{{/with}}",
        }
    }
}

/// One top-level block found in a source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMatch<'a> {
    pub kind: BlockKind,
    /// Byte offset of the open tag.
    pub from: usize,
    /// Byte offset just past the close tag.
    pub to: usize,
    /// Raw expression of the open tag, trimmed.
    pub arguments: &'a str,
    /// Text between the open and close tags.
    pub content: &'a str,
    /// The whole block, tags included.
    pub source: &'a str,
}

impl BlockMatch<'_> {
    pub fn range(&self) -> Range<usize> {
        self.from..self.to
    }
}

enum Tag<'a> {
    Open { at: usize, end: usize, arguments: &'a str },
    Close { at: usize, end: usize },
}

impl Tag<'_> {
    fn at(&self) -> usize {
        match self {
            Tag::Open { at, .. } | Tag::Close { at, .. } => *at,
        }
    }
}

pub fn find_blocks(src: &str, kind: BlockKind) -> Result<Vec<BlockMatch<'_>>> {
    let mut tags: Vec<Tag<'_>> = kind
        .open_tag()
        .captures_iter(src)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let arguments = caps.get(1).map_or("", |a| a.as_str().trim());
            Some(Tag::Open { at: m.start(), end: m.end(), arguments })
        })
        .collect();
    let close = kind.close_tag();
    tags.extend(src.match_indices(close).map(|(at, _)| Tag::Close { at, end: at + close.len() }));
    tags.sort_by_key(Tag::at);

    let mut stack: Vec<(usize, usize, &str)> = Vec::new();
    let mut blocks = Vec::new();
    for tag in tags {
        match tag {
            Tag::Open { at, end, arguments } => stack.push((at, end, arguments)),
            Tag::Close { at, end } => {
                let Some((from, open_end, arguments)) = stack.pop() else {
                    return Err(Error::UnbalancedBlock {
                        kind: kind.name(),
                        reason: Unbalanced::MissingOpeningTag,
                        offset: at,
                    });
                };
                if stack.is_empty() {
                    blocks.push(BlockMatch {
                        kind,
                        from,
                        to: end,
                        arguments,
                        content: &src[open_end..at],
                        source: &src[from..end],
                    });
                }
            }
        }
    }

    if let Some(&(offset, _, _)) = stack.first() {
        return Err(Error::UnbalancedBlock { kind: kind.name(), reason: Unbalanced::MissingClosingTag, offset });
    }
    Ok(blocks)
}

pub fn find_each_blocks(src: &str) -> Result<Vec<BlockMatch<'_>>> {
    find_blocks(src, BlockKind::Each)
}

/// Byte ranges covered by the top-level blocks of `kind`.
pub(crate) fn block_ranges(src: &str, kind: BlockKind) -> Result<Vec<Range<usize>>> {
    Ok(find_blocks(src, kind)?.iter().map(BlockMatch::range).collect())
}

pub(crate) fn inside(pos: usize, ranges: &[Range<usize>]) -> bool {
    ranges.iter().any(|r| r.contains(&pos))
}

/// Split an `if` body at its own `{{else}}`, skipping those of nested ifs.
pub(crate) fn split_else(content: &str) -> (&str, Option<&str>) {
    const ELSE: &str = "{{else}}";
    let open = BlockKind::If.open_tag();
    let close = BlockKind::If.close_tag();

    let mut depth = 0usize;
    let mut i = 0;
    while let Some(rel) = content[i..].find("{{") {
        let at = i + rel;
        let rest = &content[at..];
        if rest.starts_with(ELSE) && depth == 0 {
            return (&content[..at], Some(&content[at + ELSE.len()..]));
        }
        if rest.starts_with(close) {
            depth = depth.saturating_sub(1);
            i = at + close.len();
        } else if let Some(m) = open.find_at(content, at).filter(|m| m.start() == at) {
            depth += 1;
            i = m.end();
        } else {
            i = at + 2;
        }
    }
    (content, None)
}
