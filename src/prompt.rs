//! Answer prompt assembly and source previews.

use crate::models::{ScoredChunk, SourceRef};

/// Characters of chunk text kept in a source preview.
pub const PREVIEW_CHARS: usize = 200;

const INSTRUCTIONS: &str = "\
- Answer thoroughly and in a clear structure, using only the context above
- If the context does not contain enough information to answer, say so plainly
- Cite specific details from the context, referring to passages by their [n] number
- Stay concise without leaving out relevant facts";

/// Build the single prompt sent to the generator.
///
/// Retrieved chunks are numbered in rank order so the model can cite `[n]`,
/// matching the `index + 1` of the corresponding [`SourceRef`].
pub fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[{}] {}", i + 1, c.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a research assistant answering questions about the user's documents.\n\
         Base your answer on the context passages below.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Instructions:\n{INSTRUCTIONS}\n\n\
         Answer:"
    )
}

/// First [`PREVIEW_CHARS`] characters of `text`, with `...` appended when cut.
pub fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Source list for an answer, in retrieval rank order.
pub fn source_refs(chunks: &[ScoredChunk]) -> Vec<SourceRef> {
    chunks
        .iter()
        .enumerate()
        .map(|(index, c)| SourceRef {
            content: preview(&c.text),
            metadata: c.metadata.clone(),
            index,
            score: c.score,
        })
        .collect()
}
