//! Context formatting for retrieved chunks

use super::RetrievedChunk;

/// Context used when nothing in the index matched
pub const NO_CONTEXT_NOTICE: &str = "No relevant context found in the documents.";

/// Join retrieved chunks into one context string, each under a source marker
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return NO_CONTEXT_NOTICE.to_string();
    }

    let mut output = String::new();
    for chunk in chunks {
        if !output.is_empty() {
            output.push_str("\n---\n");
        }
        output.push_str(&format!(
            "[Source: {}, chunk {}, score: {:.2}]\n",
            chunk.source, chunk.chunk_index, chunk.score,
        ));
        output.push_str(chunk.content.trim());
        output.push('\n');
    }

    output
}
