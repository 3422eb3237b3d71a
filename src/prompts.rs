//! Prompt templates for answer generation.
//!
//! Kept in one place so prompt changes are reviewable as diffs rather than
//! scattered format strings.

/// System prompt for the answering model.
pub const ANSWER_SYSTEM_PROMPT: &str = "\
You are a research assistant answering questions about a scientific document.
Ground every claim in the provided context passages and attached figures.
When a figure supports your answer, describe what it shows. If the context
does not contain the answer, say so plainly rather than guessing.";

/// Placeholder context block used when retrieval returns nothing.
pub const EMPTY_CONTEXT_NOTE: &str = "(no supporting passages were retrieved)";

/// Build the user-turn request from the question and its retrieved context.
pub fn answer_request(question: &str, context: &str) -> String {
    format!("Question: {question}\n\nContext:\n{context}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_question_and_context() {
        let request = answer_request("What is attention?", "page 3 text");
        assert!(request.starts_with("Question: What is attention?"));
        assert!(request.contains("Context:\npage 3 text"));
    }
}
