use gapfill_core::GuessRequest;

pub(crate) const SYSTEM_PROMPT: &str = "You fill gaps in text documents. \
A gap is written as |_<id>_|. Reply with the replacement text for the requested gap only, \
without quotes, explanations or markdown code blocks.";

pub(crate) fn user_prompt(request: &GuessRequest) -> String {
    format!(
        "Document:\n```\n{}\n```\n\n{}",
        request.document_text,
        request.context.to_prompt()
    )
}

/// Strip a markdown code fence wrapped around the whole reply.
pub(crate) fn strip_code_blocks(text: &str) -> String {
    let text = text.trim();

    if text.starts_with("```") && text.ends_with("```") {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() >= 2 {
            return lines[1..lines.len() - 1].join("\n");
        }
    }

    text.to_string()
}
