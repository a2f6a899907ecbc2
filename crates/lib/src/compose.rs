//! Rewrite prompt for the LLM step.

/// Build the instruction asking the model to check `raw_answer` against `original_prompt`.
///
/// Both inputs are embedded verbatim. The model must return the answer unchanged when it
/// already fits, correct it otherwise, and in every case reply with one paragraph and nothing else.
pub fn compose_rewrite_prompt(original_prompt: &str, raw_answer: &str) -> String {
    format!(
        "This is the prompt: '{original_prompt}'. And this is the response: '{raw_answer}'. \
Check whether the response correctly answers the prompt. \
If the response answers the prompt, or seems like it could be correct, return the response as it is. \
If the response is not correct for the prompt, correct it so that it answers the prompt. \
For example, if the prompt is a greeting such as 'Hi' or 'Hello' and the response does not match it, \
reply with a short greeting such as 'Hi, how can I assist you today?'. \
Always reply with exactly one paragraph containing only the response, \
with no notes, explanations, or commentary about the check."
    )
}
