//! Prompt assembly for page questions.
//!
//! The instruction preamble frames every request: answer from the supplied
//! page, format in Markdown, absolutise links against the page address, and
//! keep a neutral tone. Assembly prefers the user's selection over the full
//! page body — a selection is an explicit statement of what the question is
//! about.

use crate::api::AnswerRequest;
use crate::content::PageDetails;
use crate::storage::QuickPromptCreate;

/// Instruction preamble prepended to every question.
#[must_use]
pub fn instruction_preamble() -> String {
    collapse_indentation(
        "The assistant answers questions about the web page supplied with each
        request, using the page content and the page context given below.

        Guidelines:
        - Keep the answer relevant to the question and to the supplied page.
        - Be clear and concise; avoid jargon the page itself does not use.
        - Format the answer in Markdown, using headings, lists, or quotes
          where they help.
        - When quoting links, resolve relative addresses against the page
          address and emit proper Markdown links.
        - Do not present claims the page does not support; say so when the
          page does not contain the answer, and suggest where to look
          instead.
        - Keep a neutral, objective tone.",
    )
}

/// Quick prompts seeded on first run.
#[must_use]
pub fn default_quick_prompts() -> Vec<QuickPromptCreate> {
    vec![
        QuickPromptCreate {
            title: "Summarise".to_owned(),
            prompt: "Summarise this web page.".to_owned(),
        },
        QuickPromptCreate {
            title: "Find links".to_owned(),
            prompt: "List all the links on this web page.".to_owned(),
        },
    ]
}

/// Builds the answer request for one question.
///
/// A non-empty selection replaces the full page body as the content the
/// answer should draw on; page metadata always travels in the prompt so
/// links can be absolutised and the page named.
#[must_use]
pub fn assemble(
    question: &str,
    details: &PageDetails,
    selection: &str,
    content: &str,
) -> AnswerRequest {
    let chosen = if selection.trim().is_empty() {
        content
    } else {
        selection
    };

    let mut prompt = instruction_preamble();
    prompt.push_str("\n\nPage context:\n");
    prompt.push_str(&format!("title: {}\n", details.title));
    prompt.push_str(&format!("url: {}\n", details.url));
    if !details.description.is_empty() {
        prompt.push_str(&format!("description: {}\n", details.description));
    }
    prompt.push_str("\nQuestion:\n");
    prompt.push_str(question);

    AnswerRequest {
        prompt,
        content: chosen.to_owned(),
    }
}

/// Collapses leading whitespace after every newline.
///
/// Lets the preamble live as an indented literal without shipping the
/// indentation to the answer service.
fn collapse_indentation(text: &str) -> String {
    let mut lines = text.lines().map(str::trim_start);
    let mut collapsed = String::new();
    if let Some(first) = lines.next() {
        collapsed.push_str(first);
    }
    for line in lines {
        collapsed.push('\n');
        collapsed.push_str(line);
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_details() -> PageDetails {
        PageDetails::new(
            "https://example.org/docs",
            "",
            "Example Docs",
            "documentation for example",
        )
    }

    #[test]
    fn preamble_carries_no_leading_indentation() {
        let preamble = instruction_preamble();
        assert!(!preamble.contains("\n "));
        assert!(preamble.contains("Markdown"));
    }

    #[test]
    fn assemble_prefers_selection_over_body() {
        let request = assemble("What is this?", &fixture_details(), "picked", "<p>whole page</p>");
        assert_eq!(request.content, "picked");
    }

    #[test]
    fn assemble_falls_back_to_body_when_selection_is_blank() {
        let request = assemble("What is this?", &fixture_details(), "  \n ", "<p>whole page</p>");
        assert_eq!(request.content, "<p>whole page</p>");
    }

    #[test]
    fn assemble_embeds_question_and_page_context() {
        let request = assemble("Who wrote it?", &fixture_details(), "", "body");
        assert!(request.prompt.contains("Who wrote it?"));
        assert!(request.prompt.contains("https://example.org/docs"));
        assert!(request.prompt.contains("Example Docs"));
        assert!(request.prompt.contains("documentation for example"));
    }

    #[test]
    fn default_quick_prompts_cover_summary_and_links() {
        let prompts = default_quick_prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0].title, "Summarise");
        assert_eq!(prompts[1].title, "Find links");
    }
}
