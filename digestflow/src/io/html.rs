//! Markdown to HTML rendering for object-store outputs.

use pulldown_cmark::{html, Event, Options, Parser};

/// Content type of Markdown documents.
pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Content type of rendered HTML pages.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

const DEFAULT_TITLE: &str = "Digest";

/// Renders `markdown` as a standalone HTML page.
///
/// The page title is the first level-one heading, or `Digest` without one.
#[must_use]
pub fn markdown_to_html(markdown: &str) -> String {
    let options =
        Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut body = String::with_capacity(markdown.len() + markdown.len() / 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    let mut title = String::new();
    html::push_html(
        &mut title,
        std::iter::once(Event::Text(document_title(markdown).into())),
    );

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n</head>\n<body>\n{body}</body>\n</html>\n"
    )
}

fn document_title(markdown: &str) -> &str {
    markdown
        .lines()
        .find_map(|line| line.trim_start().strip_prefix("# "))
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_TITLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_renders_markdown_body() {
        let page = markdown_to_html("# Daily digest\n\n- one\n- **two**\n");
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<h1>Daily digest</h1>"));
        assert!(page.contains("<li><strong>two</strong></li>"));
        assert!(page.ends_with("</html>\n"));
    }

    #[test]
    fn test_title_from_first_heading() {
        let page = markdown_to_html("intro\n\n# Report <A & B>\n\n# Second\n");
        assert!(page.contains("<title>Report &lt;A &amp; B&gt;</title>"));
    }

    #[test]
    fn test_default_title_without_heading() {
        assert_eq!(document_title("## only a subheading\ntext"), "Digest");
        assert!(markdown_to_html("plain").contains("<title>Digest</title>"));
    }

    #[test]
    fn test_tables_enabled() {
        let page = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(page.contains("<table>"));
    }
}
