//! Test fixtures.

/// Builds text of exactly `total_chars` characters with a paragraph break
/// after roughly every `paragraph_chars` characters.
#[must_use]
pub fn paragraph_text(total_chars: usize, paragraph_chars: usize) -> String {
    let body_chars = paragraph_chars.saturating_sub(2).max(1);
    let mut text = String::with_capacity(total_chars);
    let mut column = 0;
    let mut letter = b'a';

    while text.len() < total_chars {
        let remaining = total_chars - text.len();
        if column == body_chars && remaining > 2 {
            text.push_str("\n\n");
            column = 0;
            letter = if letter == b'z' { b'a' } else { letter + 1 };
        } else {
            text.push(char::from(letter));
            column += 1;
        }
    }
    text
}

/// Generates `count` distinct source identifiers.
#[must_use]
pub fn source_ids(count: usize) -> Vec<String> {
    (1..=count)
        .map(|i| format!("https://news.example.com/article-{i}"))
        .collect()
}

/// Renders a source-list file for `sources`, with a comment header and a
/// blank line that parsing must skip.
#[must_use]
pub fn source_list_file(sources: &[String]) -> String {
    let mut file = String::from("# sources\n\n");
    for source in sources {
        file.push_str(source);
        file.push('\n');
    }
    file
}
