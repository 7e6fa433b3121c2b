//! Paragraph-aligned chunking of source text into model-sized blocks.
//!
//! Sizes are counted in characters, so a hard split never lands inside a
//! UTF-8 code point.

/// Inserted between paragraphs that share a chunk.
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// Splits `code` into ordered chunks of at most `max_size` characters.
///
/// Paragraphs (runs of non-blank lines) are packed greedily; a paragraph
/// that alone exceeds `max_size` is cut into fixed-size slices after the
/// pending buffer is flushed. Empty input yields no chunks; any other input
/// yields at least one.
pub fn chunk(code: &str, max_size: usize) -> Vec<String> {
    if code.is_empty() {
        return Vec::new();
    }
    let max_size = max_size.max(1);

    let mut paragraphs = split_paragraphs(code);
    if paragraphs.is_empty() {
        // Whitespace-only input is kept verbatim rather than dropped.
        paragraphs.push(code.to_string());
    }

    let separator_len = PARAGRAPH_SEPARATOR.chars().count();
    let mut chunks = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0usize;

    for paragraph in paragraphs {
        let paragraph_len = paragraph.chars().count();

        if paragraph_len > max_size {
            flush(&mut chunks, &mut buffer, &mut buffer_len);
            chunks.extend(hard_split(&paragraph, max_size));
            continue;
        }

        if !buffer.is_empty() && buffer_len + separator_len + paragraph_len > max_size {
            flush(&mut chunks, &mut buffer, &mut buffer_len);
        }

        if !buffer.is_empty() {
            buffer.push_str(PARAGRAPH_SEPARATOR);
            buffer_len += separator_len;
        }
        buffer.push_str(&paragraph);
        buffer_len += paragraph_len;
    }

    flush(&mut chunks, &mut buffer, &mut buffer_len);
    chunks
}

/// Paragraphs keep their inner line terminators verbatim (`\r\n` included);
/// only the terminator of a paragraph's last line is dropped.
fn split_paragraphs(code: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in code.split_inclusive('\n') {
        if line.trim().is_empty() {
            push_paragraph(&mut paragraphs, &mut current);
        } else {
            current.push_str(line);
        }
    }
    push_paragraph(&mut paragraphs, &mut current);

    paragraphs
}

fn push_paragraph(paragraphs: &mut Vec<String>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let mut paragraph = std::mem::take(current);
    if paragraph.ends_with('\n') {
        paragraph.pop();
        if paragraph.ends_with('\r') {
            paragraph.pop();
        }
    }
    paragraphs.push(paragraph);
}

fn hard_split(paragraph: &str, max_size: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    chars
        .chunks(max_size)
        .map(|slice| slice.iter().collect())
        .collect()
}

fn flush(chunks: &mut Vec<String>, buffer: &mut String, buffer_len: &mut usize) {
    if !buffer.is_empty() {
        chunks.push(std::mem::take(buffer));
        *buffer_len = 0;
    }
}
