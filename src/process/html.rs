//! Minimal HTML block and text extraction
//!
//! The bulletin pages are template-generated, so the transformers need only
//! two primitives: pull out the blocks of a known tag/class pair, and flatten
//! a block to its visible text. Neither is a general HTML parser; both lean
//! on the fixed structure the templates produce.

/// Extract every `<tag ...>` block whose opening tag contains `class`,
/// including nested same-name tags, as slices of the input.
///
/// Matching is ASCII case-insensitive. An empty `class` matches every block
/// of the tag. Blocks whose closing tag is missing are dropped.
pub fn find_tag_blocks<'a>(html: &'a str, tag: &str, class: &str) -> Vec<&'a str> {
    let lower = html.to_ascii_lowercase();
    let open = format!("<{}", tag.to_ascii_lowercase());
    let close = format!("</{}", tag.to_ascii_lowercase());
    let class_lower = class.to_ascii_lowercase();

    let mut blocks = Vec::new();
    let mut pos = 0;
    while let Some(start) = next_tag(&lower, pos, &open) {
        let Some(rel) = lower[start..].find('>') else {
            break;
        };
        let attrs_end = start + rel + 1;
        if !lower[start..attrs_end].contains(&class_lower) {
            pos = attrs_end;
            continue;
        }
        match block_end(&lower, attrs_end, &open, &close) {
            Some(end) => {
                blocks.push(&html[start..end]);
                pos = end;
            }
            None => break,
        }
    }
    blocks
}

/// Flatten HTML to its visible text: tags become spaces, entities are
/// decoded, whitespace runs collapse to single spaces.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' => in_tag = false,
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    let decoded = decode_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Next occurrence of `prefix` followed by a tag-name boundary, so `<tr`
/// never matches inside `<track` (nor `</tr` inside `</track`).
fn next_tag(lower: &str, from: usize, prefix: &str) -> Option<usize> {
    let mut pos = from;
    while let Some(found) = lower[pos..].find(prefix) {
        let at = pos + found;
        match lower.as_bytes().get(at + prefix.len()) {
            Some(b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'/') | None => return Some(at),
            _ => pos = at + prefix.len(),
        }
    }
    None
}

/// Byte offset just past the close of the block whose opening tag ends at
/// `cursor`, walking over nested same-name tags.
fn block_end(lower: &str, mut cursor: usize, open: &str, close: &str) -> Option<usize> {
    let mut depth = 1usize;
    while depth > 0 {
        let next_open = next_tag(lower, cursor, open);
        let next_close = next_tag(lower, cursor, close);
        match (next_open, next_close) {
            (Some(o), Some(c)) if o < c => {
                depth += 1;
                cursor = o + open.len();
            }
            (_, Some(c)) => {
                depth -= 1;
                cursor = c + close.len();
            }
            _ => return None,
        }
    }
    lower[cursor..].find('>').map(|i| cursor + i + 1)
}
