//! Markdown heading segmentation.

/// A run of text under one heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    /// `None` for text before the first heading, or for a document without headings
    pub heading: Option<&'a str>,
    pub body: &'a str,
}

/// Label of a level 1-3 ATX heading line, if `line` is one.
///
/// The hashes must be followed by whitespace and a non-blank label.
pub fn heading_label(line: &str) -> Option<&str> {
    let hashes = line.bytes().take_while(|b| *b == b'#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }

    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let label = rest.trim();
    (!label.is_empty()).then_some(label)
}

/// Split text into sections at heading lines.
///
/// Text before the first heading becomes an unlabelled section when it is
/// not blank. Headings whose body is blank are dropped. Bodies are trimmed,
/// except that a document with no headings at all is returned untouched as a
/// single unlabelled section.
pub fn split_by_headings(text: &str) -> Vec<Section<'_>> {
    // (line start, end of heading line without its newline, label)
    let mut headings = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        if let Some(label) = heading_label(content) {
            headings.push((offset, offset + content.len(), label));
        }
        offset += line.len();
    }

    let Some(&(first_start, _, _)) = headings.first() else {
        return vec![Section {
            heading: None,
            body: text,
        }];
    };

    let mut sections = Vec::with_capacity(headings.len() + 1);
    let preamble = text[..first_start].trim();
    if !preamble.is_empty() {
        sections.push(Section {
            heading: None,
            body: preamble,
        });
    }

    for (i, &(_, heading_end, label)) in headings.iter().enumerate() {
        let body_end = headings.get(i + 1).map_or(text.len(), |next| next.0);
        let body = text[heading_end..body_end].trim();
        if !body.is_empty() {
            sections.push(Section {
                heading: Some(label),
                body,
            });
        }
    }

    sections
}
