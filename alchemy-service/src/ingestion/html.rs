//! Lightweight HTML to markdown conversion.
//!
//! This is a tag scanner, not a DOM parser: it understands enough structure
//! (headings, paragraphs, lists, tables, images, raw-text elements) to turn
//! ordinary pages into chunkable markdown.

/// Elements whose content is not markup
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "title", "textarea"];

/// Elements dropped from the markdown output together with their content
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "title", "noscript", "template"];

const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "section", "article", "header", "footer", "main", "nav", "aside", "blockquote",
    "pre", "ul", "ol", "dl", "figure", "figcaption", "form", "h4", "h5", "h6", "hr",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Tag<'a> {
    /// Lowercased element name
    pub name: String,
    pub closing: bool,
    attrs: &'a str,
}

impl<'a> Tag<'a> {
    fn parse(inner: &'a str) -> Option<Self> {
        let inner = inner.trim().trim_end_matches('/');
        let (closing, body) = match inner.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, inner),
        };
        if !body.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }

        let name_len = body
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(body.len());
        Some(Self {
            name: body[..name_len].to_ascii_lowercase(),
            closing,
            attrs: &body[name_len..],
        })
    }

    /// Value of an attribute, with entities decoded.
    pub fn attr(&self, wanted: &str) -> Option<String> {
        let mut rest = self.attrs;
        loop {
            rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
            if rest.is_empty() {
                return None;
            }

            let name_end = rest
                .find(|c: char| c == '=' || c == '/' || c.is_whitespace())
                .unwrap_or(rest.len());
            let name = &rest[..name_end];
            rest = rest[name_end..].trim_start();

            let mut value = "";
            if let Some(after_eq) = rest.strip_prefix('=') {
                let after_eq = after_eq.trim_start();
                (value, rest) = match after_eq.chars().next() {
                    Some(quote @ ('"' | '\'')) => {
                        let body = &after_eq[1..];
                        let end = body.find(quote).unwrap_or(body.len());
                        (&body[..end], body.get(end + 1..).unwrap_or(""))
                    }
                    _ => {
                        let end = after_eq.find(char::is_whitespace).unwrap_or(after_eq.len());
                        after_eq.split_at(end)
                    }
                };
            }

            if name.eq_ignore_ascii_case(wanted) {
                return Some(decode_entities(value));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Text(&'a str),
    Tag(Tag<'a>),
}

/// Splits HTML into text runs and tags. Comments and doctypes are dropped.
pub(crate) struct Tokenizer<'a> {
    rest: &'a str,
    raw_text_of: Option<&'static str>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(html: &'a str) -> Self {
        Self {
            rest: html,
            raw_text_of: None,
        }
    }

    fn take_text(&mut self, len: usize) -> Token<'a> {
        let (text, rest) = self.rest.split_at(len);
        self.rest = rest;
        Token::Text(text)
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        loop {
            if self.rest.is_empty() {
                return None;
            }

            if let Some(element) = self.raw_text_of.take() {
                let end = find_ignore_case(self.rest, &format!("</{element}"))
                    .unwrap_or(self.rest.len());
                if end > 0 {
                    return Some(self.take_text(end));
                }
            }

            match self.rest.find('<') {
                Some(0) => {}
                Some(start) => return Some(self.take_text(start)),
                None => return Some(self.take_text(self.rest.len())),
            }

            if let Some(after) = self.rest.strip_prefix("<!--") {
                self.rest = after.find("-->").map_or("", |end| &after[end + 3..]);
                continue;
            }

            let Some(close) = self.rest.find('>') else {
                return Some(self.take_text(self.rest.len()));
            };
            let inner = &self.rest[1..close];
            if inner.starts_with(['!', '?']) {
                self.rest = &self.rest[close + 1..];
                continue;
            }
            let Some(tag) = Tag::parse(inner) else {
                // A bare '<' in text
                return Some(self.take_text(1));
            };

            self.rest = &self.rest[close + 1..];
            if !tag.closing {
                self.raw_text_of = RAW_TEXT_ELEMENTS
                    .iter()
                    .find(|name| **name == tag.name)
                    .copied();
            }
            return Some(Token::Tag(tag));
        }
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

/// Decode named and numeric character references.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let entity = rest[1..]
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&rest[1..1 + end]).map(|c| (c, end + 2)));
        match entity {
            Some((c, len)) => {
                out.push(c);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Accumulates markdown while collapsing whitespace.
#[derive(Default)]
struct MarkdownWriter {
    out: String,
    /// Inside a skipped element such as `<script>`
    skipping: Option<String>,
    /// Rows written so far in the current table
    table_rows: Option<usize>,
    row_cells: usize,
}

impl MarkdownWriter {
    fn text(&mut self, raw: &str) {
        if self.skipping.is_some() {
            return;
        }
        for c in decode_entities(raw).chars() {
            if c.is_whitespace() {
                if !self.out.is_empty() && !self.out.ends_with(char::is_whitespace) {
                    self.out.push(' ');
                }
            } else {
                self.out.push(c);
            }
        }
    }

    fn trim_trailing_spaces(&mut self) {
        let kept = self.out.trim_end_matches([' ', '\t']).len();
        self.out.truncate(kept);
    }

    fn block(&mut self) {
        self.trim_trailing_spaces();
        if self.out.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn line_break(&mut self) {
        self.trim_trailing_spaces();
        if !self.out.is_empty() {
            self.out.push('\n');
        }
    }

    fn tag(&mut self, tag: &Tag<'_>) {
        if let Some(skipped) = &self.skipping {
            if tag.closing && *skipped == tag.name {
                self.skipping = None;
            }
            return;
        }

        let name = tag.name.as_str();
        match (name, tag.closing) {
            _ if SKIPPED_ELEMENTS.contains(&name) => {
                if !tag.closing {
                    self.skipping = Some(tag.name.clone());
                }
            }
            ("h1" | "h2" | "h3", false) => {
                self.block();
                let level = usize::from(name.as_bytes()[1] - b'0');
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
            }
            ("h1" | "h2" | "h3", true) => self.block(),
            ("br", _) => self.line_break(),
            ("li", false) => {
                self.line_break();
                self.out.push_str("- ");
            }
            ("img", false) => {
                let alt = tag.attr("alt").unwrap_or_default();
                if let Some(src) = tag.attr("src") {
                    self.out.push_str(&format!("![{}]({})", alt.trim(), src.trim()));
                }
            }
            ("table", false) => {
                self.block();
                self.table_rows = Some(0);
            }
            ("table", true) => {
                self.table_rows = None;
                self.block();
            }
            ("tr", false) => {
                self.line_break();
                self.out.push('|');
                self.row_cells = 0;
            }
            ("td" | "th", false) => {
                if !self.out.ends_with(' ') {
                    self.out.push(' ');
                }
            }
            ("td" | "th", true) => {
                self.trim_trailing_spaces();
                self.out.push_str(" |");
                self.row_cells += 1;
            }
            ("tr", true) => {
                self.trim_trailing_spaces();
                if self.table_rows == Some(0) && self.row_cells > 0 {
                    self.out.push_str("\n|");
                    self.out.push_str(&" --- |".repeat(self.row_cells));
                }
                if let Some(rows) = self.table_rows.as_mut() {
                    *rows += 1;
                }
            }
            _ if BLOCK_ELEMENTS.contains(&name) => self.block(),
            _ => {}
        }
    }

    /// Trim every line and collapse runs of blank lines.
    fn finish(self) -> String {
        let mut result = String::with_capacity(self.out.len());
        let mut blank_run = false;

        for line in self.out.lines().map(str::trim) {
            if line.is_empty() {
                blank_run = true;
                continue;
            }
            if !result.is_empty() {
                result.push_str(if blank_run { "\n\n" } else { "\n" });
            }
            result.push_str(line);
            blank_run = false;
        }

        result
    }
}

/// Convert an HTML page to markdown-flavoured text.
pub fn html_to_markdown(html: &str) -> String {
    let mut writer = MarkdownWriter::default();
    for token in Tokenizer::new(html) {
        match token {
            Token::Text(text) => writer.text(text),
            Token::Tag(tag) => writer.tag(&tag),
        }
    }
    writer.finish()
}

/// Contents of the `<title>` element, whitespace collapsed.
pub fn extract_title(html: &str) -> Option<String> {
    let mut tokens = Tokenizer::new(html);
    tokens.find(|token| matches!(token, Token::Tag(tag) if tag.name == "title" && !tag.closing))?;

    let Some(Token::Text(text)) = tokens.next() else {
        return None;
    };
    let title = decode_entities(text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!title.is_empty()).then_some(title)
}

/// `href` values of every anchor, in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    Tokenizer::new(html)
        .filter_map(|token| match token {
            Token::Tag(tag) if tag.name == "a" && !tag.closing => tag.attr("href"),
            _ => None,
        })
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
        .collect()
}
