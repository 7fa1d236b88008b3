//! Pipe table extraction from markdown.

use crate::schemas::TableData;

fn is_row(line: &str) -> bool {
    line.trim().contains('|')
}

fn split_row(line: &str) -> Vec<String> {
    let line = line.trim();
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').map(|cell| cell.trim().to_string()).collect()
}

/// `| --- | :---: |` style delimiter row
fn is_delimiter(line: &str) -> bool {
    is_row(line)
        && split_row(line).iter().all(|cell| {
            let dashes = cell.trim_start_matches(':').trim_end_matches(':');
            !dashes.is_empty() && dashes.chars().all(|c| c == '-')
        })
}

/// A caption is a "Table ..." line directly above the table.
fn caption_before(lines: &[&str], header: usize) -> Option<String> {
    let previous = lines[..header]
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())?;
    previous
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("table"))
        .then(|| previous.trim_matches(['*', '_']).to_string())
}

/// Find every header + delimiter + rows table in a markdown document.
pub fn extract_markdown_tables(markdown: &str) -> Vec<TableData> {
    let lines: Vec<&str> = markdown.lines().collect();
    let mut tables = Vec::new();
    let mut i = 0;

    while i + 1 < lines.len() {
        if !(is_row(lines[i]) && is_delimiter(lines[i + 1])) {
            i += 1;
            continue;
        }

        let header = i;
        let mut end = i + 2;
        while end < lines.len() && is_row(lines[end]) && !lines[end].trim().is_empty() {
            end += 1;
        }

        tables.push(TableData {
            caption: caption_before(&lines, header),
            headers: split_row(lines[header]),
            rows: lines[header + 2..end].iter().map(|l| split_row(l)).collect(),
            markdown: lines[header..end]
                .iter()
                .map(|l| l.trim())
                .collect::<Vec<_>>()
                .join("\n"),
        });
        i = end;
    }

    tables
}
