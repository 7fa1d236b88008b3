//! Image references in markdown.

/// One `![alt](src)` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub alt: String,
    pub src: String,
}

/// Collect inline image references in document order.
pub fn extract_image_refs(markdown: &str) -> Vec<ImageRef> {
    let mut refs = Vec::new();
    let mut rest = markdown;

    while let Some(start) = rest.find("![") {
        rest = &rest[start + 2..];
        let Some(alt_end) = rest.find(']') else {
            break;
        };
        let alt = &rest[..alt_end];
        let after_alt = &rest[alt_end + 1..];

        let Some(target) = after_alt.strip_prefix('(') else {
            continue;
        };
        let Some(target_end) = target.find(')') else {
            break;
        };

        // Drop an optional "title" after the path
        let src = target[..target_end]
            .split_whitespace()
            .next()
            .unwrap_or_default();
        if !src.is_empty() {
            refs.push(ImageRef {
                alt: alt.trim().to_string(),
                src: src.to_string(),
            });
        }
        rest = &target[target_end + 1..];
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_image_refs() {
        let markdown = "Intro ![Logo](img/logo.png) text ![](chart.svg \"Sales\") [link](x)";
        assert_eq!(
            extract_image_refs(markdown),
            vec![
                ImageRef {
                    alt: "Logo".to_string(),
                    src: "img/logo.png".to_string(),
                },
                ImageRef {
                    alt: String::new(),
                    src: "chart.svg".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_refs_are_skipped() {
        assert!(extract_image_refs("![alt] (x.png)").is_empty());
        assert!(extract_image_refs("![unterminated").is_empty());
        assert!(extract_image_refs("![empty]()").is_empty());
    }
}
