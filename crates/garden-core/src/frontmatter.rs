//! YAML frontmatter between leading `---` fences.

use tracing::warn;

/// Frontmatter keys and values, as JSON for easy inspection.
pub type Frontmatter = serde_json::Map<String, serde_json::Value>;

/// Split `text` into its frontmatter block and body.
///
/// Returns `None` when the text does not open with a `---` fence line or the
/// block is never closed.
fn split(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\r\n")
        .or_else(|| text.strip_prefix("---\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

/// Parse the frontmatter of a note.
///
/// A note without frontmatter has an empty map. Frontmatter that is not a
/// YAML mapping is logged and treated as empty.
pub fn parse_frontmatter(text: &str) -> Frontmatter {
    let Some((block, _)) = split(text) else {
        return Frontmatter::new();
    };
    if block.trim().is_empty() {
        return Frontmatter::new();
    }

    match serde_yaml::from_str::<serde_json::Value>(block) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => {
            warn!("frontmatter is not a mapping; ignoring it");
            Frontmatter::new()
        }
        Err(e) => {
            warn!(error = %e, "invalid frontmatter; ignoring it");
            Frontmatter::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_mapping() {
        let text = "---\ndg-publish: true\ntags: [a, b]\n---\n# Title\n";
        let fm = parse_frontmatter(text);
        assert_eq!(fm["dg-publish"], json!(true));
        assert_eq!(fm["tags"], json!(["a", "b"]));
        assert_eq!(split(text).map(|(_, body)| body), Some("# Title\n"));
    }

    #[test]
    fn no_fence_means_empty() {
        assert!(parse_frontmatter("# Title\n---\nx: 1\n---\n").is_empty());
        assert!(split("plain").is_none());
    }

    #[test]
    fn unclosed_or_invalid_is_empty() {
        assert!(parse_frontmatter("---\nx: 1\n").is_empty());
        assert!(parse_frontmatter("---\n: : :\n  - [\n---\n").is_empty());
        assert!(parse_frontmatter("---\n- just\n- a list\n---\n").is_empty());
    }

    #[test]
    fn crlf_fences() {
        let fm = parse_frontmatter("---\r\ntitle: Hi\r\n---\r\nbody");
        assert_eq!(fm["title"], json!("Hi"));
    }
}
