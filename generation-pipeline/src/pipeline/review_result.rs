use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReviewIssue {
    pub category: String,
    pub detail: String,
}

#[derive(Debug, Deserialize)]
struct ReviewEnvelope {
    issues: Vec<ReviewIssue>,
}

/// Parses the REVIEW stage output. Accepts `{"issues": [...]}` or a bare
/// array, optionally inside a code fence or surrounded by prose.
pub fn parse_review(raw: &str) -> Result<Vec<ReviewIssue>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("review response was empty".to_string());
    }

    if let Some(issues) = parse_candidate(trimmed) {
        return Ok(issues);
    }

    if let Some(issues) = extract_fenced(trimmed).and_then(parse_candidate) {
        return Ok(issues);
    }

    if let Some(issues) = extract_delimited(trimmed, '{', '}').and_then(parse_candidate) {
        return Ok(issues);
    }

    extract_delimited(trimmed, '[', ']')
        .and_then(parse_candidate)
        .ok_or_else(|| {
            let preview: String = trimmed.chars().take(80).collect();
            format!("review response is not a JSON issue list: {preview}")
        })
}

fn parse_candidate(candidate: &str) -> Option<Vec<ReviewIssue>> {
    serde_json::from_str::<ReviewEnvelope>(candidate)
        .map(|envelope| envelope.issues)
        .or_else(|_| serde_json::from_str::<Vec<ReviewIssue>>(candidate))
        .ok()
}

fn extract_fenced(text: &str) -> Option<&str> {
    const FENCE: &str = "```";

    let start = text.find(FENCE)?;
    let after_fence = text.get(start + FENCE.len()..)?;
    let after_fence = after_fence.strip_prefix("json").unwrap_or(after_fence);
    let end = after_fence.find(FENCE)?;

    after_fence.get(..end).map(str::trim)
}

fn extract_delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start >= end {
        return None;
    }
    text.get(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(category: &str, detail: &str) -> ReviewIssue {
        ReviewIssue {
            category: category.into(),
            detail: detail.into(),
        }
    }

    #[test]
    fn parses_plain_envelope() {
        let issues = parse_review(
            r#"{"issues":[{"category":"tone","detail":"Previše formalno"}]}"#,
        )
        .expect("parse");
        assert_eq!(issues, vec![issue("tone", "Previše formalno")]);
    }

    #[test]
    fn parses_empty_issue_list() {
        assert_eq!(parse_review(r#"{"issues": []}"#).expect("parse"), Vec::new());
        assert_eq!(parse_review("[]").expect("parse"), Vec::new());
    }

    #[test]
    fn repairs_fenced_json() {
        let raw = "Here is the review:\n```json\n{\"issues\":[{\"category\":\"clarity\",\"detail\":\"Datum nedostaje\"}]}\n```";
        let issues = parse_review(raw).expect("parse");
        assert_eq!(issues, vec![issue("clarity", "Datum nedostaje")]);
    }

    #[test]
    fn repairs_prose_wrapped_array() {
        let raw = r#"Found these: [{"category":"grammar","detail":"Zarez"}] hope it helps"#;
        let issues = parse_review(raw).expect("parse");
        assert_eq!(issues, vec![issue("grammar", "Zarez")]);
    }

    #[test]
    fn rejects_unstructured_text() {
        let err = parse_review("The text looks fine to me.").expect_err("not json");
        assert!(err.contains("not a JSON issue list"));
        assert!(parse_review("   ").is_err());
        assert!(parse_review(r#"{"problems": "none"}"#).is_err());
    }
}
