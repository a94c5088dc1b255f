//! Tool-service response protocol.
//!
//! The tool-building service answers with a status tag and a payload. Which
//! tag strings mean what is configurable; deployments have used both
//! `ask`/`found`/`result`/`error` and `need_more_info`/`ready`/`error`.

use serde::{Deserialize, Serialize};

/// Decoded tool-service reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResponse {
    /// The service needs more information; payload is the question.
    Ask(String),
    /// Existing tools match the request; payload is the candidate list.
    Found(Vec<String>),
    /// The service finished; payload is the final result text.
    Result(String),
    /// The service failed or refused; payload is the error text.
    Error(String),
}

impl ToolResponse {
    /// Whether this response ends the delegation.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ToolResponse::Ask(_))
    }

    /// Short tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolResponse::Ask(_) => "ask",
            ToolResponse::Found(_) => "found",
            ToolResponse::Result(_) => "result",
            ToolResponse::Error(_) => "error",
        }
    }
}

/// Raw JSON body returned by the tool service.
///
/// Payload fields vary between service versions, so every one is optional
/// and [`ToolProtocol::decode`] picks the first that is present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawToolResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default, alias = "candidates")]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Status tags recognized for each response kind. Comparison is
/// case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolProtocol {
    pub ask: Vec<String>,
    pub found: Vec<String>,
    pub result: Vec<String>,
    pub error: Vec<String>,
}

impl Default for ToolProtocol {
    fn default() -> Self {
        let tags = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            ask: tags(&["ask", "need_more_info"]),
            found: tags(&["found"]),
            result: tags(&["result", "ready", "done"]),
            error: tags(&["error"]),
        }
    }
}

fn has_tag(tags: &[String], status: &str) -> bool {
    tags.iter().any(|t| t.eq_ignore_ascii_case(status))
}

fn first_text(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_ref())
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

impl ToolProtocol {
    /// Map a raw body to a [`ToolResponse`].
    ///
    /// An unrecognized status becomes [`ToolResponse::Error`] so the
    /// delegation never stays open on a reply nobody understands.
    ///
    /// # Example
    /// ```
    /// use ailex::delegation::{RawToolResponse, ToolProtocol, ToolResponse};
    ///
    /// let raw: RawToolResponse =
    ///     serde_json::from_str(r#"{"status":"ask","message":"which format?"}"#).unwrap();
    /// assert_eq!(
    ///     ToolProtocol::default().decode(raw),
    ///     ToolResponse::Ask("which format?".to_string())
    /// );
    /// ```
    pub fn decode(&self, raw: RawToolResponse) -> ToolResponse {
        let status = raw.status.trim();

        if has_tag(&self.ask, status) {
            let question = first_text(&[&raw.question, &raw.message]).unwrap_or_default();
            ToolResponse::Ask(question)
        } else if has_tag(&self.found, status) {
            let candidates = match raw.tools {
                Some(tools) => tools
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
                None => raw
                    .message
                    .as_deref()
                    .unwrap_or_default()
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect(),
            };
            ToolResponse::Found(candidates)
        } else if has_tag(&self.result, status) {
            ToolResponse::Result(first_text(&[&raw.result, &raw.message]).unwrap_or_default())
        } else if has_tag(&self.error, status) {
            ToolResponse::Error(first_text(&[&raw.error, &raw.message]).unwrap_or_default())
        } else {
            ToolResponse::Error(format!("unrecognized tool service status {:?}", status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(json: &str) -> ToolResponse {
        let raw: RawToolResponse = serde_json::from_str(json).unwrap();
        ToolProtocol::default().decode(raw)
    }

    #[test]
    fn test_decode_ask_prefers_question() {
        assert_eq!(
            decode(r#"{"status":"ask","question":"Which format?","message":"ignored"}"#),
            ToolResponse::Ask("Which format?".to_string())
        );
    }

    #[test]
    fn test_decode_alternate_tag_set() {
        assert_eq!(
            decode(r#"{"status":"need_more_info","message":"Which language?"}"#),
            ToolResponse::Ask("Which language?".to_string())
        );
        assert_eq!(
            decode(r#"{"status":"READY","result":"https://example.com/tool"}"#),
            ToolResponse::Result("https://example.com/tool".to_string())
        );
    }

    #[test]
    fn test_decode_found_list() {
        assert_eq!(
            decode(r#"{"status":"found","tools":["PDF merger"," ","Image resizer"]}"#),
            ToolResponse::Found(vec!["PDF merger".to_string(), "Image resizer".to_string()])
        );
        assert_eq!(
            decode(r#"{"status":"found","candidates":["A"]}"#),
            ToolResponse::Found(vec!["A".to_string()])
        );
    }

    #[test]
    fn test_decode_found_from_message_lines() {
        assert_eq!(
            decode(r#"{"status":"found","message":"one\n\ntwo"}"#),
            ToolResponse::Found(vec!["one".to_string(), "two".to_string()])
        );
    }

    #[test]
    fn test_decode_error_and_unknown() {
        assert_eq!(
            decode(r#"{"status":"error","error":"quota exceeded"}"#),
            ToolResponse::Error("quota exceeded".to_string())
        );
        let unknown = decode(r#"{"status":"pending"}"#);
        assert!(matches!(unknown, ToolResponse::Error(ref e) if e.contains("pending")));
    }

    #[test]
    fn test_custom_protocol() {
        let protocol = ToolProtocol {
            ask: vec!["clarify".into()],
            found: vec![],
            result: vec!["ok".into()],
            error: vec!["fail".into()],
        };
        let raw = RawToolResponse {
            status: "clarify".into(),
            message: Some("Для кого бот?".into()),
            ..Default::default()
        };
        assert_eq!(protocol.decode(raw), ToolResponse::Ask("Для кого бот?".into()));

        let raw = RawToolResponse {
            status: "ask".into(),
            ..Default::default()
        };
        assert!(matches!(protocol.decode(raw), ToolResponse::Error(_)));
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(!ToolResponse::Ask("q".into()).is_terminal());
        assert!(ToolResponse::Found(vec![]).is_terminal());
        assert!(ToolResponse::Result("r".into()).is_terminal());
        assert!(ToolResponse::Error("e".into()).is_terminal());
    }
}
