use serde::{Deserialize, Serialize};

/// One request/response exchange observed by a capturer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpInteraction {
    pub uuid: String,
    pub request: CapturedRequest,
    pub response: CapturedResponse,
    #[serde(default)]
    pub tags: Vec<InteractionTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub host: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
    #[serde(default)]
    pub body: CapturedBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: Vec<HeaderEntry>,
    #[serde(default)]
    pub body: CapturedBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// Body of a request or response. Which representations are filled depends on
/// the capture flags in effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapturedBody {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub json: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionTag {
    pub name: String,
    pub value: String,
}

impl HttpInteraction {
    /// `"<METHOD> <path>"`, the form ignore rules are matched against.
    pub fn request_line(&self) -> String {
        format!("{} {}", self.request.method, self.request.path)
    }
}
