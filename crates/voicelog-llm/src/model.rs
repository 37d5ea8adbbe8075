use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatInput {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A single normalized text answer, whichever provider produced it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<ChatUsage>,
    pub model: String,
    pub id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageInput {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageAnswer {
    /// Either an `https://` URL or a `data:` URI with inline base64.
    pub source: String,
    pub revised_prompt: Option<String>,
    pub model: String,
}
