pub use crate::errors::LlmError;
pub use crate::extract::{image_source, workflow_text, Extracted};
pub use crate::model::{ChatAnswer, ChatInput, ChatMessage, ChatUsage, ImageAnswer, ImageInput};
pub use crate::provider::gemini::{GeminiClient, GeminiConfig};
pub use crate::provider::openai::{OpenAiClient, OpenAiConfig};
pub use crate::workflow::{WorkflowAnswer, WorkflowClient, WorkflowConfig, WorkflowRunInput};
