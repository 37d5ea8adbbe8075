use serde_json::Value;

/// Outcome of a normalization attempt. Callers decide how a miss maps to
/// their error type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extracted {
    Found(String),
    NotFound,
}

impl Extracted {
    pub fn found(self) -> Option<String> {
        match self {
            Extracted::Found(text) => Some(text),
            Extracted::NotFound => None,
        }
    }
}

/// Workflow responses arrive in one of several shapes depending on the
/// upstream app type. Lookup order is fixed:
/// `data.outputs.output`, `data.outputs.response`, `output`, `answer`.
pub fn workflow_text(body: &Value) -> Extracted {
    const PATHS: [&[&str]; 4] = [
        &["data", "outputs", "output"],
        &["data", "outputs", "response"],
        &["output"],
        &["answer"],
    ];

    for path in PATHS {
        if let Some(value) = lookup(body, path) {
            match value {
                Value::Null => continue,
                Value::String(s) if s.is_empty() => continue,
                Value::String(s) => return Extracted::Found(s.clone()),
                other => return Extracted::Found(other.to_string()),
            }
        }
    }
    Extracted::NotFound
}

/// Scans image-generation response parts (`data[*]`) in order and returns
/// the first usable source: inline base64 (wrapped as a data URI), a `url`
/// field, or a URL-shaped substring inside any text field.
pub fn image_source(body: &Value) -> Extracted {
    let Some(parts) = body.get("data").and_then(Value::as_array) else {
        return Extracted::NotFound;
    };

    for part in parts {
        if let Some(b64) = part.get("b64_json").and_then(Value::as_str) {
            if !b64.is_empty() {
                let mime = part
                    .get("mime_type")
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                return Extracted::Found(format!("data:{mime};base64,{b64}"));
            }
        }
        if let Some(url) = part.get("url").and_then(Value::as_str) {
            if !url.is_empty() {
                return Extracted::Found(url.to_string());
            }
        }
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            if let Some(url) = first_url(text) {
                return Extracted::Found(url);
            }
        }
    }
    Extracted::NotFound
}

fn lookup<'a>(body: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = body;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

fn first_url(text: &str) -> Option<String> {
    let start = text.find("https://").or_else(|| text.find("http://"))?;
    let tail = &text[start..];
    let end = tail
        .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
        .unwrap_or(tail.len());
    Some(tail[..end].to_string())
}
