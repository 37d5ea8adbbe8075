use crate::id::Id;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Service,
}

/// A verified caller identity, as yielded by the identity verifier.
///
/// `subject_id` is the provider's stable subject claim and is the only
/// field downstream code may key on; email and display name are carried
/// for journal attribution and allow-list checks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub subject_id: Id,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub claims: serde_json::Map<String, serde_json::Value>,
}
