use serde::{Deserialize, Serialize};

/// A tenant workspace, identified by the leading URL path segment
/// (e.g. `/acme/` -> `DomainId("acme")`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainId(pub String);

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
