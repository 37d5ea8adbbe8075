pub use crate::domain::DomainId;
pub use crate::id::Id;
pub use crate::subject::{Subject, SubjectKind};
pub use crate::time::Timestamp;
