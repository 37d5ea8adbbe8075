pub use crate::codes::{self, ErrorCode};
pub use crate::model::{ErrorBuilder, ErrorObj, PublicErrorView};
pub use crate::retry::RetryClass;
