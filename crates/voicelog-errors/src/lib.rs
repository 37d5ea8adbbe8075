pub mod codes;
pub mod model;
pub mod retry;
pub mod prelude;

pub use codes::ErrorCode;
pub use model::{ErrorBuilder, ErrorObj, PublicErrorView};
pub use retry::RetryClass;
