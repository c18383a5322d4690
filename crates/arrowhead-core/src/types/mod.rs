mod onboarding;
mod registry;
mod system;

pub use onboarding::*;
pub use registry::*;
pub use system::*;
