mod clock;
mod error;
mod registry;
mod seed;
mod session;

pub use clock::*;
pub use error::*;
pub use registry::*;
pub use seed::*;
pub use session::*;
