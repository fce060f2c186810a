pub mod channel;
pub mod clock;
pub mod error;
pub mod logging;
pub mod settings;
pub mod version;

pub use channel::*;
pub use clock::*;
pub use error::*;
pub use logging::*;
pub use settings::*;
pub use version::*;
