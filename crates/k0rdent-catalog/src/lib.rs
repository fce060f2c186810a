pub mod catalog;
pub mod helm;
pub mod installer;

pub use catalog::*;
pub use helm::*;
pub use installer::*;
