mod matcher;
mod signature;

pub use matcher::*;
pub use signature::*;
