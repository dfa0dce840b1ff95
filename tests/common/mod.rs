pub mod builders;
pub mod plugins;
pub mod strategies;

pub use builders::*;
pub use plugins::*;
