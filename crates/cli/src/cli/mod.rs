pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Cat, Exists, Init, Put, Rm, Sweep, Version, Watch};
