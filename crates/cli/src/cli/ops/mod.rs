pub mod cat;
pub mod exists;
pub mod init;
pub mod put;
pub mod rm;
pub mod sweep;
pub mod version;
pub mod watch;

pub use cat::Cat;
pub use exists::Exists;
pub use init::Init;
pub use put::Put;
pub use rm::Rm;
pub use sweep::Sweep;
pub use version::Version;
pub use watch::Watch;
