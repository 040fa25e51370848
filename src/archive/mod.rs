pub mod file;
pub mod http;
pub mod mock;
pub mod noop;
pub mod variant;

pub use file::FileArchive;
pub use http::HttpArchive;
pub use mock::MockArchive;
pub use noop::NoopArchive;
pub use variant::ArchiveVariant;
