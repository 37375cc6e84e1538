//! Repository traits for metadata operations.

pub mod files;
pub mod users;

pub use files::FileRepo;
pub use users::UserRepo;
