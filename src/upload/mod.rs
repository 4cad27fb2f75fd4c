// Upload module - multipart intake, validation, storage and thumbnailing
mod error;
mod handlers;
mod intake;
mod types;

#[cfg(test)]
mod tests;

pub use error::UploadError;
pub use handlers::upload_handler;
pub use intake::{BatchEntry, IncomingFile, SharedIntake, UploadBatch, UploadIntake};
pub use types::*;
