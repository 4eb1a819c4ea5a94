pub mod bit_buffer2;
pub mod buffer2;
pub mod cancel_token;
pub mod file_utils;
pub mod log_setup;
pub mod serde_format;

pub use bit_buffer2::BitBuffer2;
pub use buffer2::Buffer2;
pub use cancel_token::{CancelToken, Cancelled};
pub use serde_format::{FileExtensionError, SerdeFormat, SerdeFormatError};

pub fn is_false(value: &bool) -> bool {
    !*value
}
