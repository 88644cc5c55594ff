pub mod config;
pub mod decode;
pub mod error;
pub mod logging;

pub use config::Config;
pub use decode::{
    create_decoder, AudioDecoder, Decoder, ExcerptPlan, ExcerptRequest, UNKNOWN_DURATION,
};
pub use error::{DecodeError, Result};
pub use logging::{LogLevel, LogTarget, Logging};
