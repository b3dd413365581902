// Downloader module - resolution, format selection and stream relay

pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod models;
pub mod orchestrator;
pub mod relay;
pub mod utils;

pub use errors::{DownloadError, ResolveError};
pub use format_selector::FormatSelector;
pub use models::{FormatClass, ResolvedVideo, StreamDescriptor, VideoFormat, VideoInfo};
pub use orchestrator::ResilientResolver;
pub use relay::{relay, RelayState};
