// Extractor module - upstream extraction capability
//
// - StreamExtractor: resolve a URL with one client identity, open a stream
// - InnertubeExtractor: player API client over reqwest
// - Profiles: client identities and the shared header profile
// - Diagnostics: maps failure text to a response class

mod diagnostics;
mod innertube;
mod profiles;
mod traits;

pub use diagnostics::{classify, is_auth_challenge, ErrorClass};
pub use innertube::InnertubeExtractor;
pub use profiles::{ClientIdentity, HeaderProfile};
pub use traits::{ChunkStream, QualityHint, RemoteStream, StreamExtractor, StreamTarget};
