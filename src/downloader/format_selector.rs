// FormatSelector - picks the stream to relay for a requested output class
//
// Handles:
// - Audio-only: highest audio bitrate among audio-only streams
// - Video: muxed mp4 (video+audio in one stream) at the highest or lowest
//   resolution, so clients never need a mux step
//
// `None` means no explicit candidate; the relay then falls back to a
// generic quality hint against the extractor.

use lazy_static::lazy_static;
use regex::Regex;

use super::extractors::{QualityHint, StreamTarget};
use super::models::{FormatClass, StreamDescriptor};

lazy_static! {
    static ref LEADING_INT_RE: Regex = Regex::new(r"^\s*(\d+)").unwrap();
}

/// Container of muxed progressive streams
const MUXED_CONTAINER: &str = "mp4";

/// Leading integer of a quality label ("1080p60" -> 1080); 0 when absent
pub fn parse_quality_label(label: Option<&str>) -> u32 {
    label
        .and_then(|l| LEADING_INT_RE.captures(l))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Format selector for relay targets
pub struct FormatSelector;

impl FormatSelector {
    /// Audio-only stream with the highest bitrate (missing bitrate counts as 0)
    pub fn select_audio(formats: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
        let mut candidates: Vec<&StreamDescriptor> = formats
            .iter()
            .filter(|f| f.has_audio && !f.has_video)
            .collect();

        // stable: equal bitrates keep upstream order
        candidates.sort_by(|a, b| {
            b.audio_bitrate
                .unwrap_or(0)
                .cmp(&a.audio_bitrate.unwrap_or(0))
        });
        candidates.first().copied()
    }

    /// Muxed mp4 stream at the highest (or lowest) parsed resolution
    pub fn select_video(formats: &[StreamDescriptor], want_highest: bool) -> Option<&StreamDescriptor> {
        let mut candidates: Vec<&StreamDescriptor> = formats
            .iter()
            .filter(|f| f.is_muxed() && f.container() == MUXED_CONTAINER)
            .collect();

        candidates.sort_by(|a, b| {
            let qa = parse_quality_label(a.quality_label.as_deref());
            let qb = parse_quality_label(b.quality_label.as_deref());
            if want_highest {
                qb.cmp(&qa)
            } else {
                qa.cmp(&qb)
            }
        });
        candidates.first().copied()
    }

    /// Relay target for a format class, falling back to a quality hint
    pub fn target_for(formats: &[StreamDescriptor], class: FormatClass) -> StreamTarget {
        let picked = match class {
            FormatClass::Audio => Self::select_audio(formats),
            FormatClass::Highest => Self::select_video(formats, true),
            FormatClass::Lowest => Self::select_video(formats, false),
        };

        match picked {
            Some(descriptor) => StreamTarget::Descriptor(descriptor.clone()),
            None => StreamTarget::Hint(QualityHint::from(class)),
        }
    }
}
