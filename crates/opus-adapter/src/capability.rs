//! Capability query
//!
//! Decides which codec descriptors this adapter can serve and which one it
//! advertises. The accepted set is wider than the advertised one: any of the
//! five Opus sample rates is accepted, but only 48 kHz mono is enumerated.

use crate::error::{AdapterError, Result, UnsupportedReason};
use crate::types::{CodecDescriptor, MediaType, OPUS_ENCODING_NAME, SUPPORTED_CLOCK_RATES};
use tracing::{debug, trace};

/// Clock rate of the enumerated descriptor
pub const CANONICAL_CLOCK_RATE: u32 = 48000;

/// Check whether `descriptor` can be served
pub fn test_alloc(descriptor: &CodecDescriptor) -> Result<()> {
    let reason = if descriptor.media_type != MediaType::Audio {
        Some(UnsupportedReason::NotAudio)
    } else if !descriptor.has_encoding_name(OPUS_ENCODING_NAME) {
        Some(UnsupportedReason::EncodingName(descriptor.encoding_name.clone()))
    } else if !SUPPORTED_CLOCK_RATES.contains(&descriptor.clock_rate) {
        Some(UnsupportedReason::ClockRate(descriptor.clock_rate))
    } else {
        None
    };

    match reason {
        None => {
            trace!("{} accepted", descriptor);
            Ok(())
        }
        Some(reason) => Err(AdapterError::UnsupportedDescriptor {
            descriptor: descriptor.to_string(),
            reason,
        }),
    }
}

/// Boolean form of [`test_alloc`]
pub fn supports(descriptor: &CodecDescriptor) -> bool {
    test_alloc(descriptor).is_ok()
}

/// The single descriptor advertised to the host
pub fn canonical_descriptor(payload_type: u8) -> CodecDescriptor {
    CodecDescriptor::audio(OPUS_ENCODING_NAME, CANONICAL_CLOCK_RATE, 1, payload_type)
}

/// Enumerate supported descriptors, at most `max_count`
pub fn enum_codecs(max_count: usize, payload_type: u8) -> Result<Vec<CodecDescriptor>> {
    if max_count == 0 {
        return Err(AdapterError::invalid_argument(
            "codec enumeration needs room for at least one descriptor",
        ));
    }

    let descriptor = canonical_descriptor(payload_type);
    debug!("enumerated {} (pt {})", descriptor, payload_type);
    Ok(vec![descriptor])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_accepts_every_supported_rate() {
        for rate in SUPPORTED_CLOCK_RATES {
            assert!(test_alloc(&CodecDescriptor::audio("opus", rate, 1, 111)).is_ok());
            assert!(supports(&CodecDescriptor::audio("Opus", rate, 2, 96)));
        }
    }

    #[test]
    fn test_rejection_reasons() {
        let video = CodecDescriptor::audio("opus", 48000, 1, 111).with_media_type(MediaType::Video);
        assert!(matches!(
            test_alloc(&video),
            Err(AdapterError::UnsupportedDescriptor {
                reason: UnsupportedReason::NotAudio,
                ..
            })
        ));

        let pcmu = CodecDescriptor::audio("PCMU", 8000, 1, 0);
        assert_eq!(
            test_alloc(&pcmu),
            Err(AdapterError::UnsupportedDescriptor {
                descriptor: "PCMU/8000/1".to_string(),
                reason: UnsupportedReason::EncodingName("PCMU".to_string()),
            })
        );

        let cd = CodecDescriptor::audio("opus", 44100, 2, 111);
        assert!(matches!(
            test_alloc(&cd),
            Err(AdapterError::UnsupportedDescriptor {
                reason: UnsupportedReason::ClockRate(44100),
                ..
            })
        ));
    }

    #[test]
    fn test_enum_returns_canonical_descriptor() {
        let codecs = enum_codecs(8, 111).unwrap();
        assert_eq!(codecs.len(), 1);
        assert_eq!(codecs[0], CodecDescriptor::audio("opus", 48000, 1, 111));

        let codecs = enum_codecs(1, 120).unwrap();
        assert_eq!(codecs[0].payload_type, 120);
    }

    #[test]
    fn test_enum_needs_room() {
        assert!(matches!(
            enum_codecs(0, 111),
            Err(AdapterError::InvalidArgument { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_acceptance_depends_only_on_rate(rate in 0u32..200_000, upper in any::<bool>()) {
            let name = if upper { "OPUS" } else { "opus" };
            let descriptor = CodecDescriptor::audio(name, rate, 1, 111);
            prop_assert_eq!(supports(&descriptor), SUPPORTED_CLOCK_RATES.contains(&rate));
        }

        #[test]
        fn prop_other_names_are_rejected(name in "[a-zA-Z0-9]{1,12}") {
            prop_assume!(!name.eq_ignore_ascii_case("opus"));
            prop_assert!(!supports(&CodecDescriptor::audio(name, 48000, 1, 111)));
        }
    }
}
