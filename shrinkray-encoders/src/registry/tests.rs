use super::*;

const SAMPLE_LISTING: &str = "\
 Encoders:
 V..... libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V..... libx265              libx265 H.265 / HEVC (codec hevc)
 V..... libsvtav1            SVT-AV1(codec av1)
 V..... hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)
 V..... av1_nvenc            NVIDIA NVENC av1 encoder (codec av1)
";

#[test]
fn detects_nvenc_and_software_but_not_absent_backends() {
    let found = detect_from_encoders_listing(SAMPLE_LISTING);
    assert!(found.contains(&EncoderBackend::Software));
    assert!(found.contains(&EncoderBackend::Nvenc));
    assert!(!found.contains(&EncoderBackend::Qsv));
    assert!(!found.contains(&EncoderBackend::Vaapi));
    assert!(!found.contains(&EncoderBackend::VideoToolbox));
}

#[test]
fn preferred_backend_falls_back_to_software_when_nothing_detected() {
    let registry = EncoderRegistry::software_only();
    assert_eq!(registry.preferred_backend(TargetCodec::Hevc), EncoderBackend::Software);
}

#[test]
fn preferred_backend_picks_the_highest_priority_available_backend() {
    let registry = EncoderRegistry::from_available(HashSet::from([
        EncoderBackend::Qsv,
        EncoderBackend::Nvenc,
    ]));
    // Nvenc outranks Qsv in PRIORITY.
    assert_eq!(registry.preferred_backend(TargetCodec::Hevc), EncoderBackend::Nvenc);
}

#[test]
fn quality_defaults_match_the_documented_table() {
    assert_eq!(
        default_quality(TargetCodec::Hevc, EncoderBackend::Software),
        QualityDefault::Crf(26)
    );
    assert_eq!(
        default_quality(TargetCodec::Av1, EncoderBackend::VideoToolbox),
        QualityDefault::Modifier(0.25)
    );
}
