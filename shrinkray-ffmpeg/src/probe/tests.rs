use super::*;

#[test]
fn color_transfer_recognizes_hdr_transfers() {
    assert_eq!(ColorTransfer::from_ffprobe("smpte2084"), ColorTransfer::Pq);
    assert_eq!(ColorTransfer::from_ffprobe("arib-std-b67"), ColorTransfer::Hlg);
    assert!(ColorTransfer::Pq.is_hdr());
    assert!(ColorTransfer::Hlg.is_hdr());
}

#[test]
fn color_transfer_treats_unknown_and_bt709_as_sdr() {
    assert_eq!(ColorTransfer::from_ffprobe(""), ColorTransfer::Sdr);
    assert_eq!(ColorTransfer::from_ffprobe("bt709"), ColorTransfer::Sdr);
    assert!(!ColorTransfer::Sdr.is_hdr());
}

#[test]
fn unrecognized_transfer_is_preserved_verbatim() {
    assert_eq!(
        ColorTransfer::from_ffprobe("log100"),
        ColorTransfer::Other("log100".to_string())
    );
}

#[test]
fn bitrate_kbps_truncates_to_whole_kbps() {
    let probe = ProbeResult {
        path: PathBuf::from("/tmp/x.mkv"),
        size: 0,
        duration: Duration::from_secs(1),
        video_codec: "h264".into(),
        width: 1920,
        height: 1080,
        bit_depth: 8,
        bit_rate: 5_500_000,
        color_transfer: ColorTransfer::Sdr,
        profile: "High".into(),
    };
    assert_eq!(probe.bitrate_kbps(), 5500);
}

#[test]
fn parses_a_representative_ffprobe_document() {
    let json = serde_json::json!({
        "streams": [
            {
                "codec_type": "audio",
                "codec_name": "aac"
            },
            {
                "codec_type": "video",
                "codec_name": "hevc",
                "width": 3840,
                "height": 2160,
                "bits_per_raw_sample": "10",
                "color_transfer": "smpte2084",
                "profile": "Main 10"
            }
        ],
        "format": {
            "duration": "1204.56",
            "bit_rate": "18000000"
        }
    });
    let parsed: FfprobeOutput = serde_json::from_value(json).unwrap();
    let video = parsed.streams.iter().find(|s| s.codec_type == "video").unwrap();
    assert_eq!(video.codec_name, "hevc");
    assert_eq!(video.width, 3840);
    assert_eq!(parsed.format.bit_rate.as_deref(), Some("18000000"));
}
