use super::*;
use std::collections::HashSet;

#[test]
fn find_binds_to_the_registrys_preferred_backend() {
    let registry = EncoderRegistry::from_available(HashSet::from([EncoderBackend::Nvenc]));
    let preset = find("compress-hevc", &registry).unwrap();
    assert_eq!(preset.backend, EncoderBackend::Nvenc);
    assert_eq!(preset.default_quality, QualityDefault::Crf(28));
}

#[test]
fn unknown_preset_id_returns_none() {
    let registry = EncoderRegistry::software_only();
    assert!(find("does-not-exist", &registry).is_none());
}

#[test]
fn catalogue_has_no_duplicate_ids() {
    let registry = EncoderRegistry::software_only();
    let ids: HashSet<&str> = catalogue(&registry).iter().map(|p| p.id).collect();
    assert_eq!(ids.len(), CATALOGUE.len());
}

#[test]
fn rebind_to_software_keeps_identity_but_swaps_backend_and_quality() {
    let registry = EncoderRegistry::from_available(HashSet::from([EncoderBackend::Vaapi]));
    let preset = find("compress-hevc", &registry).unwrap();
    assert_eq!(preset.backend, EncoderBackend::Vaapi);

    let rebound = preset.rebind_to_software(&registry);
    assert_eq!(rebound.id, preset.id);
    assert_eq!(rebound.backend, EncoderBackend::Software);
    assert_eq!(rebound.default_quality, QualityDefault::Crf(26));
}
