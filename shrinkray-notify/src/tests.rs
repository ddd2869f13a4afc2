use super::*;

#[test]
fn null_sink_always_succeeds() {
    let sink = NullSink;
    assert!(sink.notify_all_done("all done").is_ok());
}

#[test]
fn pushover_sink_without_credentials_is_not_configured() {
    let sink = PushoverSink::new(NotificationCredentials::default());
    let err = sink.notify_all_done("all done").unwrap_err();
    assert!(matches!(err, NotifyError::NotConfigured));
}

#[test]
fn pushover_sink_with_only_a_user_key_is_not_configured() {
    let sink = PushoverSink::new(NotificationCredentials {
        user_key: Some("u".into()),
        app_token: None,
    });
    let err = sink.notify_all_done("all done").unwrap_err();
    assert!(matches!(err, NotifyError::NotConfigured));
}
