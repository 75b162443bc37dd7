use super::testing::{event, login, target, Call, MockFactory, RELAY};
use super::*;
use crate::config::{AuthMode, SessionConfig};
use crate::surface::Viewport;

fn controller() -> (SessionController<MockFactory>, EventReceiver, super::testing::Journal) {
    controller_with(AuthMode::Query)
}

fn controller_with(
    mode: AuthMode,
) -> (SessionController<MockFactory>, EventReceiver, super::testing::Journal) {
    let factory = MockFactory::default();
    let journal = factory.journal.clone();
    let (controller, events) = SessionController::new(factory, target(mode), FatalMarkers::default());
    (controller, events, journal)
}

/// Connect and deliver the open notification.
fn active() -> (SessionController<MockFactory>, EventReceiver, super::testing::Journal) {
    let (mut controller, events, journal) = controller();
    controller.connect(login()).unwrap();
    let id = controller.session_id();
    assert_eq!(controller.handle(event(id, EventKind::TransportOpen)), None);
    journal.clear();
    (controller, events, journal)
}

// =========================================================================
// Validation
// =========================================================================

#[test]
fn test_blank_fields_never_reach_transport() {
    let cases = [
        (SessionConfig::new("", "root", "pw", ""), ConfigError::MissingHost),
        (SessionConfig::new("  \t", "root", "pw", ""), ConfigError::MissingHost),
        (SessionConfig::new("h", "", "pw", ""), ConfigError::MissingUsername),
        (SessionConfig::new("h", " ", "pw", ""), ConfigError::MissingUsername),
        (SessionConfig::new("h", "root", "", ""), ConfigError::MissingSecret),
        (SessionConfig::new("h", "root", "\n ", ""), ConfigError::MissingSecret),
    ];

    for (config, expected) in cases {
        let (mut controller, _events, journal) = controller();
        let err = controller.connect(config).unwrap_err();
        assert!(matches!(err, SessionError::Config(e) if e == expected));
        assert_eq!(controller.state(), ConnectionState::Idle);
        assert!(!controller.is_live());
        assert!(journal.calls().is_empty(), "{:?}", journal.calls());
    }
}

#[test]
fn test_invalid_config_leaves_live_session_alone() {
    let (mut controller, _events, journal) = active();
    assert!(controller.connect(SessionConfig::new("h", "", "pw", "")).is_err());
    assert_eq!(controller.state(), ConnectionState::Active);
    assert!(journal.calls().is_empty());
}

#[test]
fn test_bad_relay_url_is_reported_without_side_effects() {
    let factory = MockFactory::default();
    let journal = factory.journal.clone();
    let mut relay = target(AuthMode::Query);
    relay.url = "http//nope".to_string();
    let (mut controller, _events) = SessionController::new(factory, relay, FatalMarkers::default());

    assert!(matches!(controller.connect(login()), Err(SessionError::Endpoint(_))));
    assert_eq!(controller.state(), ConnectionState::Idle);
    assert!(journal.calls().is_empty());
}

#[test]
fn test_fields_are_trimmed_before_transport() {
    let (mut controller, _events, journal) = controller();
    controller
        .connect(SessionConfig::new(" 10.0.0.5 ", " root", "pw ", ""))
        .unwrap();

    let url = journal
        .calls()
        .into_iter()
        .find_map(|c| match c {
            Call::Open { url, .. } => Some(url),
            _ => None,
        })
        .unwrap();
    assert_eq!(
        url,
        format!("{RELAY}?host=10.0.0.5&username=root&password=pw&token=")
    );
}

#[test]
fn test_frame_mode_keeps_password_out_of_url() {
    let (mut controller, _events, journal) = controller_with(AuthMode::Frame);
    controller.connect(login()).unwrap();
    assert!(journal.calls().contains(&Call::Open {
        session: 1,
        url: RELAY.to_string()
    }));
}

#[test]
fn test_surface_attach_failure_reports_and_skips_transport() {
    let factory = MockFactory {
        fail_attach: true,
        ..MockFactory::default()
    };
    let journal = factory.journal.clone();
    let (mut controller, _events) =
        SessionController::new(factory, target(AuthMode::Query), FatalMarkers::default());

    let err = controller.connect(login()).unwrap_err();
    assert!(err.to_string().contains("no tty"));
    assert_eq!(controller.state(), ConnectionState::Errored);
    assert_eq!(journal.calls(), vec![Call::Dispose]);
    assert!(!controller.is_live());
}

// =========================================================================
// Scenarios
// =========================================================================

#[test]
fn test_open_activates_then_clears_and_focuses() {
    let (mut controller, _events, journal) = controller();
    controller.connect(login()).unwrap();
    assert_eq!(controller.state(), ConnectionState::Connecting);
    assert_eq!(
        journal.calls(),
        vec![
            Call::Attach(1),
            Call::Open {
                session: 1,
                url: format!("{RELAY}?host=10.0.0.5&username=root&password=pw&token=")
            },
        ]
    );

    journal.clear();
    assert_eq!(controller.handle(event(1, EventKind::TransportOpen)), None);
    assert_eq!(controller.state(), ConnectionState::Active);
    assert_eq!(journal.calls(), vec![Call::Clear, Call::Focus]);
}

#[test]
fn test_input_is_sent_verbatim() {
    let (mut controller, _events, journal) = active();
    controller.handle(event(1, EventKind::SurfaceInput(b"ls\n".to_vec())));
    controller.handle(event(1, EventKind::SurfaceInput(vec![0x1b, b'[', b'A'])));

    assert_eq!(
        journal.sent(),
        vec![
            OutboundFrame::Data(b"ls\n".to_vec()),
            OutboundFrame::Data(vec![0x1b, b'[', b'A']),
        ]
    );
}

#[test]
fn test_resize_sends_control_frame() {
    let (mut controller, _events, journal) = active();
    controller.handle(event(1, EventKind::SurfaceResize(Viewport::new(120, 30))));

    let sent = journal.sent();
    assert_eq!(
        sent,
        vec![OutboundFrame::Control(ControlFrame::Resize { cols: 120, rows: 30 })]
    );
    assert_eq!(
        sent[0].to_wire(),
        crate::protocol::WireMessage::Text(r#"{"type":"resize","cols":120,"rows":30}"#.to_string())
    );
}

#[test]
fn test_abnormal_close_differs_from_orderly_close() {
    let (mut abnormal, _e1, j1) = active();
    let notice = abnormal
        .handle(event(1, EventKind::TransportClose { code: 1006, reason: String::new() }))
        .unwrap();
    assert!(matches!(notice, Notice::AbnormalClose { .. }));
    assert_eq!(abnormal.state(), ConnectionState::Errored);
    assert_eq!(j1.calls(), vec![Call::Close, Call::Dispose]);

    let (mut orderly, _e2, _j2) = active();
    let other = orderly
        .handle(event(1, EventKind::TransportClose { code: 1000, reason: String::new() }))
        .unwrap();
    assert!(matches!(other, Notice::Closed { code: 1000, .. }));
    assert_eq!(orderly.state(), ConnectionState::Closed);
    assert_ne!(notice.to_string(), other.to_string());
}

#[test]
fn test_reconnect_tears_down_first_session_before_opening() {
    let (mut controller, _events, journal) = active();
    controller.connect(login()).unwrap();

    let calls = journal.calls();
    assert_eq!(journal.count(|c| *c == Call::Close), 1);
    assert_eq!(journal.count(|c| *c == Call::Dispose), 1);
    let close = calls.iter().position(|c| *c == Call::Close).unwrap();
    let dispose = calls.iter().position(|c| *c == Call::Dispose).unwrap();
    let open = calls
        .iter()
        .position(|c| matches!(c, Call::Open { session: 2, .. }))
        .unwrap();
    assert!(close < open && dispose < open, "{calls:?}");
    assert_eq!(controller.session_id(), 2);
    assert_eq!(controller.state(), ConnectionState::Connecting);
}

// =========================================================================
// Properties
// =========================================================================

#[test]
fn test_disconnect_is_idempotent() {
    let (mut never, _e, journal) = controller();
    never.disconnect();
    never.disconnect();
    assert_eq!(never.state(), ConnectionState::Closed);
    assert!(journal.calls().is_empty());

    let (mut live, _e, journal) = active();
    live.disconnect();
    live.disconnect();
    assert_eq!(live.state(), ConnectionState::Closed);
    assert_eq!(journal.calls(), vec![Call::Close, Call::Dispose]);
}

#[test]
fn test_surface_input_ending_tears_down_with_notice() {
    let (mut controller, _events, journal) = active();
    let notice = controller
        .handle(event(1, EventKind::SurfaceClosed("stdin EOF".into())))
        .unwrap();

    assert_eq!(
        notice,
        Notice::InputClosed {
            reason: "stdin EOF".to_string()
        }
    );
    assert!(notice.is_error());
    assert_eq!(controller.state(), ConnectionState::Errored);
    assert!(!controller.is_live());
    assert_eq!(journal.calls(), vec![Call::Close, Call::Dispose]);
}

#[test]
fn test_no_frames_outside_active() {
    let (mut controller, _events, journal) = controller();
    controller.connect(login()).unwrap();
    journal.clear();

    controller.handle(event(1, EventKind::SurfaceResize(Viewport::new(100, 40))));
    controller.handle(event(1, EventKind::SurfaceInput(b"early".to_vec())));
    assert!(journal.sent().is_empty());

    controller.handle(event(1, EventKind::TransportOpen));
    controller.disconnect();
    controller.handle(event(1, EventKind::SurfaceResize(Viewport::new(90, 20))));
    assert!(journal.sent().is_empty());
}

#[test]
fn test_last_resize_is_sent() {
    let (mut controller, _events, journal) = active();
    for (cols, rows) in [(80, 24), (100, 30), (132, 43)] {
        controller.handle(event(1, EventKind::SurfaceResize(Viewport::new(cols, rows))));
    }
    assert_eq!(
        journal.sent().last(),
        Some(&OutboundFrame::Control(ControlFrame::Resize { cols: 132, rows: 43 }))
    );
}

#[test]
fn test_output_is_written_unmodified_in_order() {
    let (mut controller, _events, journal) = active();
    let chunks: [&[u8]; 4] = [b"total 0\r\n", &[0xff, 0xfe, 0x00], "\u{4f60}\u{597d}".as_bytes(), b"\x1b[0m$ "];
    for chunk in chunks {
        assert_eq!(controller.handle(event(1, EventKind::TransportMessage(chunk.to_vec()))), None);
    }

    let expected: Vec<u8> = chunks.concat();
    assert_eq!(journal.written(), expected);
    assert_eq!(journal.count(|c| matches!(c, Call::Write(_))), 4);
    assert_eq!(controller.state(), ConnectionState::Active);
}

#[test]
fn test_fatal_marker_highlights_then_closes_once() {
    let (mut controller, _events, journal) = active();
    let text = "SSH认证失败: permission denied";

    let notice = controller
        .handle(event(1, EventKind::TransportMessage(text.as_bytes().to_vec())))
        .unwrap();

    assert!(matches!(&notice, Notice::RelayFailure(f) if f.marker == "SSH认证失败"));
    assert_eq!(controller.state(), ConnectionState::Errored);
    assert_eq!(
        journal.calls(),
        vec![
            Call::Write(format!("\x1b[31m{text}\x1b[0m\r\n").into_bytes()),
            Call::Close,
            Call::Dispose,
        ]
    );

    // The relay's own close after the failure is stale and ignored.
    let late = controller.handle(event(1, EventKind::TransportClose { code: 1000, reason: String::new() }));
    assert_eq!(late, None);
    assert_eq!(journal.count(|c| *c == Call::Close), 1);
}

#[test]
fn test_transport_error_before_open_is_reported() {
    let (mut controller, _events, journal) = controller();
    controller.connect(login()).unwrap();
    journal.clear();

    let notice = controller
        .handle(event(1, EventKind::TransportError("connection refused".into())))
        .unwrap();
    assert_eq!(notice, Notice::ConnectionError { cause: "connection refused".into() });
    assert_eq!(controller.state(), ConnectionState::Errored);
    assert_eq!(journal.calls(), vec![Call::Close, Call::Dispose]);
}

#[test]
fn test_events_from_old_sessions_are_dropped() {
    let (mut controller, _events, journal) = active();
    controller.connect(login()).unwrap();
    journal.clear();

    assert_eq!(controller.handle(event(1, EventKind::TransportMessage(b"old".to_vec()))), None);
    assert_eq!(
        controller.handle(event(1, EventKind::TransportClose { code: 1006, reason: String::new() })),
        None
    );
    controller.handle(event(1, EventKind::TransportOpen));

    assert!(journal.calls().is_empty());
    assert_eq!(controller.state(), ConnectionState::Connecting);
}

#[test]
fn test_output_before_open_is_not_rendered() {
    let (mut controller, _events, journal) = controller();
    controller.connect(login()).unwrap();
    journal.clear();

    controller.handle(event(1, EventKind::TransportMessage(b"banner".to_vec())));
    assert!(journal.written().is_empty());
}

#[test]
fn test_extra_markers_are_fatal() {
    let factory = MockFactory::default();
    let journal = factory.journal.clone();
    let (mut controller, _events) = SessionController::new(
        factory,
        target(AuthMode::Query),
        FatalMarkers::with_extra(["relay overloaded"]),
    );
    controller.connect(login()).unwrap();
    controller.handle(event(1, EventKind::TransportOpen));

    let notice = controller.handle(event(1, EventKind::TransportMessage(b"error: relay overloaded".to_vec())));
    assert!(matches!(notice, Some(Notice::RelayFailure(_))));
    assert_eq!(journal.count(|c| *c == Call::Close), 1);
}

#[test]
fn test_each_ending_closes_and_disposes_exactly_once() {
    let endings = [
        EventKind::TransportError("reset".into()),
        EventKind::TransportClose { code: 1000, reason: String::new() },
        EventKind::TransportClose { code: 1006, reason: String::new() },
        EventKind::TransportMessage("启动shell失败".as_bytes().to_vec()),
        EventKind::SurfaceClosed("stdin closed".into()),
    ];

    for ending in endings {
        let (mut controller, _events, journal) = active();
        assert!(controller.handle(event(1, ending.clone())).is_some(), "{ending:?}");
        controller.disconnect();
        controller.disconnect();
        drop(controller);

        assert_eq!(journal.count(|c| *c == Call::Close), 1, "{ending:?}");
        assert_eq!(journal.count(|c| *c == Call::Dispose), 1, "{ending:?}");
    }
}

#[test]
fn test_drop_tears_down_live_session() {
    let (controller, _events, journal) = active();
    drop(controller);
    assert_eq!(journal.calls(), vec![Call::Close, Call::Dispose]);
}
