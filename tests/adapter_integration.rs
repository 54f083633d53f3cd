//! アダプタ統合テスト
//!
//! モックリンク上でアダプタとコーディネータをend-to-endで駆動し、
//! 接続ライフサイクル・イベント転送・再接続・シャットダウンを検証する。
//! タイマーは短縮した間隔を注入してテストを高速化している。

use pedal_bridge::application::adapter::PedalAdapter;
use pedal_bridge::application::coordinator::BridgeCoordinator;
use pedal_bridge::domain::config::LinkConfig;
use pedal_bridge::domain::error::DomainError;
use pedal_bridge::domain::ports::NoteSink;
use pedal_bridge::infrastructure::mock_link::{MockDevice, MockLinkFactory};
use pedal_bridge::infrastructure::mock_sink::RecordingNoteSink;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// テスト用に短縮した接続パラメータ
fn fast_link_config() -> LinkConfig {
    LinkConfig {
        read_timeout_ms: 5,
        heartbeat_interval_ms: 30,
        retry_interval_ms: 20,
        ..Default::default()
    }
}

/// 条件が成立するまでポーリングする（タイムアウトでfalse）
fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn build_adapter(
    device: &MockDevice,
    name: &str,
    note_offset: u8,
    sink: Arc<dyn NoteSink>,
) -> PedalAdapter {
    PedalAdapter::new(
        Box::new(MockLinkFactory::new(device.clone(), name)),
        note_offset,
        sink,
        &fast_link_config(),
    )
}

#[test]
fn test_key_events_reach_sink_with_offset() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    // オフセット16のアダプタ: p3はKeyDown(19)として届く
    let adapter = build_adapter(&device, "mock0", 16, sink.clone());
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    device.push_line("p3");
    device.push_line("r3");

    assert!(wait_until(Duration::from_secs(2), || sink.events().len() == 2));
    assert_eq!(sink.events(), vec![(19, true), (19, false)]);

    coordinator.shutdown();
}

#[test]
fn test_events_preserve_decode_order() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink.clone());
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    // 1チャンクで複数行を一気に流す
    device.push_bytes(b"p0\np1\nr0\np2\nr1\nr2\n");

    assert!(wait_until(Duration::from_secs(2), || sink.events().len() == 6));
    assert_eq!(
        sink.events(),
        vec![
            (0, true),
            (1, true),
            (0, false),
            (2, true),
            (1, false),
            (2, false)
        ]
    );

    coordinator.shutdown();
}

#[test]
fn test_malformed_lines_do_not_stop_stream() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink.clone());
    let state = adapter.state();
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    device.push_line("x");
    device.push_line("p99");
    device.push_line("t1 2 3"); // 20個ではない
    device.push_line("p4");

    assert!(wait_until(Duration::from_secs(2), || !sink.events().is_empty()));
    assert_eq!(sink.events(), vec![(4, true)]);
    // 不正行はキー状態を一切変更しない
    assert_eq!(state.key(0).threshold, None);
    assert!(state.is_connected());

    coordinator.shutdown();
}

#[test]
fn test_telemetry_observers_update() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink.clone());
    let state = adapter.state();
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    device.push_line("i1.2.3");
    device.push_line("h250");
    device.push_line("d1");
    device.push_line(
        "t10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26 27 28 29",
    );

    assert!(wait_until(Duration::from_secs(2), || {
        state.version().is_some() && state.sample_rate_hz().is_some() && state.debug()
    }));

    assert_eq!(state.version().as_deref(), Some("v1.2.3"));
    assert_eq!(state.sample_rate_hz(), Some(250));
    assert_eq!(state.key(3).threshold, Some(13));
    assert_eq!(state.status(), "connected");

    coordinator.shutdown();
}

#[test]
fn test_heartbeat_written_while_connected() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink);
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    // ハートビート間隔（30ms）の数倍待って `h\n` が届いていること
    assert!(wait_until(Duration::from_secs(2), || {
        device.sent().iter().any(|cmd| cmd == b"h\n")
    }));

    coordinator.shutdown();
}

#[test]
fn test_connect_failures_are_retried() {
    let device = MockDevice::new();
    device.fail_next_opens(2);
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink);
    let state = adapter.state();
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    // 2回失敗した後、リトライで接続に成功する
    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));
    assert!(wait_until(Duration::from_secs(2), || state.is_connected()));

    coordinator.shutdown();
}

#[test]
fn test_reconnect_after_read_error_preserves_key_state() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink.clone());
    let state = adapter.state();
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    device.push_line("t5 5 5 5 5 5 5 5 5 5 5 5 5 5 5 5 5 5 5 5");
    device.push_line("p1");
    assert!(wait_until(Duration::from_secs(2), || sink.events().len() == 1));

    // デバイス取り外し → 切断 → 自動再接続
    device.fail_next_read();
    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 2));
    assert!(wait_until(Duration::from_secs(2), || state.is_connected()));

    // 閾値は再接続をまたいで維持される（接続だけが入れ替わる）
    assert_eq!(state.key(1).threshold, Some(5));

    // 新しい接続でもイベントが流れ続ける
    device.push_line("r1");
    assert!(wait_until(Duration::from_secs(2), || sink.events().len() == 2));
    assert_eq!(sink.events(), vec![(1, true), (1, false)]);

    coordinator.shutdown();
}

#[test]
fn test_status_observer_tracks_disconnect() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink);
    let state = adapter.state();
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || state.is_connected()));

    // 再接続させないよう、読み取りエラーとオープン失敗を同時に仕込む
    device.fail_next_opens(u32::MAX);
    device.fail_next_read();

    assert!(wait_until(Duration::from_secs(2), || !state.is_connected()));
    assert_eq!(state.status(), "disconnected");

    coordinator.shutdown();
}

#[test]
fn test_command_surface_requires_connection() {
    let device = MockDevice::new();
    device.fail_next_opens(u32::MAX);
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink);
    let commander = adapter.commander();
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    // 未接続時のコマンドはNotConnected
    std::thread::sleep(Duration::from_millis(30));
    assert!(matches!(
        commander.calibrate(),
        Err(DomainError::NotConnected)
    ));

    coordinator.shutdown();
}

#[test]
fn test_command_surface_forwards_when_connected() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink);
    let commander = adapter.commander();
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    commander.calibrate().unwrap();
    commander.store_calibration().unwrap();
    commander.push_threshold(3, 512).unwrap();

    let sent = device.sent();
    assert!(sent.contains(&b"c\n".to_vec()));
    assert!(sent.contains(&b"w\n".to_vec()));
    assert!(sent.contains(&b"m3 512\n".to_vec()));

    coordinator.shutdown();
}

#[test]
fn test_fan_in_from_two_adapters() {
    let device_a = MockDevice::new();
    let device_b = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    // 2台のペダルボードが1つのシンクへ合流（オフセット0と16）
    let adapters = vec![
        build_adapter(&device_a, "mock-a", 0, sink.clone()),
        build_adapter(&device_b, "mock-b", 16, sink.clone()),
    ];
    let coordinator = BridgeCoordinator::spawn(adapters);

    assert!(wait_until(Duration::from_secs(2), || {
        device_a.open_count() == 1 && device_b.open_count() == 1
    }));

    device_a.push_line("p0");
    device_b.push_line("p0");

    assert!(wait_until(Duration::from_secs(2), || sink.events().len() == 2));

    // アダプタ間の順序は保証されないため、集合として検証する
    let events = sink.events();
    assert!(events.contains(&(0, true)));
    assert!(events.contains(&(16, true)));

    coordinator.shutdown();
}

#[test]
fn test_shutdown_completes_promptly() {
    let device = MockDevice::new();
    let sink = Arc::new(RecordingNoteSink::new());

    let adapter = build_adapter(&device, "mock0", 0, sink);
    let coordinator = BridgeCoordinator::spawn(vec![adapter]);

    assert!(wait_until(Duration::from_secs(2), || device.open_count() == 1));

    // Readerのjoinを含めても即座に完了すること
    let started = Instant::now();
    coordinator.shutdown();
    assert!(started.elapsed() < Duration::from_secs(1));
}
