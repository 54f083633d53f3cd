//! ペダルアダプタ
//!
//! 物理デバイス1台 = Connection Manager + Key State Table + ノートオフセット。
//! デコード済みフレームをキー状態へ適用し、キーイベントを下流シンクへ発火する。
//! プレゼンテーション向けの読み取り専用オブザーバと、接続中のみ有効な
//! コマンド面（キャリブレーション等）も公開する。

use crate::application::connection::{ConnectionManager, LinkCommander, LinkState};
use crate::domain::{
    config::LinkConfig,
    error::{DomainError, DomainResult},
    keys::{Key, KeyTable, SampleFrame, SampleHistory, KEY_COUNT},
    ports::{LinkFactory, NoteSink},
    protocol::{DeviceCommand, Frame},
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// アダプタの観測可能状態（スレッド間共有）
///
/// 書き込みはアダプタの制御スレッド（コマンドプロセッサ）だけが行い、
/// プレゼンテーション側は任意のスレッドから読み取れる。
/// キーの同一性は再接続をまたいで維持される。
#[derive(Clone)]
pub struct AdapterState {
    inner: Arc<StateInner>,
}

struct StateInner {
    connected: AtomicBool,
    keys: Mutex<KeyTable>,
    samples: Mutex<SampleHistory>,
    version: Mutex<Option<String>>,
    /// デバイス報告のサンプルレート（0 = 未報告）
    sample_rate_hz: AtomicU32,
    debug: AtomicBool,
}

impl AdapterState {
    fn new() -> Self {
        Self {
            inner: Arc::new(StateInner {
                connected: AtomicBool::new(false),
                keys: Mutex::new(KeyTable::new()),
                samples: Mutex::new(SampleHistory::new()),
                version: Mutex::new(None),
                sample_rate_hz: AtomicU32::new(0),
                debug: AtomicBool::new(false),
            }),
        }
    }

    /// 接続中かどうか
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// 接続ステータス文字列
    pub fn status(&self) -> &'static str {
        if self.is_connected() {
            LinkState::Connected.as_str()
        } else {
            LinkState::Disconnected.as_str()
        }
    }

    /// デバイスが最後に報告したファームウェアバージョン（例: "v1.2.3"）
    pub fn version(&self) -> Option<String> {
        self.inner.version.lock().unwrap().clone()
    }

    /// デバイスが最後に報告したサンプルレート
    pub fn sample_rate_hz(&self) -> Option<u32> {
        match self.inner.sample_rate_hz.load(Ordering::Relaxed) {
            0 => None,
            hz => Some(hz),
        }
    }

    /// サンプルレートの表示文字列（例: "250Hz"）
    #[allow(dead_code)]
    pub fn sample_rate_label(&self) -> Option<String> {
        self.sample_rate_hz().map(|hz| format!("{}Hz", hz))
    }

    /// デバイスのライブデータ（デバッグ）モード
    pub fn debug(&self) -> bool {
        self.inner.debug.load(Ordering::Relaxed)
    }

    /// 1鍵の状態のスナップショット
    pub fn key(&self, index: usize) -> Key {
        *self.inner.keys.lock().unwrap().key(index)
    }

    /// 全キーの閾値のスナップショット
    pub fn thresholds(&self) -> [Option<i32>; KEY_COUNT] {
        self.inner.keys.lock().unwrap().thresholds()
    }

    /// サンプル履歴への読み取りアクセス
    ///
    /// リングのスナップショットコピーを避けるため、クロージャに
    /// 参照を渡す形で公開する。
    #[allow(dead_code)]
    pub fn with_samples<R>(&self, f: impl FnOnce(&SampleHistory) -> R) -> R {
        f(&self.inner.samples.lock().unwrap())
    }

    fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Relaxed);
    }
}

/// デコード済みフレームを状態へ適用し、キーイベントを発火する
///
/// フレームはデコード順に1件ずつ渡される（順序保証は呼び出し側の
/// 単一スレッド性による）。
fn apply_frame(state: &AdapterState, sink: &dyn NoteSink, note_offset: u8, frame: Frame) {
    match frame {
        Frame::KeyDown { index } => {
            state.inner.keys.lock().unwrap().press(index);
            sink.notify(index as u8 + note_offset, true);
        }
        Frame::KeyUp { index } => {
            state.inner.keys.lock().unwrap().release(index);
            sink.notify(index as u8 + note_offset, false);
        }
        Frame::Samples { time_ms, values } => {
            state.inner.keys.lock().unwrap().set_values(&values);
            state
                .inner
                .samples
                .lock()
                .unwrap()
                .push(SampleFrame { time_ms, values });
        }
        Frame::Thresholds { values } => {
            state.inner.keys.lock().unwrap().set_thresholds(&values);
        }
        Frame::DebugFlag(enabled) => {
            state.inner.debug.store(enabled, Ordering::Relaxed);
        }
        Frame::Heartbeat { hz } => {
            state.inner.sample_rate_hz.store(hz, Ordering::Relaxed);
        }
        Frame::Version(version) => {
            *state.inner.version.lock().unwrap() = Some(version);
        }
    }
}

/// デバイスへのコマンド面
///
/// 接続中のみ有効。未接続時は `DomainError::NotConnected` を返す。
#[derive(Clone)]
pub struct AdapterCommander {
    commander: LinkCommander,
}

impl AdapterCommander {
    /// キャリブレーションを実行させる
    pub fn calibrate(&self) -> DomainResult<()> {
        self.commander.send(DeviceCommand::Calibrate)
    }

    /// 現在の閾値をデバイスのEEPROMへ保存させる
    pub fn store_calibration(&self) -> DomainResult<()> {
        self.commander.send(DeviceCommand::StoreCalibration)
    }

    /// ライブデータ（デバッグ）モードをトグルする
    pub fn toggle_debug(&self) -> DomainResult<()> {
        self.commander.send(DeviceCommand::ToggleDebug)
    }

    /// 1キー分の閾値をデバイスへ書き込む
    pub fn push_threshold(&self, index: usize, value: i32) -> DomainResult<()> {
        if index >= KEY_COUNT {
            return Err(DomainError::Configuration(format!(
                "Key index {} out of range",
                index
            )));
        }
        self.commander.send(DeviceCommand::SetThreshold { index, value })
    }
}

/// ペダルアダプタ
///
/// プロセス開始時に1度だけ作られ、明示的なシャットダウンまで動き続ける。
/// 同じ物理デバイスに対して作り直されることはない。
pub struct PedalAdapter {
    manager: ConnectionManager,
    state: AdapterState,
    sink: Arc<dyn NoteSink>,
    note_offset: u8,
    poll: Duration,
}

impl PedalAdapter {
    /// 新しいアダプタを作成する
    ///
    /// # Arguments
    /// - `factory`: このデバイス用のリンクファクトリ（ポート識別子を内包）
    /// - `note_offset`: ローカルキー番号に加算する固定オフセット
    /// - `sink`: キーイベントの送り先（複数アダプタで共有可）
    /// - `link`: 接続パラメータ
    pub fn new(
        factory: Box<dyn LinkFactory>,
        note_offset: u8,
        sink: Arc<dyn NoteSink>,
        link: &LinkConfig,
    ) -> Self {
        Self {
            manager: ConnectionManager::new(
                factory,
                link.heartbeat_interval(),
                link.retry_interval(),
            ),
            state: AdapterState::new(),
            sink,
            note_offset,
            poll: link.read_timeout(),
        }
    }

    /// 観測用の状態ハンドルを取得する
    pub fn state(&self) -> AdapterState {
        self.state.clone()
    }

    /// コマンド面のハンドルを取得する
    pub fn commander(&self) -> AdapterCommander {
        AdapterCommander {
            commander: self.manager.commander(),
        }
    }

    /// ポート識別子
    pub fn port_name(&self) -> &str {
        self.manager.port_name()
    }

    /// 制御ループ（ブロッキング）
    ///
    /// `stop` がセットされるまで、再接続試行／ハートビート／フレーム適用を
    /// 繰り返す。停止時は接続を分解（Readerのjoinまで）してから戻る。
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        tracing::info!(
            "Adapter started: port={}, note_offset={}",
            self.manager.port_name(),
            self.note_offset
        );

        let state = self.state.clone();
        let sink = Arc::clone(&self.sink);
        let note_offset = self.note_offset;
        let mut processor =
            move |frame: Frame| apply_frame(&state, sink.as_ref(), note_offset, frame);

        while !stop.load(Ordering::Relaxed) {
            self.manager.tick(Instant::now());
            self.manager.pump(self.poll, &mut processor);
            self.sync_status();
        }

        self.manager.shutdown();
        self.sync_status();

        tracing::info!("Adapter stopped: port={}", self.manager.port_name());
    }

    /// マネージャの接続状態をオブザーバへ反映する
    fn sync_status(&self) {
        let connected = self.manager.state() == LinkState::Connected;
        if self.state.is_connected() != connected {
            self.state.set_connected(connected);
            tracing::info!(
                "Port {} is {}",
                self.manager.port_name(),
                if connected { "connected" } else { "disconnected" }
            );
        }
    }
}
