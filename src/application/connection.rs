//! 接続ライフサイクル管理
//!
//! シリアルハンドル1本のオープン／再試行／ハートビート／クローズと、
//! ブロッキング読み取りをコマンドプロセッサへ橋渡しするReaderスレッドを制御します。
//!
//! # 所有権と分解手順
//! ハンドルはConnection Managerが専有する。切断時は必ず
//! 「停止シグナル → Readerスレッドのjoin → ハンドルのクリア」の順で分解する。
//! join前にハンドルをクリアすると、クローズ済みハンドルへの読み取りが
//! 並行して走り得るため、この順序は入れ替えない。

use crate::domain::{
    error::{DomainError, DomainResult},
    ports::{LinkFactory, SerialLink},
    protocol::{self, DeviceCommand, Frame},
};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// 共有シリアルハンドル
///
/// Readerスレッドは読み取りのたびにロックを取り、最大でも
/// 読み取りタイムアウト時間しか保持しない。
type SharedLink = Arc<Mutex<Option<Box<dyn SerialLink>>>>;

/// 固定間隔の実行タイミング判定
///
/// 現在時刻を引数に取るため、テストでは合成したInstantで
/// 周期動作を検証できる。
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    last: Option<Instant>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// 実行時期に達したか判定する
    ///
    /// # Returns
    /// 初回、または前回trueを返してから間隔以上経過していればtrue。
    /// trueを返した時点で内部時刻を更新する
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                true
            }
            Some(last) if now.duration_since(last) >= self.interval => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }

    /// 次回の実行を今から1間隔後に繰り延べる
    pub fn arm(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Readerスレッドの制御ハンドル
struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// ハンドル未保持、リトライ間隔ごとにオープンを試行
    Disconnected,
    /// ハンドル保持中、Readerスレッド稼働中
    Connected,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
        }
    }
}

/// 接続マネージャ
///
/// シリアルハンドル1本のライフサイクルを駆動する。フレームの適用
/// （Key State Tableの変更とイベント発火）は呼び出し側が`pump`に渡す
/// プロセッサが行い、本構造体はプロトコル内容に関知しない。
pub struct ConnectionManager {
    factory: Box<dyn LinkFactory>,
    link: SharedLink,
    reader: Option<ReaderHandle>,
    frames: Option<Receiver<Frame>>,
    heartbeat: Ticker,
    retry: Ticker,
}

impl ConnectionManager {
    /// 新しい接続マネージャを作成（未接続状態で開始）
    ///
    /// # Arguments
    /// - `factory`: 接続ごとに新しいリンクを開くファクトリ
    /// - `heartbeat_interval`: 接続中に `h\n` を送る間隔
    /// - `retry_interval`: オープン失敗後、次の試行までの間隔
    pub fn new(
        factory: Box<dyn LinkFactory>,
        heartbeat_interval: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            factory,
            link: Arc::new(Mutex::new(None)),
            reader: None,
            frames: None,
            heartbeat: Ticker::new(heartbeat_interval),
            retry: Ticker::new(retry_interval),
        }
    }

    /// ポート識別子（ログ・ステータス表示用）
    pub fn port_name(&self) -> &str {
        self.factory.port_name()
    }

    /// 現在の接続状態
    pub fn state(&self) -> LinkState {
        if self.reader.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    /// 周期処理を1回実行する
    ///
    /// 未接続ならリトライ間隔ごとにオープンを試行し、接続中なら
    /// ハートビート間隔ごとに `h\n` を送信する。
    pub fn tick(&mut self, now: Instant) {
        match self.state() {
            LinkState::Disconnected => {
                if self.retry.due(now) {
                    self.try_connect(now);
                }
            }
            LinkState::Connected => {
                if self.heartbeat.due(now) {
                    self.send_heartbeat();
                }
            }
        }
    }

    /// 受信済みフレームを排出してプロセッサへ渡す
    ///
    /// フレームはデコード順に適用される。Readerスレッドの終了
    /// （チャンネル切断）を検知した場合は切断処理を行う。
    /// 未接続時は`poll`だけスリープして戻る。
    pub fn pump(&mut self, poll: Duration, processor: &mut dyn FnMut(Frame)) {
        let rx = match &self.frames {
            Some(rx) => rx.clone(),
            None => {
                std::thread::sleep(poll);
                return;
            }
        };

        match rx.recv_timeout(poll) {
            Ok(frame) => {
                processor(frame);
                // 溜まっている分はまとめて適用する
                while let Ok(frame) = rx.try_recv() {
                    processor(frame);
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                // Readerスレッドが読み取りエラーで終了した
                self.disconnect("read stream ended");
            }
        }
    }

    /// オープンを1回試行する
    fn try_connect(&mut self, now: Instant) {
        match self.factory.open() {
            Ok(link) => {
                *self.link.lock().unwrap() = Some(link);

                let (tx, rx) = unbounded::<Frame>();
                let stop = Arc::new(AtomicBool::new(false));
                let thread = {
                    let link = Arc::clone(&self.link);
                    let stop = Arc::clone(&stop);
                    let port = self.factory.port_name().to_string();
                    std::thread::spawn(move || reader_loop(link, tx, stop, port))
                };

                self.reader = Some(ReaderHandle { stop, thread });
                self.frames = Some(rx);
                // 最初のハートビートは1間隔後
                self.heartbeat.arm(now);

                tracing::info!("Serial port {} opened", self.factory.port_name());
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to open {}: {}. Retrying.",
                    self.factory.port_name(),
                    e
                );
            }
        }
    }

    /// ハートビートを送信する（失敗は切断として扱う）
    fn send_heartbeat(&mut self) {
        let result = {
            let mut guard = self.link.lock().unwrap();
            match guard.as_mut() {
                Some(link) => link.send(&DeviceCommand::Heartbeat.encode()),
                None => return,
            }
        };

        if let Err(e) = result {
            tracing::warn!("Heartbeat failed on {}: {}", self.factory.port_name(), e);
            self.disconnect("heartbeat write failed");
        }
    }

    /// 接続を分解する（停止 → join → クリアの順、入れ替え不可）
    fn disconnect(&mut self, reason: &str) {
        if self.reader.is_none() {
            return;
        }

        tracing::info!("Closing {} ({})", self.factory.port_name(), reason);

        if let Some(handle) = self.reader.take() {
            handle.stop.store(true, Ordering::Relaxed);
            let _ = handle.thread.join();
        }
        // Readerのjoin完了後にのみハンドルを手放す
        *self.link.lock().unwrap() = None;
        self.frames = None;
    }

    /// 明示的なシャットダウン（冪等）
    pub fn shutdown(&mut self) {
        self.disconnect("shutdown requested");
    }

    /// コマンド送信用のハンドルを取得する
    pub fn commander(&self) -> LinkCommander {
        LinkCommander {
            link: Arc::clone(&self.link),
        }
    }
}

/// デバイスへの制御コマンド送信ハンドル
///
/// プレゼンテーション側から接続マネージャを介さずに送信できるよう、
/// 共有ハンドルだけを持つ軽量なクローン可能ハンドル。
#[derive(Clone)]
pub struct LinkCommander {
    link: SharedLink,
}

impl LinkCommander {
    /// 制御コマンドを送信する
    ///
    /// # Returns
    /// - `Ok(())`: 送信成功
    /// - `Err(DomainError::NotConnected)`: 未接続
    /// - `Err(DomainError)`: 送信失敗（次の読み取り失敗で切断処理される）
    pub fn send(&self, command: DeviceCommand) -> DomainResult<()> {
        let mut guard = self.link.lock().unwrap();
        match guard.as_mut() {
            Some(link) => link.send(&command.encode()),
            None => Err(DomainError::NotConnected),
        }
    }

    /// 接続中かどうか
    pub fn is_connected(&self) -> bool {
        self.link.lock().unwrap().is_some()
    }
}

/// Readerスレッドのメインループ
///
/// タイムアウト付きの読み取りを繰り返して行を組み立て、デコード結果を
/// 順序保証付きチャンネルでコマンドプロセッサへ渡す。送信は非ブロッキング
/// （unboundedチャンネル）で、コンシューマの処理を待たない。
///
/// 不正な行は破棄してストリームを継続する。I/Oエラーでループを抜け、
/// Senderのdropによって切断がマネージャへ通知される。
fn reader_loop(link: SharedLink, tx: Sender<Frame>, stop: Arc<AtomicBool>, port: String) {
    let mut chunk = [0u8; 512];
    let mut pending: Vec<u8> = Vec::new();

    while !stop.load(Ordering::Relaxed) {
        let result = {
            let mut guard = link.lock().unwrap();
            match guard.as_mut() {
                Some(link) => link.read_chunk(&mut chunk),
                // ハンドルが無ければ仕事もない
                None => break,
            }
        };

        match result {
            Ok(0) => {
                // タイムアウト - 行が完成するまで読み直す
                continue;
            }
            Ok(n) => {
                pending.extend_from_slice(&chunk[..n]);
                drain_lines(&mut pending, &tx, &port);
            }
            Err(e) => {
                tracing::warn!("Read failed on {}: {}", port, e);
                break;
            }
        }
    }
    // txがここでdropされ、pump側に切断として観測される
}

/// 完成した行をバッファから切り出してデコード・送信する
fn drain_lines(pending: &mut Vec<u8>, tx: &Sender<Frame>, port: &str) {
    while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = pending.drain(..=pos).collect();
        let text = String::from_utf8_lossy(&raw[..pos]);
        let line = text.trim_end_matches('\r');

        if line.is_empty() {
            continue;
        }

        match protocol::decode(line) {
            Ok(frame) => {
                if tx.send(frame).is_err() {
                    // コマンドプロセッサ側が先に終了した
                    return;
                }
            }
            Err(e) => {
                tracing::debug!("Dropped malformed line on {}: {} ({:?})", port, e, line);
            }
        }
    }
}
