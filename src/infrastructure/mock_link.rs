/// モックシリアルリンク
///
/// テスト・開発用のスクリプト駆動実装。テストコードが保持する
/// MockDeviceハンドルから受信データの投入・エラーの注入・送信内容の
/// 検証を行い、ファクトリは同じデバイスに紐づくリンクを開き直す
/// （再接続のシミュレーション）。

use crate::domain::{DomainError, DomainResult, LinkFactory, SerialLink};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// モックデバイス（テスト側が保持する制御ハンドル）
#[derive(Clone, Default)]
pub struct MockDevice {
    inner: Arc<DeviceInner>,
}

#[derive(Default)]
struct DeviceInner {
    /// リンクへ流す受信バイト列
    incoming: Mutex<VecDeque<u8>>,
    /// リンクが送信したコマンドの記録
    sent: Mutex<Vec<Vec<u8>>>,
    /// 次の読み取りをI/Oエラーにする
    fail_next_read: AtomicBool,
    /// 残りオープン失敗回数
    open_failures: AtomicU32,
    /// オープン成功回数
    opens: AtomicU32,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1行を受信キューへ投入する（改行は自動付与）
    pub fn push_line(&self, line: &str) {
        let mut incoming = self.inner.incoming.lock().unwrap();
        incoming.extend(line.as_bytes());
        incoming.push_back(b'\n');
    }

    /// 生バイト列を受信キューへ投入する（行の分割読みの再現用）
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.inner.incoming.lock().unwrap().extend(bytes);
    }

    /// 次の読み取りでI/Oエラーを発生させる（デバイス取り外しの再現）
    pub fn fail_next_read(&self) {
        self.inner.fail_next_read.store(true, Ordering::Relaxed);
    }

    /// 以降のオープンを指定回数失敗させる
    pub fn fail_next_opens(&self, count: u32) {
        self.inner.open_failures.store(count, Ordering::Relaxed);
    }

    /// オープンに成功した回数
    pub fn open_count(&self) -> u32 {
        self.inner.opens.load(Ordering::Relaxed)
    }

    /// 送信されたコマンドの記録を取得する
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.sent.lock().unwrap().clone()
    }
}

/// モックリンク（MockDeviceに紐づく接続1本分）
pub struct MockLink {
    device: MockDevice,
}

impl SerialLink for MockLink {
    fn read_chunk(&mut self, buf: &mut [u8]) -> DomainResult<usize> {
        if self.device.inner.fail_next_read.swap(false, Ordering::Relaxed) {
            return Err(DomainError::Read("mock device removed".to_string()));
        }

        let n = {
            let mut incoming = self.device.inner.incoming.lock().unwrap();
            let n = buf.len().min(incoming.len());
            for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
                *slot = byte;
            }
            n
        };

        if n == 0 {
            // 読み取りタイムアウトの再現
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(n)
    }

    fn send(&mut self, data: &[u8]) -> DomainResult<()> {
        self.device.inner.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

/// モックリンクファクトリ
pub struct MockLinkFactory {
    device: MockDevice,
    name: String,
}

impl MockLinkFactory {
    pub fn new(device: MockDevice, name: impl Into<String>) -> Self {
        Self {
            device,
            name: name.into(),
        }
    }
}

impl LinkFactory for MockLinkFactory {
    fn open(&self) -> DomainResult<Box<dyn SerialLink>> {
        let remaining = self.device.inner.open_failures.load(Ordering::Relaxed);
        if remaining > 0 {
            self.device
                .inner
                .open_failures
                .store(remaining - 1, Ordering::Relaxed);
            return Err(DomainError::Connect(format!(
                "{}: mock open failure",
                self.name
            )));
        }

        self.device.inner.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockLink {
            device: self.device.clone(),
        }))
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}
