/// シリアル通信アダプタ
///
/// serialportクレートを使用したシリアルリンクの実装。
/// コントローラは改行区切りのASCII行を500000ボーで送出する。

use crate::domain::{DomainError, DomainResult, LinkConfig, LinkFactory, SerialLink};
use std::io::{Read, Write};
use std::time::Duration;

/// オープン済みシリアルポート1本
pub struct SerialLinkAdapter {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for SerialLinkAdapter {
    /// 受信バイトを読み取る
    ///
    /// serialportはタイムアウトを`TimedOut`エラーで返すため、
    /// ここで静かな`Ok(0)`に読み替える。リンクの生死とは無関係。
    fn read_chunk(&mut self, buf: &mut [u8]) -> DomainResult<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(DomainError::Read(format!("{}", e))),
        }
    }

    fn send(&mut self, data: &[u8]) -> DomainResult<()> {
        self.port
            .write_all(data)
            .map_err(|e| DomainError::Write(format!("{}", e)))
    }
}

/// シリアルリンクファクトリ
///
/// ポート識別子と接続パラメータを保持し、（再）接続のたびに
/// 新しいハンドルを開く。
pub struct SerialLinkFactory {
    port: String,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialLinkFactory {
    /// 新しいファクトリを作成
    ///
    /// # Arguments
    /// - `port`: ポート識別子（例: "/dev/ttyUSB0", "COM10"）
    /// - `link`: ボーレートと読み取りタイムアウト
    pub fn new(port: impl Into<String>, link: &LinkConfig) -> Self {
        Self {
            port: port.into(),
            baud_rate: link.baud_rate,
            read_timeout: link.read_timeout(),
        }
    }
}

impl LinkFactory for SerialLinkFactory {
    fn open(&self) -> DomainResult<Box<dyn SerialLink>> {
        // 8N1はserialportのデフォルト
        let port = serialport::new(self.port.as_str(), self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| DomainError::Connect(format!("{}: {}", self.port, e)))?;

        tracing::info!(
            "Serial port opened: {} @ {} baud, timeout {:?}",
            self.port,
            self.baud_rate,
            self.read_timeout
        );

        Ok(Box::new(SerialLinkAdapter { port }))
    }

    fn port_name(&self) -> &str {
        &self.port
    }
}
