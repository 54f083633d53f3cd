//! 設定管理
//!
//! TOML設定ファイルの読み込みとDomain型への変換。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::keys::KEY_COUNT;

/// アプリケーション設定のルート構造
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AppConfig {
    /// シリアルリンク設定
    #[serde(default)]
    pub link: LinkConfig,
    /// MIDI出力設定
    #[serde(default)]
    pub midi: MidiConfig,
    /// 接続するペダルボード（1台以上、ポートとオフセットの組）
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceConfig>,
    /// ログ設定
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            midi: MidiConfig::default(),
            devices: default_devices(),
            log: LogConfig::default(),
        }
    }
}

/// 既定のデバイス構成（2台のペダルボードを1つの出力へフォワード）
fn default_devices() -> Vec<DeviceConfig> {
    vec![
        DeviceConfig {
            port: "/dev/ttyUSB0".to_string(),
            note_offset: 0,
        },
        DeviceConfig {
            port: "/dev/ttyUSB1".to_string(),
            note_offset: 16,
        },
    ]
}

/// シリアルリンク設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkConfig {
    /// ボーレート
    ///
    /// コントローラのファームウェアは500000で固定
    pub baud_rate: u32,

    /// 読み取りタイムアウト（ミリ秒）
    ///
    /// Reader Bridgeの1回のブロッキング読み取りの上限。デフォルト: 100ms
    pub read_timeout_ms: u64,

    /// ハートビート送信間隔（ミリ秒）
    ///
    /// 接続中、この間隔で `h\n` を送信しリンクを維持する。デフォルト: 1000ms
    pub heartbeat_interval_ms: u64,

    /// 再接続試行間隔（ミリ秒）
    ///
    /// オープン失敗後、次の試行までの待ち時間。デフォルト: 1000ms
    pub retry_interval_ms: u64,
}

impl LinkConfig {
    /// ファームウェア既定のボーレート
    pub const DEFAULT_BAUD_RATE: u32 = 500_000;
    /// デフォルトの読み取りタイムアウト（ミリ秒）
    pub const DEFAULT_READ_TIMEOUT_MS: u64 = 100;
    /// デフォルトのハートビート間隔（ミリ秒）
    pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1000;
    /// デフォルトの再接続間隔（ミリ秒）
    pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 1000;

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: Self::DEFAULT_BAUD_RATE,
            read_timeout_ms: Self::DEFAULT_READ_TIMEOUT_MS,
            heartbeat_interval_ms: Self::DEFAULT_HEARTBEAT_INTERVAL_MS,
            retry_interval_ms: Self::DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

/// MIDI出力設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MidiConfig {
    /// 出力ポート名
    ///
    /// この名前を含む既存ポートに接続する。見つからない場合（Unix）は
    /// 同名の仮想ポートを作成する
    pub port_name: String,

    /// MIDIチャンネル（1-16）
    pub channel: u8,

    /// ノートオン時のベロシティ（0-127）
    pub velocity: u8,

    /// ベースノート番号
    ///
    /// 送信ノート = ベースノート + グローバルキー番号。デフォルト: 36 (C2)
    pub base_note: u8,
}

impl MidiConfig {
    pub const DEFAULT_PORT_NAME: &'static str = "Pedal";
    pub const DEFAULT_CHANNEL: u8 = 1;
    pub const DEFAULT_VELOCITY: u8 = 64;
    pub const DEFAULT_BASE_NOTE: u8 = 36;
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            port_name: Self::DEFAULT_PORT_NAME.to_string(),
            channel: Self::DEFAULT_CHANNEL,
            velocity: Self::DEFAULT_VELOCITY,
            base_note: Self::DEFAULT_BASE_NOTE,
        }
    }
}

/// ペダルボード1台分の設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeviceConfig {
    /// シリアルポート識別子
    ///
    /// 例: "/dev/ttyUSB0" (Linux), "COM10" (Windows)
    pub port: String,

    /// ノートオフセット
    ///
    /// このボードのローカルキー番号に加算される固定値。
    /// ボードごとに異なる値を割り当てる（例: 0 と 16）
    pub note_offset: u8,
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LogConfig {
    /// ログレベル（"info", "debug", "trace"等）
    pub level: String,

    /// JSON形式で出力するか
    pub json: bool,

    /// ログファイル出力先ディレクトリ（未設定 = 標準出力）
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// TOMLファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> DomainResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DomainError::Configuration(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content)
            .map_err(|e| DomainError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// デフォルト設定をTOMLファイルに書き出す
    #[allow(dead_code)]
    pub fn write_default<P: AsRef<Path>>(path: P) -> DomainResult<()> {
        let config = Self::default();
        let content = toml::to_string_pretty(&config).map_err(|e| {
            DomainError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content)
            .map_err(|e| DomainError::Configuration(format!("Failed to write config file: {}", e)))
    }

    /// 設定の妥当性を検証
    pub fn validate(&self) -> DomainResult<()> {
        if self.devices.is_empty() {
            return Err(DomainError::Configuration(
                "At least one device must be configured".to_string(),
            ));
        }

        // リンクパラメータの検証
        if self.link.baud_rate == 0 {
            return Err(DomainError::Configuration(
                "Baud rate must be greater than 0".to_string(),
            ));
        }
        if self.link.read_timeout_ms == 0 {
            return Err(DomainError::Configuration(
                "Read timeout must be greater than 0".to_string(),
            ));
        }
        if self.link.heartbeat_interval_ms == 0 || self.link.retry_interval_ms == 0 {
            return Err(DomainError::Configuration(
                "Heartbeat and retry intervals must be greater than 0".to_string(),
            ));
        }

        // MIDIパラメータの検証
        if self.midi.channel == 0 || self.midi.channel > 16 {
            return Err(DomainError::Configuration(
                "MIDI channel must be in range 1-16".to_string(),
            ));
        }
        if self.midi.velocity > 127 {
            return Err(DomainError::Configuration(
                "MIDI velocity must be in range 0-127".to_string(),
            ));
        }

        // デバイスごとの検証: ノート番号がMIDIの範囲に収まること
        for device in &self.devices {
            let highest = self.midi.base_note as u32
                + device.note_offset as u32
                + (KEY_COUNT as u32 - 1);
            if highest > 127 {
                return Err(DomainError::Configuration(format!(
                    "Device '{}': highest note {} exceeds MIDI range (base_note {} + offset {} + {} keys)",
                    device.port,
                    highest,
                    self.midi.base_note,
                    device.note_offset,
                    KEY_COUNT
                )));
            }
        }

        // ポートとオフセットの重複チェック
        for (i, a) in self.devices.iter().enumerate() {
            for b in &self.devices[i + 1..] {
                if a.port == b.port {
                    return Err(DomainError::Configuration(format!(
                        "Duplicate device port '{}'",
                        a.port
                    )));
                }
                if a.note_offset == b.note_offset {
                    return Err(DomainError::Configuration(format!(
                        "Duplicate note offset {} ('{}' and '{}')",
                        a.note_offset, a.port, b.port
                    )));
                }
            }
        }

        Ok(())
    }
}
