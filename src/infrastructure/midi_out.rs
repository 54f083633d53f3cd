/// MIDI出力アダプタ
///
/// midirクレートを使用したノートシンクの実装。
/// キーイベントを固定チャンネル・固定ベロシティのノートオン/オフへ変換する。
///
/// MidiOutputConnectionはSyncを実装しないため、Mutexでラップして
/// 複数アダプタからの並行通知を直列化する。

use crate::domain::{DomainError, DomainResult, MidiConfig, NoteSink};
use midir::{MidiOutput, MidiOutputConnection};
use std::sync::Mutex;

/// クライアント名（MIDIシステムに登録される識別子）
const CLIENT_NAME: &str = "pedal-bridge";

/// MIDIノートシンク
pub struct MidiNoteSink {
    conn: Mutex<MidiOutputConnection>,
    /// 0始まりに変換済みのチャンネル
    channel: u8,
    velocity: u8,
    base_note: u8,
}

impl MidiNoteSink {
    /// MIDI出力を開く
    ///
    /// 設定されたポート名を含む既存の出力ポートに接続する。
    /// 見つからない場合、Unixでは同名の仮想ポートを作成する。
    ///
    /// # Returns
    /// - `Ok(MidiNoteSink)`: 接続成功
    /// - `Err(DomainError::Midi)`: ポートが開けない
    pub fn open(config: &MidiConfig) -> DomainResult<Self> {
        let output = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| DomainError::Midi(format!("Failed to initialize MIDI: {:?}", e)))?;

        let ports = output.ports();
        let target = ports.iter().find(|p| {
            output
                .port_name(p)
                .map(|name| name.contains(&config.port_name))
                .unwrap_or(false)
        });

        let conn = match target {
            Some(port) => {
                tracing::info!(
                    "Connecting to MIDI output '{}'",
                    output.port_name(port).unwrap_or_default()
                );
                output.connect(port, CLIENT_NAME).map_err(|e| {
                    DomainError::Midi(format!("Failed to connect MIDI port: {:?}", e.kind()))
                })?
            }
            None => open_virtual(output, &config.port_name)?,
        };

        Ok(Self {
            conn: Mutex::new(conn),
            channel: config.channel.saturating_sub(1),
            velocity: config.velocity,
            base_note: config.base_note,
        })
    }
}

/// 既存ポートが無い場合のフォールバック（Unix: 仮想ポートを作成）
#[cfg(unix)]
fn open_virtual(output: MidiOutput, name: &str) -> DomainResult<MidiOutputConnection> {
    use midir::os::unix::VirtualOutput;

    tracing::info!("Creating virtual MIDI output '{}'", name);
    output
        .create_virtual(name)
        .map_err(|e| DomainError::Midi(format!("Failed to create virtual port: {:?}", e.kind())))
}

/// 仮想ポート非対応プラットフォームのスタブ
#[cfg(not(unix))]
fn open_virtual(_output: MidiOutput, name: &str) -> DomainResult<MidiOutputConnection> {
    Err(DomainError::Midi(format!(
        "MIDI output port '{}' not found (virtual ports are not supported on this platform)",
        name
    )))
}

/// ノートオン/オフの3バイトメッセージを組み立てる
fn note_message(channel: u8, note: u8, velocity: u8, down: bool) -> [u8; 3] {
    let status = if down { 0x90 } else { 0x80 } | (channel & 0x0F);
    [status, note & 0x7F, velocity & 0x7F]
}

impl NoteSink for MidiNoteSink {
    /// キーイベントをMIDIノートへ変換して送信する
    ///
    /// 送信失敗はログに残すのみ（ブリッジ本体は止めない）。
    fn notify(&self, index: u8, down: bool) {
        let note = self.base_note.saturating_add(index);
        let message = note_message(self.channel, note, self.velocity, down);

        if let Err(e) = self.conn.lock().unwrap().send(&message) {
            tracing::warn!("MIDI send failed: {:?}", e);
        }
    }
}
