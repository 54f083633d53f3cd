/// モックノートシンク
///
/// テスト・開発用のイベント記録実装。実際のMIDI送信は行わず、
/// 受け取ったイベントを到着順に保持する。

use crate::domain::NoteSink;
use std::sync::Mutex;

/// 記録型ノートシンク
#[derive(Default)]
pub struct RecordingNoteSink {
    events: Mutex<Vec<(u8, bool)>>,
}

impl RecordingNoteSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記録済みイベントのスナップショット（(グローバルキー番号, 押下)の列）
    pub fn events(&self) -> Vec<(u8, bool)> {
        self.events.lock().unwrap().clone()
    }

    /// 記録をクリアする
    #[allow(dead_code)]
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl NoteSink for RecordingNoteSink {
    fn notify(&self, index: u8, down: bool) {
        self.events.lock().unwrap().push((index, down));
    }
}
