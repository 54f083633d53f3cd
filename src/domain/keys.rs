//! キー状態テーブルとアナログサンプル履歴
//!
//! アダプタごとに20鍵分の状態（閾値・押下・最新ADC値）を保持する。
//! テーブルはコマンド処理コンテキストからのみ変更され、キーの同一性は
//! 再接続をまたいで維持される（接続が入れ替わってもキーは作り直さない）。

use std::collections::VecDeque;

/// 1アダプタあたりのキー数（ペダルボード1台 = 20鍵、固定）
pub const KEY_COUNT: usize = 20;

/// 1鍵分の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    /// キャリブレーション閾値（最初の `t` フレーム受信まで未設定）
    pub threshold: Option<i32>,
    /// 押下状態
    pub pressed: bool,
    /// 最新のアナログ値（最初の `v` フレーム受信まで未設定）
    pub last_value: Option<i32>,
}

impl Key {
    fn new() -> Self {
        Self {
            threshold: None,
            pressed: false,
            last_value: None,
        }
    }
}

/// キー状態テーブル（位置でインデックスされる固定長20鍵）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTable {
    keys: [Key; KEY_COUNT],
}

impl KeyTable {
    /// 全キー未押下・閾値未設定のテーブルを作成
    pub fn new() -> Self {
        Self {
            keys: [Key::new(); KEY_COUNT],
        }
    }

    /// キー押下を記録
    ///
    /// 呼び出し側（コマンドプロセッサ）はデコード済みフレームのみを渡すため、
    /// indexは常に範囲内。
    pub fn press(&mut self, index: usize) {
        self.keys[index].pressed = true;
    }

    /// キー解放を記録
    pub fn release(&mut self, index: usize) {
        self.keys[index].pressed = false;
    }

    /// 全キーの閾値を位置対応で更新
    pub fn set_thresholds(&mut self, values: &[i32; KEY_COUNT]) {
        for (key, value) in self.keys.iter_mut().zip(values) {
            key.threshold = Some(*value);
        }
    }

    /// 全キーの最新アナログ値を位置対応で更新
    pub fn set_values(&mut self, values: &[i32; KEY_COUNT]) {
        for (key, value) in self.keys.iter_mut().zip(values) {
            key.last_value = Some(*value);
        }
    }

    /// 1鍵の状態を取得
    pub fn key(&self, index: usize) -> &Key {
        &self.keys[index]
    }

    /// 閾値の配列を取得（プレゼンテーション用の読み取り専用ビュー）
    pub fn thresholds(&self) -> [Option<i32>; KEY_COUNT] {
        let mut out = [None; KEY_COUNT];
        for (slot, key) in out.iter_mut().zip(&self.keys) {
            *slot = key.threshold;
        }
        out
    }
}

impl Default for KeyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 1回分のアナログサンプルフレーム
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleFrame {
    /// デバイス時刻（ミリ秒）
    pub time_ms: u32,
    /// 全キーのADC生値
    pub values: [i32; KEY_COUNT],
}

/// アナログサンプルの履歴リング
///
/// 固定容量で最古のフレームから追い出す。プレゼンテーション側の
/// 波形表示のためだけに保持され、コアロジックは参照しない。
#[derive(Debug, Clone)]
pub struct SampleHistory {
    frames: VecDeque<SampleFrame>,
    capacity: usize,
}

impl SampleHistory {
    /// 履歴リングの既定容量
    pub const DEFAULT_CAPACITY: usize = 512;

    /// 既定容量で作成
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// 指定容量で作成
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// フレームを追加（容量超過時は最古を破棄）
    pub fn push(&mut self, frame: SampleFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// 保持中のフレーム数
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// 履歴が空かどうか
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 古い順のイテレータ
    pub fn iter(&self) -> impl Iterator<Item = &SampleFrame> {
        self.frames.iter()
    }

    /// 最新のフレーム
    pub fn latest(&self) -> Option<&SampleFrame> {
        self.frames.back()
    }
}

impl Default for SampleHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_table_initial_state() {
        let table = KeyTable::new();
        for i in 0..KEY_COUNT {
            let key = table.key(i);
            assert!(!key.pressed);
            assert_eq!(key.threshold, None);
            assert_eq!(key.last_value, None);
        }
    }

    #[test]
    fn test_press_and_release() {
        let mut table = KeyTable::new();

        table.press(5);
        assert!(table.key(5).pressed);
        // 他のキーは影響を受けない
        assert!(!table.key(4).pressed);

        table.release(5);
        assert!(!table.key(5).pressed);
    }

    #[test]
    fn test_set_thresholds_positional() {
        let mut table = KeyTable::new();
        let mut values = [0i32; KEY_COUNT];
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as i32;
        }

        table.set_thresholds(&values);

        assert_eq!(table.key(3).threshold, Some(3));
        assert_eq!(table.key(19).threshold, Some(19));
        assert_eq!(table.thresholds()[7], Some(7));
    }

    #[test]
    fn test_set_values_positional() {
        let mut table = KeyTable::new();
        let values = [100i32; KEY_COUNT];

        table.set_values(&values);

        assert_eq!(table.key(0).last_value, Some(100));
        assert_eq!(table.key(19).last_value, Some(100));
        // 閾値は変更されない
        assert_eq!(table.key(0).threshold, None);
    }

    #[test]
    fn test_sample_history_eviction() {
        let mut history = SampleHistory::with_capacity(3);

        for t in 0..5u32 {
            history.push(SampleFrame {
                time_ms: t,
                values: [0; KEY_COUNT],
            });
        }

        // 容量3なので最古の2フレームは追い出されている
        assert_eq!(history.len(), 3);
        let times: Vec<u32> = history.iter().map(|f| f.time_ms).collect();
        assert_eq!(times, vec![2, 3, 4]);
        assert_eq!(history.latest().map(|f| f.time_ms), Some(4));
    }

    #[test]
    fn test_sample_history_default_capacity() {
        let history = SampleHistory::new();
        assert!(history.is_empty());
        assert_eq!(SampleHistory::DEFAULT_CAPACITY, 512);
    }
}
