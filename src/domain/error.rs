/// エラー型定義
///
/// Domain層の統一エラー型。thiserrorを使用して型安全なエラー処理を提供します。
///
/// # 設計方針
/// - unwrap()の使用を禁止し、明示的なエラーハンドリングを強制
/// - Result型でエラー伝播を明示化
/// - 回復可能性をエラー型で表現（Connect/Readは再試行、Configurationは起動失敗）

use crate::domain::protocol::ParseError;
use thiserror::Error;

/// Domain層の統一エラー型
#[derive(Error, Debug)]
pub enum DomainError {
    /// シリアルポートのオープン失敗（リトライ間隔後に再試行、致命的ではない）
    #[error("Connect error: {0}")]
    Connect(String),

    /// ストリーム途中のI/Oエラー（切断として扱い、再接続する）
    #[error("Read error: {0}")]
    Read(String),

    /// デバイスへの書き込み失敗
    #[error("Write error: {0}")]
    Write(String),

    /// プロトコル行のデコード失敗（行は破棄、ストリームは継続）
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// 設定関連のエラー
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// MIDI出力関連のエラー
    #[error("MIDI error: {0}")]
    Midi(String),

    /// 未接続状態でのコマンド実行
    #[error("Device not connected")]
    NotConnected,
}

/// Domain層の統一Result型
pub type DomainResult<T> = Result<T, DomainError>;
