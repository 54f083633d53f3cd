/// Port定義（Clean Architectureのインターフェース）
///
/// Domain層が外部実装に依存するための抽象trait。
/// Infrastructure層がこれらを実装し、Application層がDIで注入する。

use crate::domain::error::DomainResult;

/// シリアルリンクポート: オープン済みのシリアル接続1本を抽象化
///
/// ハンドルはConnection Managerが専有し、読み取りはReader Bridgeだけが行う。
/// 実装は読み取りタイムアウト（100ms）を内包し、タイムアウトを
/// `Ok(0)` として返すこと（エラーにしない）。
pub trait SerialLink: Send {
    /// 受信バイトを読み取る（タイムアウトまでブロック）
    ///
    /// # Returns
    /// - `Ok(n)` (n > 0): n バイト読み取った
    /// - `Ok(0)`: タイムアウト（データなし、リンクは健在）
    /// - `Err(DomainError)`: I/Oエラー（デバイス切断等、リンクは破棄する）
    fn read_chunk(&mut self, buf: &mut [u8]) -> DomainResult<usize>;

    /// 制御コマンドのバイト列を送信する
    ///
    /// # Returns
    /// - `Ok(())`: 送信成功
    /// - `Err(DomainError)`: 送信失敗（切断として扱われる）
    fn send(&mut self, data: &[u8]) -> DomainResult<()>;
}

/// リンクファクトリポート: 接続（再接続）ごとに新しいリンクを開く
///
/// ポート識別子はプロセス全体のグローバルではなく、ファクトリの
/// 構築パラメータとしてアダプタごとに渡される。
pub trait LinkFactory: Send {
    /// シリアルポートを開く
    ///
    /// # Returns
    /// - `Ok(link)`: オープン成功
    /// - `Err(DomainError::Connect)`: 失敗。リトライ間隔後に再試行される
    fn open(&self) -> DomainResult<Box<dyn SerialLink>>;

    /// ポート識別子（ログ・ステータス表示用）
    fn port_name(&self) -> &str;
}

/// ノートシンクポート: キーイベントの下流コンシューマ
///
/// 複数アダプタから並行に呼ばれるため `Send + Sync` を要求する。
/// 具体実装（MIDI送信等）への結合を避けるための注入点。
pub trait NoteSink: Send + Sync {
    /// キーイベントを通知する
    ///
    /// # Arguments
    /// - `index`: グローバルキー番号（ローカル番号 + ノートオフセット）
    /// - `down`: 押下ならtrue、解放ならfalse
    fn notify(&self, index: u8, down: bool);
}
