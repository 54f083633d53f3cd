//! Application Layer
//!
//! 接続ライフサイクル、フレーム適用、ファンインなどのユースケースを実装します。
//!
//! ## モジュール構成
//! - `connection`: 接続マネージャとReaderスレッド（オープン/リトライ/ハートビート/クローズ)
//! - `adapter`: ペダルアダプタ（キー状態の適用、イベント発火、コマンド面）
//! - `coordinator`: 複数アダプタの並行実行と合流
pub mod adapter;
pub mod connection;
pub mod coordinator;
