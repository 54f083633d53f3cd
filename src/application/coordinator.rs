//! ファンインコーディネータ
//!
//! 独立したライフサイクルを持つ複数のペダルアダプタを並行に走らせ、
//! すべてのキーイベントを共有の1つのノートシンクへ合流させます。
//! アダプタ間のイベント順序は保証しない（アダプタ内の順序は保たれる）。

use crate::application::adapter::PedalAdapter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// アダプタ1台分の実行スレッド
struct AdapterWorker {
    port: String,
    thread: JoinHandle<()>,
}

/// ブリッジコーディネータ
///
/// 各アダプタを専用の制御スレッドで起動し、シャットダウン時は
/// 全アダプタの停止と終了を待ってから戻る。
pub struct BridgeCoordinator {
    stop: Arc<AtomicBool>,
    workers: Vec<AdapterWorker>,
}

impl BridgeCoordinator {
    /// アダプタ群を起動する
    ///
    /// アダプタ間で共有する可変状態は（注入済みの）イベントシンクのみ。
    pub fn spawn(adapters: Vec<PedalAdapter>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        let workers = adapters
            .into_iter()
            .map(|adapter| {
                let stop = Arc::clone(&stop);
                let port = adapter.port_name().to_string();
                let thread = std::thread::spawn(move || adapter.run(stop));
                AdapterWorker { port, thread }
            })
            .collect();

        Self { stop, workers }
    }

    /// 起動済みのアダプタ数
    pub fn adapter_count(&self) -> usize {
        self.workers.len()
    }

    /// 全アダプタを停止し、終了を待つ
    ///
    /// 各アダプタはReaderスレッドのjoinまで済ませてから終了するため、
    /// 本メソッドから戻った時点で全スレッドが完全に停止している。
    pub fn shutdown(self) {
        tracing::info!("Shutting down {} adapter(s)...", self.workers.len());
        self.stop.store(true, Ordering::Relaxed);

        for worker in self.workers {
            if worker.thread.join().is_err() {
                tracing::error!("Adapter thread for {} panicked", worker.port);
            }
        }

        tracing::info!("All adapters stopped");
    }

    /// 全アダプタの終了を待つ（ブロッキング）
    ///
    /// アダプタは明示的な停止要求まで走り続けるため、通常は戻らない。
    pub fn join(self) {
        for worker in self.workers {
            if worker.thread.join().is_err() {
                tracing::error!("Adapter thread for {} panicked", worker.port);
            }
        }
    }
}
