/// ログ・トレーシング基盤
///
/// tracingを使用した統一的なログ出力。
///
/// # 設計意図
/// ブリッジは常駐プロセス（サービス）として動くため、ファイル出力時は
/// tracing-appenderの非同期書き込みを使い、接続状態の遷移やドロップした
/// 不正行の診断をリリースビルドでも追えるようにしている。

use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログシステムを初期化
///
/// # Arguments
/// - `log_level`: ログレベル（"info", "debug", "trace"等）
/// - `json_format`: JSON形式で出力するか
/// - `log_dir`: ログファイル出力先（None = 標準出力）
///
/// # Returns
/// ファイル出力時は`Some(WorkerGuard)`。プログラム終了まで保持必須
/// （Drop時にログスレッドが終了してバッファがフラッシュされる）。
pub fn init_logging(
    log_level: &str,
    json_format: bool,
    log_dir: Option<PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_dir {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!(
                    "Failed to create log directory {}: {}. Falling back to stdout.",
                    dir.display(),
                    e
                );
                return init_stdout(env_filter, json_format, log_level);
            }

            let file_appender = tracing_appender::rolling::daily(dir, "pedal_bridge.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let subscriber = tracing_subscriber::registry().with(env_filter);

            let result = if json_format {
                subscriber
                    .with(fmt::layer().json().with_writer(non_blocking))
                    .try_init()
            } else {
                subscriber
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_thread_ids(true)
                            .with_ansi(false) // ファイル出力時はANSIエスケープ無効
                            .with_writer(non_blocking),
                    )
                    .try_init()
            };

            if result.is_err() {
                return None;
            }

            tracing::info!(
                "Logging initialized (async file): level={}, format={}",
                log_level,
                if json_format { "json" } else { "text" }
            );
            Some(guard)
        }
        None => init_stdout(env_filter, json_format, log_level),
    }
}

/// 標準出力への初期化
fn init_stdout(
    env_filter: EnvFilter,
    json_format: bool,
    log_level: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let result = if json_format {
        subscriber.with(fmt::layer().json()).try_init()
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
    };

    if result.is_ok() {
        tracing::info!(
            "Logging initialized (stdout): level={}, format={}",
            log_level,
            if json_format { "json" } else { "text" }
        );
    }
    None
}
