use anyhow::Context;
use pedal_bridge::application::adapter::PedalAdapter;
use pedal_bridge::application::coordinator::BridgeCoordinator;
use pedal_bridge::domain::config::AppConfig;
use pedal_bridge::domain::ports::NoteSink;
use pedal_bridge::infrastructure::midi_out::MidiNoteSink;
use pedal_bridge::infrastructure::serial_link::SerialLinkFactory;
use pedal_bridge::logging::init_logging;
use std::sync::Arc;

/// 設定ファイルのパス（実行ディレクトリ基準）
const CONFIG_PATH: &str = "config.toml";

fn main() {
    // 設定ファイルの読み込み（存在しない場合はデフォルト設定を使用）
    let (config, config_note) = match AppConfig::from_file(CONFIG_PATH) {
        Ok(config) => (config, format!("Loaded configuration from {}", CONFIG_PATH)),
        Err(e) => (
            AppConfig::default(),
            format!("Failed to load {}: {}. Using defaults.", CONFIG_PATH, e),
        ),
    };

    // ログシステムの初期化
    // 注意: _guardはmain終了まで保持する必要がある（Dropでログスレッドが終了）
    let _guard = init_logging(&config.log.level, config.log.json, config.log.dir.clone());

    tracing::info!("pedal-bridge starting...");
    tracing::info!("{}", config_note);

    match run(config) {
        Ok(_) => {
            tracing::info!("pedal-bridge terminated gracefully.");
        }
        Err(e) => {
            tracing::error!("Fatal error: {:?}", e);
            std::process::exit(1);
        }
    }
}

/// アプリケーションのメイン処理
fn run(config: AppConfig) -> anyhow::Result<()> {
    // 設定の検証
    config
        .validate()
        .context("Configuration validation failed")?;

    tracing::info!(
        "Link: baud={}, read_timeout={}ms, heartbeat={}ms, retry={}ms",
        config.link.baud_rate,
        config.link.read_timeout_ms,
        config.link.heartbeat_interval_ms,
        config.link.retry_interval_ms
    );
    tracing::info!(
        "MIDI: port='{}', channel={}, velocity={}, base_note={}",
        config.midi.port_name,
        config.midi.channel,
        config.midi.velocity,
        config.midi.base_note
    );

    // MIDI出力の初期化（全アダプタで共有する単一のシンク）
    let sink: Arc<dyn NoteSink> =
        Arc::new(MidiNoteSink::open(&config.midi).context("Failed to open MIDI output")?);

    // デバイスごとにアダプタを構築
    let adapters: Vec<PedalAdapter> = config
        .devices
        .iter()
        .map(|device| {
            tracing::info!(
                "Device: port={}, note_offset={}",
                device.port,
                device.note_offset
            );
            PedalAdapter::new(
                Box::new(SerialLinkFactory::new(device.port.clone(), &config.link)),
                device.note_offset,
                Arc::clone(&sink),
                &config.link,
            )
        })
        .collect();

    // ファンインコーディネータの起動
    let coordinator = BridgeCoordinator::spawn(adapters);
    tracing::info!("Bridge running with {} adapter(s)", coordinator.adapter_count());

    // 明示的な停止（プロセス終了）まで走り続ける
    coordinator.join();

    Ok(())
}
