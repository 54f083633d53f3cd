//! Infrastructure層: 外部技術の統合
//!
//! Domain層のtraitを実装し、外部ライブラリ（serialport/midir）と接続する。

pub mod midi_out;
pub mod mock_link;
pub mod mock_sink;
pub mod serial_link;
