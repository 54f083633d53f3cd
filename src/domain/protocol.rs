//! ラインプロトコルのコーデック
//!
//! ペダルコントローラが送出する改行区切りASCII行のデコードと、
//! ホスト→デバイス方向の制御コマンドのエンコード。I/Oは一切行わない純粋関数。
//!
//! # 受信プロトコル（1行 = 1フレーム）
//! | タグ | パラメータ | フレーム |
//! |------|-----------|----------|
//! | `p`  | キー番号1個 | KeyDown |
//! | `r`  | キー番号1個 | KeyUp |
//! | `v`  | 時刻(ms) + 値20個 | Samples |
//! | `t`  | 閾値20個 | Thresholds |
//! | `d`  | 整数（0=false, 非0=true） | DebugFlag |
//! | `h`  | サンプルレート(Hz) | Heartbeat |
//! | `i`  | 任意文字列 | Version |

use crate::domain::keys::KEY_COUNT;
use thiserror::Error;

/// デコード失敗の理由
///
/// 不正な行でも呼び出し側をパニックさせない。行は破棄され、ストリームは継続する。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// 空行
    #[error("empty line")]
    Empty,

    /// 未知のコマンドタグ
    #[error("unknown command tag '{0}'")]
    UnknownTag(char),

    /// キー番号が [0, 20) の範囲外
    #[error("key index {0} out of range")]
    IndexOutOfRange(i32),

    /// パラメータ数の不一致
    #[error("expected {expected} parameters, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// 数値として解釈できないトークン
    #[error("invalid number '{0}'")]
    NotANumber(String),
}

/// デコード済みのプロトコルフレーム
///
/// Key State Tableへの適用とイベント転送の後、即座に破棄される一時データ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// キー押下エッジ
    KeyDown { index: usize },
    /// キー解放エッジ
    KeyUp { index: usize },
    /// アナログサンプルフレーム（デバイス時刻 + 全キーのADC値）
    Samples {
        time_ms: u32,
        values: [i32; KEY_COUNT],
    },
    /// キャリブレーション閾値（全キー分）
    Thresholds { values: [i32; KEY_COUNT] },
    /// デバイスのライブデータ送信モード
    DebugFlag(bool),
    /// ハートビート応答（デバイスのサンプルレート）
    Heartbeat { hz: u32 },
    /// ファームウェアバージョン（表示形式 "v1.2.3"）
    Version(String),
}

/// 1行をフレームにデコードする
///
/// # Arguments
/// - `line`: 終端の改行を除いたASCII行（先頭1文字がコマンドタグ）
///
/// # Returns
/// - `Ok(Frame)`: デコード成功
/// - `Err(ParseError)`: 不正な行。状態は一切変更されない
pub fn decode(line: &str) -> Result<Frame, ParseError> {
    let tag = line.chars().next().ok_or(ParseError::Empty)?;
    let params = line[tag.len_utf8()..].trim();

    match tag {
        'p' => Ok(Frame::KeyDown {
            index: parse_key_index(params)?,
        }),
        'r' => Ok(Frame::KeyUp {
            index: parse_key_index(params)?,
        }),
        'v' => {
            let tokens: Vec<&str> = params.split_whitespace().collect();
            if tokens.len() != KEY_COUNT + 1 {
                return Err(ParseError::ArityMismatch {
                    expected: KEY_COUNT + 1,
                    actual: tokens.len(),
                });
            }
            let time_ms = tokens[0]
                .parse::<u32>()
                .map_err(|_| ParseError::NotANumber(tokens[0].to_string()))?;
            Ok(Frame::Samples {
                time_ms,
                values: parse_values(&tokens[1..])?,
            })
        }
        't' => {
            let tokens: Vec<&str> = params.split_whitespace().collect();
            if tokens.len() != KEY_COUNT {
                return Err(ParseError::ArityMismatch {
                    expected: KEY_COUNT,
                    actual: tokens.len(),
                });
            }
            Ok(Frame::Thresholds {
                values: parse_values(&tokens)?,
            })
        }
        'd' => Ok(Frame::DebugFlag(parse_single_int(params)? != 0)),
        'h' => {
            let hz = parse_single_int(params)?;
            if hz < 0 {
                return Err(ParseError::NotANumber(params.to_string()));
            }
            Ok(Frame::Heartbeat { hz: hz as u32 })
        }
        // デバイスは素のバージョン番号を送る。表示形式（v接頭辞）に揃えて保持する
        'i' => Ok(Frame::Version(format!("v{}", params))),
        other => Err(ParseError::UnknownTag(other)),
    }
}

/// `p`/`r` のキー番号パラメータをパースする（範囲チェック付き）
fn parse_key_index(params: &str) -> Result<usize, ParseError> {
    let value = parse_single_int(params)?;
    if !(0..KEY_COUNT as i32).contains(&value) {
        return Err(ParseError::IndexOutOfRange(value));
    }
    Ok(value as usize)
}

/// パラメータ列がちょうど1個の整数であることを要求する
fn parse_single_int(params: &str) -> Result<i32, ParseError> {
    let tokens: Vec<&str> = params.split_whitespace().collect();
    if tokens.len() != 1 {
        return Err(ParseError::ArityMismatch {
            expected: 1,
            actual: tokens.len(),
        });
    }
    tokens[0]
        .parse::<i32>()
        .map_err(|_| ParseError::NotANumber(tokens[0].to_string()))
}

/// 固定長の整数列をパースする
fn parse_values(tokens: &[&str]) -> Result<[i32; KEY_COUNT], ParseError> {
    let mut values = [0i32; KEY_COUNT];
    for (slot, token) in values.iter_mut().zip(tokens) {
        *slot = token
            .parse::<i32>()
            .map_err(|_| ParseError::NotANumber(token.to_string()))?;
    }
    Ok(values)
}

/// ホスト→デバイス方向の制御コマンド
///
/// いずれも1行固定のコマンドで、同期的な応答は期待しない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// キャリブレーションを実行
    Calibrate,
    /// 現在の閾値をデバイスのEEPROMへ保存
    StoreCalibration,
    /// ライブデータ（デバッグ）モードをトグル
    ToggleDebug,
    /// ハートビート／サンプルレート問い合わせ
    Heartbeat,
    /// 1キー分の閾値をデバイスへ書き込む
    SetThreshold { index: usize, value: i32 },
}

impl DeviceCommand {
    /// ワイヤ形式（改行終端）にエンコードする
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Calibrate => b"c\n".to_vec(),
            Self::StoreCalibration => b"w\n".to_vec(),
            Self::ToggleDebug => b"d\n".to_vec(),
            Self::Heartbeat => b"h\n".to_vec(),
            Self::SetThreshold { index, value } => {
                format!("m{} {}\n", index, value).into_bytes()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_key_down() {
        assert_eq!(decode("p5"), Ok(Frame::KeyDown { index: 5 }));
        // ゼロ埋めも受理する
        assert_eq!(decode("p05"), Ok(Frame::KeyDown { index: 5 }));
        assert_eq!(decode("p 12"), Ok(Frame::KeyDown { index: 12 }));
    }

    #[test]
    fn test_decode_key_up() {
        assert_eq!(decode("r0"), Ok(Frame::KeyUp { index: 0 }));
        assert_eq!(decode("r19"), Ok(Frame::KeyUp { index: 19 }));
    }

    #[test]
    fn test_decode_index_out_of_range() {
        assert_eq!(decode("p25"), Err(ParseError::IndexOutOfRange(25)));
        assert_eq!(decode("r20"), Err(ParseError::IndexOutOfRange(20)));
        assert_eq!(decode("p-1"), Err(ParseError::IndexOutOfRange(-1)));
    }

    #[test]
    fn test_decode_thresholds() {
        let line = "t0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19";
        match decode(line) {
            Ok(Frame::Thresholds { values }) => {
                assert_eq!(values[0], 0);
                assert_eq!(values[3], 3);
                assert_eq!(values[19], 19);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_thresholds_arity_mismatch() {
        // 19個しかない
        let line = "t0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18";
        assert_eq!(
            decode(line),
            Err(ParseError::ArityMismatch {
                expected: 20,
                actual: 19
            })
        );
    }

    #[test]
    fn test_decode_samples() {
        let line = "v1234 512 513 514 515 516 517 518 519 520 521 522 523 524 525 526 527 528 529 530 531";
        match decode(line) {
            Ok(Frame::Samples { time_ms, values }) => {
                assert_eq!(time_ms, 1234);
                assert_eq!(values[0], 512);
                assert_eq!(values[19], 531);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_samples_not_a_number() {
        let line = "v1234 512 513 x 515 516 517 518 519 520 521 522 523 524 525 526 527 528 529 530 531";
        assert_eq!(decode(line), Err(ParseError::NotANumber("x".to_string())));
    }

    #[test]
    fn test_decode_debug_flag() {
        assert_eq!(decode("d0"), Ok(Frame::DebugFlag(false)));
        assert_eq!(decode("d1"), Ok(Frame::DebugFlag(true)));
        // 非ゼロはすべてtrue
        assert_eq!(decode("d42"), Ok(Frame::DebugFlag(true)));
    }

    #[test]
    fn test_decode_heartbeat() {
        assert_eq!(decode("h5"), Ok(Frame::Heartbeat { hz: 5 }));
        assert_eq!(decode("h1000"), Ok(Frame::Heartbeat { hz: 1000 }));
    }

    #[test]
    fn test_decode_version() {
        // デバイスは "1.2.3" を送り、フレームは表示形式 "v1.2.3" を持つ
        assert_eq!(decode("i1.2.3"), Ok(Frame::Version("v1.2.3".to_string())));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(decode("x"), Err(ParseError::UnknownTag('x')));
        assert_eq!(decode("q1 2 3"), Err(ParseError::UnknownTag('q')));
    }

    #[test]
    fn test_decode_empty_line() {
        assert_eq!(decode(""), Err(ParseError::Empty));
    }

    #[test]
    fn test_decode_garbage_params() {
        assert_eq!(decode("pabc"), Err(ParseError::NotANumber("abc".to_string())));
        assert_eq!(
            decode("p1 2"),
            Err(ParseError::ArityMismatch {
                expected: 1,
                actual: 2
            })
        );
        assert_eq!(decode("h"), Err(ParseError::ArityMismatch {
            expected: 1,
            actual: 0
        }));
    }

    #[test]
    fn test_encode_fixed_commands() {
        assert_eq!(DeviceCommand::Calibrate.encode(), b"c\n");
        assert_eq!(DeviceCommand::StoreCalibration.encode(), b"w\n");
        assert_eq!(DeviceCommand::ToggleDebug.encode(), b"d\n");
        assert_eq!(DeviceCommand::Heartbeat.encode(), b"h\n");
    }

    #[test]
    fn test_encode_set_threshold() {
        let cmd = DeviceCommand::SetThreshold {
            index: 3,
            value: 512,
        };
        assert_eq!(cmd.encode(), b"m3 512\n");
    }
}
