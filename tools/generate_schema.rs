//! JSON Schema + Markdown生成ツール
//!
//! src/domain/config.rsの設定構造から以下を自動生成します：
//! 1. JSON Schema (schema/config.json)
//! 2. Markdownドキュメント (CONFIGURATION.md)
//!
//! 実行方法:
//! ```
//! cargo run --bin generate_schema
//! ```

use pedal_bridge::domain::config::AppConfig;
use schemars::schema_for;
use serde_json::{Map, Value};
use std::fs;

fn main() {
    println!("JSON Schema + Markdown生成中...");

    // AppConfigからJSON Schemaを生成
    let schema = schema_for!(AppConfig);

    let json = serde_json::to_string_pretty(&schema).expect("Failed to serialize schema to JSON");

    fs::create_dir_all("schema").expect("Failed to create schema/ directory");
    fs::write("schema/config.json", json.clone()).expect("Failed to write schema/config.json");
    println!("  ✓ schema/config.json");

    let schema_value: Value =
        serde_json::from_str(&json).expect("Failed to parse generated schema");
    let markdown = generate_markdown(&schema_value);

    fs::write("CONFIGURATION.md", markdown).expect("Failed to write CONFIGURATION.md");
    println!("  ✓ CONFIGURATION.md");

    println!("✅ 生成完了: schema/config.json + CONFIGURATION.md");
}

/// JSON Schemaからマークダウンドキュメントを生成
fn generate_markdown(schema: &Value) -> String {
    let mut md = String::new();

    md.push_str("# 設定リファレンス (Configuration Reference)\n\n");
    md.push_str("`config.toml`は、pedal-bridgeの動作を制御する設定ファイルです。\n");
    md.push_str("実行ディレクトリに置くと読み込まれ、無い場合はデフォルト値で動作します。\n\n");
    md.push_str("⚠️ **注意**: このドキュメントは `cargo run --bin generate_schema` で自動生成されます。\n");
    md.push_str("説明を変更する場合は、`src/domain/config.rs`のdoc commentsを編集してください。\n\n");
    md.push_str("## 設定項目\n\n");

    let defs = schema
        .get("$defs")
        .and_then(|d| d.as_object())
        .cloned()
        .unwrap_or_default();

    if let Some(props) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, prop) in props {
            md.push_str(&format!("### [{}]\n\n", key));

            if let Some(desc) = prop.get("description").and_then(|d| d.as_str()) {
                md.push_str(&format!("{}\n\n", first_line(desc)));
            }

            if let Some(section) = resolve(prop, &defs) {
                push_table(&mut md, section, &defs);
            }
        }
    }

    md
}

/// $ref・配列要素を辿って実体のオブジェクトスキーマを得る
fn resolve<'a>(prop: &'a Value, defs: &'a Map<String, Value>) -> Option<&'a Value> {
    // [[devices]] のような配列セクションは要素スキーマを展開する
    if let Some(items) = prop.get("items") {
        return resolve(items, defs);
    }

    if let Some(ref_str) = prop.get("$ref").and_then(|r| r.as_str()) {
        let name = ref_str.strip_prefix("#/$defs/")?;
        return defs.get(name);
    }

    if prop.get("properties").is_some() {
        return Some(prop);
    }

    None
}

/// 1セクション分のプロパティ表を出力する
fn push_table(md: &mut String, section: &Value, defs: &Map<String, Value>) {
    let props = match section.get("properties").and_then(|p| p.as_object()) {
        Some(props) if !props.is_empty() => props,
        _ => return,
    };

    md.push_str("| 設定項目 | 型 | 説明 |\n");
    md.push_str("|---------|-----|---------|\n");

    for (key, prop) in props {
        let type_str = type_string(prop, defs).replace('|', "\\|");
        let desc = prop
            .get("description")
            .and_then(|d| d.as_str())
            .map(|d| d.replace('\n', " ").replace('|', "\\|"))
            .unwrap_or_else(|| "-".to_string());

        md.push_str(&format!("| `{}` | {} | {} |\n", key, type_str, desc));
    }
    md.push('\n');
}

/// 型を文字列で取得
fn type_string(prop: &Value, defs: &Map<String, Value>) -> String {
    if let Some(ref_str) = prop.get("$ref").and_then(|r| r.as_str()) {
        if let Some(name) = ref_str.strip_prefix("#/$defs/") {
            if defs.get(name).and_then(|d| d.get("enum")).is_some() {
                return "enum".to_string();
            }
            return name.to_string();
        }
    }

    match prop.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(" | "),
        _ => "unknown".to_string(),
    }
}

/// 説明の先頭行だけを取り出す
fn first_line(desc: &str) -> &str {
    desc.lines().next().unwrap_or(desc)
}
