//! # kazari
//!
//! 同期文脈自由文法の規則に翻訳素性を付与するライブラリです。
//! 規則抽出器が出力した文法ファイルを入力とし、結合頻度に基づく
//! 確率素性、語彙翻訳スコア、および規則の形状を示すマーカー素性を
//! 各レコードに付与します。
//!
//! ## 例
//!
//! ```
//! use kazari::{CountTable, Rule};
//!
//! let mut counts = CountTable::new();
//! counts.add("[X]", "the [X,1]", "le [1]", 8);
//! counts.add("[X]", "the [X,1]", "la [1]", 2);
//!
//! let mut rule = Rule::from_record("[X] ||| the [X,1] ||| le [1] |||").unwrap();
//! let derived = rule.derive_key(false);
//! for feature in kazari::featurize::count_features(&counts, &derived.key, false) {
//!     rule.push_feature(feature);
//! }
//! assert!(rule.to_string().contains("EgivenF=0.09691001301"));
//! ```

pub mod bilex;
mod common;
pub mod counts;
pub mod decorator;
pub mod errors;
pub mod featurize;
pub mod rule;

#[cfg(test)]
mod test_utils;

pub use bilex::BiLex;
pub use counts::CountTable;
pub use decorator::{Decorator, DecoratorOptions, Pipeline, RunSummary};
pub use errors::{KazariError, Result};
pub use rule::{Feature, Rule};

/// このライブラリのバージョン
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
