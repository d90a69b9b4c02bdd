//! 素性計算
//!
//! このモジュールは、規則キーに対する頻度ベースの素性、規則の形状に
//! 基づく素性、および語彙翻訳素性の計算を提供します。
//! 実数値の素性は小数点以下11桁の固定小数点形式で出力されます。

use crate::bilex::{BiLex, MAX_SCORE};
use crate::counts::{CountTable, SourceKey};
use crate::rule::{Feature, Rule, RuleKey, START_SYMBOL};

/// 翻訳確率素性の名前
pub const FEAT_E_GIVEN_F: &str = "EgivenF";
/// サンプルサイズ素性の名前
pub const FEAT_SAMPLE_COUNT_F: &str = "SampleCountF";
/// 結合頻度素性の名前
pub const FEAT_COUNT_EF: &str = "CountEF";
/// 原言語側単独出現素性の名前
pub const FEAT_IS_SINGLETON_F: &str = "IsSingletonF";
/// 規則ペア単独出現素性の名前
pub const FEAT_IS_SINGLETON_FE: &str = "IsSingletonFE";
/// 語彙翻訳素性（P(f|e)方向）の名前
pub const FEAT_MAX_LEX_F_GIVEN_E: &str = "MaxLexFgivenE";
/// 語彙翻訳素性（P(e|f)方向）の名前
pub const FEAT_MAX_LEX_E_GIVEN_F: &str = "MaxLexEgivenF";

/// 実数値の素性を小数点以下11桁で書式化します。
pub fn format_score(value: f64) -> String {
    format!("{value:.11}")
}

/// 規則キーに対する頻度ベースの素性を計算します。
///
/// キーが頻度テーブルに存在する場合、以下の素性を順に返します：
///
/// - `EgivenF = -log10(jointCount / normalizer)`（比が1のときは
///   符号規約を保つためリテラル `-0.0`）
/// - `SampleCountF`: 正規化項の対数（スムージング時は選択肢数を加算）
/// - `CountEF`: 結合頻度の対数（スムージング時は1を加算）
/// - `IsSingletonF`: 正規化項が1のとき1
/// - `IsSingletonFE`: 結合頻度が1のとき1
///
/// キーがテーブルに存在しない場合は空のベクトルを返します。
/// これはエラーではなく、規則がコーパス頻度の範囲で観測されなかった
/// ことを意味します。
///
/// # 引数
///
/// * `counts` - 結合頻度テーブル
/// * `key` - 正規化済みの規則キー
/// * `add_one` - 加算スムージングを有効にするかどうか
///
/// # 戻り値
///
/// 計算された素性のベクトル
pub fn count_features(counts: &CountTable, key: &RuleKey, add_one: bool) -> Vec<Feature> {
    let source = SourceKey::new(key.lhs.clone(), key.src.clone());
    let Some(alternatives) = counts.alternatives(&source) else {
        return vec![];
    };
    let Some(&joint_count) = alternatives.get(&key.tgt) else {
        return vec![];
    };

    let normalizer: u64 = alternatives.values().sum();
    let num_alternatives = alternatives.len() as u64;

    let mut features = Vec::with_capacity(5);

    let e_given_f = -((joint_count as f64 / normalizer as f64).log10());
    if e_given_f == 0.0 {
        features.push(Feature::new(FEAT_E_GIVEN_F, "-0.0"));
    } else {
        features.push(Feature::new(FEAT_E_GIVEN_F, format_score(e_given_f)));
    }

    let sample_count_f = if add_one {
        ((normalizer + num_alternatives) as f64).log10()
    } else {
        (normalizer as f64).log10()
    };
    features.push(Feature::new(
        FEAT_SAMPLE_COUNT_F,
        format_score(sample_count_f),
    ));

    let count_ef = if add_one {
        ((joint_count + 1) as f64).log10()
    } else {
        (joint_count as f64).log10()
    };
    features.push(Feature::new(FEAT_COUNT_EF, format_score(count_ef)));

    let is_singleton_f = u8::from(normalizer == 1);
    features.push(Feature::new(FEAT_IS_SINGLETON_F, is_singleton_f.to_string()));
    let is_singleton_fe = u8::from(joint_count == 1);
    features.push(Feature::new(
        FEAT_IS_SINGLETON_FE,
        is_singleton_fe.to_string(),
    ));

    features
}

/// 未知語の逐語コピー規則を表す素性を返します。
pub fn pass_through_feature() -> Feature {
    Feature::new("PassThrough", "1")
}

/// 語彙内容を持たない構造規則を表す素性を返します。
pub fn glue_feature() -> Feature {
    Feature::new("Glue", "1.0")
}

/// 非単調な並べ替えを表す素性を計算します。
///
/// 規則が整列済みの非終端記号をちょうど2つ持ち、目的言語側での
/// 出現順が原言語側での順序を反転している場合に `Inverse=1.0` を
/// 返します。
///
/// # 引数
///
/// * `rule` - 対象の規則
/// * `span_aware` - スパン注釈付き入力かどうか
///
/// # 戻り値
///
/// 反転している場合は素性、そうでなければ `None`
///
/// # エラー
///
/// 目的言語側の非終端記号の整列インデックスがパースできない場合は
/// エラーを返します。
pub fn inverse_feature(rule: &Rule, span_aware: bool) -> crate::errors::Result<Option<Feature>> {
    let indices = rule.target_nt_indices(span_aware)?;
    if indices.len() == 2 && indices[0] > indices[1] {
        Ok(Some(Feature::new("Inverse", "1.0")))
    } else {
        Ok(None)
    }
}

/// 規則のバッチに語彙翻訳素性を付与します。
///
/// 各規則について、非終端記号を除いた語のリストに対する双方向の
/// 最大語彙翻訳スコアを計算し、上限値未満かつ対応する語リストが
/// 空でない場合にのみ素性として付与します。
///
/// 開始記号の規則はスコアリングせず、既にいずれかの語彙素性を持つ
/// 規則もそのまま通過させます（再装飾に対して冪等です）。
///
/// # 引数
///
/// * `bilex` - 語彙翻訳確率テーブル
/// * `rules` - 装飾対象の規則のバッチ
pub fn attach_lexical_features(bilex: &BiLex, rules: &mut [Rule]) {
    for rule in rules.iter_mut() {
        if rule.lhs == START_SYMBOL {
            continue;
        }
        if rule.has_feature(FEAT_MAX_LEX_E_GIVEN_F) || rule.has_feature(FEAT_MAX_LEX_F_GIVEN_E) {
            continue;
        }
        let (f_given_e, e_given_f) = {
            let fwords = rule.src_terminals();
            let ewords = rule.tgt_terminals();
            (
                (!fwords.is_empty()).then(|| bilex.max_lex_f_given_e(&fwords, &ewords)),
                (!ewords.is_empty()).then(|| bilex.max_lex_e_given_f(&fwords, &ewords)),
            )
        };
        if let Some(f_given_e) = f_given_e {
            if f_given_e < MAX_SCORE {
                rule.push_feature(Feature::new(
                    FEAT_MAX_LEX_F_GIVEN_E,
                    format_score(f_given_e),
                ));
            }
        }
        if let Some(e_given_f) = e_given_f {
            if e_given_f < MAX_SCORE {
                rule.push_feature(Feature::new(
                    FEAT_MAX_LEX_E_GIVEN_F,
                    format_score(e_given_f),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::count_table;

    fn feature_text(features: &[Feature]) -> String {
        features
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_count_features_worked_example() {
        let counts = count_table! {
            ("[X]", "the [X,1]") => { "le [1]" => 8, "la [1]" => 2 },
        };
        let key = RuleKey {
            lhs: "[X]".to_string(),
            src: "the [X,1]".to_string(),
            tgt: "le [1]".to_string(),
        };
        let features = count_features(&counts, &key, false);
        assert_eq!(
            "EgivenF=0.09691001301 SampleCountF=1.00000000000 CountEF=0.90308998699 \
             IsSingletonF=0 IsSingletonFE=0",
            feature_text(&features)
        );
    }

    #[test]
    fn test_count_features_add_one_smoothing() {
        let counts = count_table! {
            ("[X]", "the [X,1]") => { "le [1]" => 8, "la [1]" => 2 },
        };
        let key = RuleKey {
            lhs: "[X]".to_string(),
            src: "the [X,1]".to_string(),
            tgt: "le [1]".to_string(),
        };
        let features = count_features(&counts, &key, true);
        // log10(10 + 2) and log10(8 + 1).
        assert_eq!(
            "EgivenF=0.09691001301 SampleCountF=1.07918124605 CountEF=0.95424250944 \
             IsSingletonF=0 IsSingletonFE=0",
            feature_text(&features)
        );
    }

    #[test]
    fn test_count_features_negative_zero_convention() {
        let counts = count_table! {
            ("[X]", "dog") => { "chien" => 4 },
        };
        let key = RuleKey {
            lhs: "[X]".to_string(),
            src: "dog".to_string(),
            tgt: "chien".to_string(),
        };
        let features = count_features(&counts, &key, false);
        assert_eq!("EgivenF", features[0].name);
        assert_eq!(Some("-0.0".to_string()), features[0].value);
    }

    #[test]
    fn test_count_features_singletons() {
        let counts = count_table! {
            ("[X]", "dog") => { "chien" => 1 },
        };
        let key = RuleKey {
            lhs: "[X]".to_string(),
            src: "dog".to_string(),
            tgt: "chien".to_string(),
        };
        let features = count_features(&counts, &key, false);
        assert_eq!(
            "EgivenF=-0.0 SampleCountF=0.00000000000 CountEF=0.00000000000 \
             IsSingletonF=1 IsSingletonFE=1",
            feature_text(&features)
        );
    }

    #[test]
    fn test_count_features_unknown_key() {
        let counts = count_table! {
            ("[X]", "dog") => { "chien" => 1 },
        };
        let key = RuleKey {
            lhs: "[X]".to_string(),
            src: "cat".to_string(),
            tgt: "chat".to_string(),
        };
        assert!(count_features(&counts, &key, false).is_empty());
    }

    #[test]
    fn test_inverse_feature() {
        let swapped =
            Rule::from_record("[X] ||| a [X,1] b [X,2] ||| [X,2] [X,1] |||").unwrap();
        assert!(inverse_feature(&swapped, false).unwrap().is_some());

        let monotone =
            Rule::from_record("[X] ||| a [X,1] b [X,2] ||| [X,1] [X,2] |||").unwrap();
        assert!(inverse_feature(&monotone, false).unwrap().is_none());

        // A single nonterminal can never invert.
        let unary = Rule::from_record("[X] ||| a [X,1] ||| [X,1] b |||").unwrap();
        assert!(inverse_feature(&unary, false).unwrap().is_none());
    }

    #[test]
    fn test_attach_lexical_features() {
        let mut bilex = BiLex::new();
        bilex.insert("chien", "dog", 0.5, 0.25);
        let mut rules = vec![Rule::from_record("[X] ||| chien ||| dog |||").unwrap()];
        attach_lexical_features(&bilex, &mut rules);
        assert_eq!(
            "[X] ||| chien ||| dog ||| MaxLexFgivenE=0.60205999133 MaxLexEgivenF=0.30102999566",
            rules[0].to_string()
        );
    }

    #[test]
    fn test_attach_lexical_features_is_idempotent() {
        let mut bilex = BiLex::new();
        bilex.insert("chien", "dog", 0.5, 0.25);
        let mut rules = vec![Rule::from_record("[X] ||| chien ||| dog |||").unwrap()];
        attach_lexical_features(&bilex, &mut rules);
        let first = rules[0].to_string();
        attach_lexical_features(&bilex, &mut rules);
        assert_eq!(first, rules[0].to_string());
    }

    #[test]
    fn test_attach_lexical_features_suppresses_ceiling() {
        let bilex = BiLex::new();
        let mut rules = vec![Rule::from_record("[X] ||| inconnu ||| unknown |||").unwrap()];
        attach_lexical_features(&bilex, &mut rules);
        // Both totals hit the ceiling and are suppressed entirely.
        assert_eq!("[X] ||| inconnu ||| unknown |||", rules[0].to_string());
    }

    #[test]
    fn test_attach_lexical_features_skips_start_symbol() {
        let mut bilex = BiLex::new();
        bilex.insert("chien", "dog", 0.5, 0.25);
        let mut rules = vec![Rule::from_record("[S] ||| chien ||| dog |||").unwrap()];
        attach_lexical_features(&bilex, &mut rules);
        assert_eq!("[S] ||| chien ||| dog |||", rules[0].to_string());
    }

    #[test]
    fn test_attach_lexical_features_skips_nonterminal_only_source() {
        let mut bilex = BiLex::new();
        bilex.insert("NULL", "dog", 0.5, 0.0);
        let mut rules =
            vec![Rule::from_record("[X] ||| [X,1] [X,2] ||| [X,2] dog [X,1] |||").unwrap()];
        attach_lexical_features(&bilex, &mut rules);
        // No source words, so only the target-side feature can be emitted.
        assert_eq!(
            "[X] ||| [X,1] [X,2] ||| [X,2] dog [X,1] ||| MaxLexEgivenF=0.30102999566",
            rules[0].to_string()
        );
    }
}
