//! 同期文法規則のコーデック
//!
//! このモジュールは、パイプ区切りの規則レコードのパースとシリアライズ、
//! およびスパン情報を除去した検索キーの導出を提供します。
//!
//! レコード形式は以下の通りです：
//!
//! ```text
//! LHS ||| srcRHS ||| tgtRHS [ ||| feature1=v1 feature2=v2 ... ]
//! ```

use std::fmt;

use crate::errors::{KazariError, Result};

/// 文法の開始記号
pub const START_SYMBOL: &str = "[S]";

/// 未知語（OOV）を表すセンチネルトークン
pub const OOV_TOKEN: &str = "<unk>";

/// 規則のRHSを構成するトークン
///
/// 終端記号（語）または角括弧で囲まれた非終端記号のいずれかです。
/// 非終端記号の内部テキストは入力形式によって異なります。
/// スパン付き入力では `NP_2_4` のようなスパン注釈、
/// 整列済み入力では `X,1` のような整列インデックスを持ちます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// 終端記号（語）
    Terminal(String),
    /// 非終端記号（角括弧の内部テキストを保持）
    Nonterminal(String),
}

impl Token {
    /// 空白区切りの1トークンをパースします。
    ///
    /// `[` で始まり `]` で終わるトークンを非終端記号として扱います。
    ///
    /// # 引数
    ///
    /// * `tok` - パース対象のトークン文字列
    ///
    /// # 戻り値
    ///
    /// パースされたトークン
    pub fn parse(tok: &str) -> Self {
        if tok.len() >= 2 && tok.starts_with('[') && tok.ends_with(']') {
            Self::Nonterminal(tok[1..tok.len() - 1].to_string())
        } else {
            Self::Terminal(tok.to_string())
        }
    }

    /// 非終端記号かどうかを返します。
    pub fn is_nonterminal(&self) -> bool {
        matches!(self, Self::Nonterminal(_))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Terminal(w) => write!(f, "{w}"),
            Self::Nonterminal(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// 規則に付与される素性
///
/// 通常は `name=value` の形式ですが、開始記号規則のゼロマーカーのように
/// 値を持たない素性も存在します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    /// 素性名
    pub name: String,
    /// 素性値（テキスト表現のまま保持）
    pub value: Option<String>,
}

impl Feature {
    /// 名前と値から素性を作成します。
    pub fn new<N, V>(name: N, value: V) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// 値を持たない素性を作成します。
    pub fn bare<N>(name: N) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            value: None,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}={}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// スパン情報に依存しない規則の同一性を表すキー
///
/// 非終端記号は原言語側の初出順に1から振り直されており、
/// スパン注釈のみが異なる規則インスタンスは同一のキーに収束します。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey {
    /// 左辺の非終端記号ラベル
    pub lhs: String,
    /// 正規化された原言語側RHS
    pub src: String,
    /// 正規化された目的言語側RHS
    pub tgt: String,
}

/// キー導出の結果
///
/// キー本体と、原言語側に終端記号が1つも無いことを示すフラグの組です。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    /// 導出されたキー
    pub key: RuleKey,
    /// 原言語側が非終端記号のみで構成される場合に真
    ///
    /// この場合、頻度素性と語彙素性の計算対象から除外されます。
    pub no_lex: bool,
}

/// 同期文法規則
///
/// 1行の規則レコードをパースして得られる構造体です。
/// パイプラインの各段階で素性が追記され、最終的にレコード形式で
/// シリアライズされます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// 左辺の非終端記号ラベル
    pub lhs: String,
    /// 原言語側RHSのトークン列
    pub src: Vec<Token>,
    /// 目的言語側RHSのトークン列
    pub tgt: Vec<Token>,
    /// 素性のリスト（挿入順を保持）
    pub features: Vec<Feature>,
}

impl Rule {
    /// 1行の規則レコードをパースします。
    ///
    /// レコードは最低3つのパイプ区切りフィールド（LHS、原言語側RHS、
    /// 目的言語側RHS）を持つ必要があり、4番目のフィールドとして
    /// 素性文字列を持つことができます。
    ///
    /// # 引数
    ///
    /// * `line` - パース対象のレコード行
    ///
    /// # 戻り値
    ///
    /// パースされた規則
    ///
    /// # エラー
    ///
    /// フィールドが3つ未満の場合、および両側の非終端記号の数が一致しない
    /// 場合、[`KazariError::MalformedRecord`]を返します。
    pub fn from_record(line: &str) -> Result<Self> {
        let line = line.trim();
        let fields: Vec<&str> = line.split("|||").map(str::trim).collect();
        if fields.len() < 3 {
            return Err(KazariError::malformed_record(
                "a rule record requires at least 3 pipe-delimited fields",
                line,
            ));
        }
        let features = fields
            .get(3)
            .map(|s| parse_features(s))
            .unwrap_or_default();
        let src = tokenize(fields[1]);
        let tgt = tokenize(fields[2]);
        let count_nts = |toks: &[Token]| toks.iter().filter(|t| t.is_nonterminal()).count();
        if count_nts(&src) != count_nts(&tgt) {
            return Err(KazariError::malformed_record(
                "the numbers of source and target nonterminals mismatch",
                line,
            ));
        }
        Ok(Self {
            lhs: fields[0].to_string(),
            src,
            tgt,
            features,
        })
    }

    /// 原言語側RHSのテキスト表現を返します。
    pub fn src_text(&self) -> String {
        join_tokens(&self.src)
    }

    /// 目的言語側RHSのテキスト表現を返します。
    pub fn tgt_text(&self) -> String {
        join_tokens(&self.tgt)
    }

    /// 原言語側の終端記号のみを返します。
    ///
    /// 語彙素性のスコアリング入力を構築するために使用されます。
    pub fn src_terminals(&self) -> Vec<&str> {
        strip_nonterminals(&self.src)
    }

    /// 目的言語側の終端記号のみを返します。
    pub fn tgt_terminals(&self) -> Vec<&str> {
        strip_nonterminals(&self.tgt)
    }

    /// 指定された名前の素性が既に付与されているかを返します。
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.iter().any(|f| f.name == name)
    }

    /// 素性を末尾に追記します。
    pub fn push_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// スパン情報に依存しない検索キーを導出します。
    ///
    /// `span_aware` が真の場合、LHSと両側RHSからスパン固有の注釈を
    /// 除去します。原言語側の非終端記号は初出順に `[X,1]`, `[X,2]`, ...
    /// と振り直され、目的言語側の整列インデックスは `[X,k]` の形式に
    /// 正規化されます。`span_aware` が偽の場合、元のフィールドが
    /// そのままキーになります。
    ///
    /// いずれの場合も、正規化後の原言語側RHSがOOVセンチネルに等しい
    /// ときは、キーの原言語側を目的言語側のテキストで置き換えます
    /// （未知語は両側にそのまま持ち越されているため）。
    ///
    /// # 引数
    ///
    /// * `span_aware` - スパン注釈付き（周辺確率付き）入力かどうか
    ///
    /// # 戻り値
    ///
    /// 導出されたキーと `no_lex` フラグの組
    pub fn derive_key(&self, span_aware: bool) -> DerivedKey {
        if !span_aware {
            let src = self.src_text();
            let tgt = self.tgt_text();
            let src = if src == OOV_TOKEN { tgt.clone() } else { src };
            return DerivedKey {
                key: RuleKey {
                    lhs: self.lhs.clone(),
                    src,
                    tgt,
                },
                no_lex: false,
            };
        }

        let lhs = if self.lhs == START_SYMBOL {
            self.lhs.clone()
        } else {
            match self.lhs.split_once('_') {
                Some((head, _)) => format!("{head}]"),
                None => self.lhs.clone(),
            }
        };

        let mut nt_count = 0;
        let mut src_parts = Vec::with_capacity(self.src.len());
        for tok in &self.src {
            match tok {
                Token::Nonterminal(_) => {
                    nt_count += 1;
                    src_parts.push(format!("[X,{nt_count}]"));
                }
                Token::Terminal(w) => src_parts.push(w.clone()),
            }
        }
        let no_lex = nt_count == self.src.len();

        let mut tgt_parts = Vec::with_capacity(self.tgt.len());
        for tok in &self.tgt {
            match tok {
                Token::Nonterminal(inner) => {
                    // Keep only the alignment index so that deriving a key
                    // from an already-normalized rule is a fixed point.
                    let idx = match inner.rsplit_once(',') {
                        Some((_, idx)) => idx,
                        None => inner.as_str(),
                    };
                    tgt_parts.push(format!("[X,{idx}]"));
                }
                Token::Terminal(w) => tgt_parts.push(w.clone()),
            }
        }

        let src = src_parts.join(" ");
        let tgt = tgt_parts.join(" ");
        let src = if src == OOV_TOKEN { tgt.clone() } else { src };
        DerivedKey {
            key: RuleKey { lhs, src, tgt },
            no_lex,
        }
    }

    /// 目的言語側の非終端記号の整列インデックスを返します。
    ///
    /// スパン注釈付き入力では非終端記号は `[k]` の形式でインデックスを
    /// 直接持ち、整列済み入力では `[X,k]` の形式でカンマの後に持ちます。
    ///
    /// # 引数
    ///
    /// * `span_aware` - スパン注釈付き入力かどうか
    ///
    /// # 戻り値
    ///
    /// 出現順の整列インデックスのベクトル
    ///
    /// # エラー
    ///
    /// インデックスが整数としてパースできない場合、または整列済み形式で
    /// カンマ区切りのインデックスを欠いている場合はエラーを返します。
    pub fn target_nt_indices(&self, span_aware: bool) -> Result<Vec<u32>> {
        let mut indices = vec![];
        for tok in &self.tgt {
            if let Token::Nonterminal(inner) = tok {
                let idx = if span_aware {
                    inner.trim().parse::<u32>()?
                } else {
                    let (_, idx) = inner.split_once(',').ok_or_else(|| {
                        KazariError::malformed_record(
                            "a target nonterminal lacks an alignment index",
                            format!("[{inner}]"),
                        )
                    })?;
                    idx.trim().parse::<u32>()?
                };
                indices.push(idx);
            }
        }
        Ok(indices)
    }
}

impl fmt::Display for Rule {
    /// 規則をレコード形式でシリアライズします。
    ///
    /// 素性フィールドは常に出力されます（素性が無い場合は空になります）。
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} ||| {} ||| {} |||",
            self.lhs,
            self.src_text(),
            self.tgt_text()
        )?;
        for feat in &self.features {
            write!(f, " {feat}")?;
        }
        Ok(())
    }
}

/// 空白区切りのフレーズをトークン列にパースします。
fn tokenize(phrase: &str) -> Vec<Token> {
    phrase.split_whitespace().map(Token::parse).collect()
}

/// トークン列をテキスト表現に連結します。
fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        if i != 0 {
            out.push(' ');
        }
        out.push_str(&tok.to_string());
    }
    out
}

/// トークン列から終端記号のみを抽出します。
fn strip_nonterminals(tokens: &[Token]) -> Vec<&str> {
    tokens
        .iter()
        .filter_map(|tok| match tok {
            Token::Terminal(w) => Some(w.as_str()),
            Token::Nonterminal(_) => None,
        })
        .collect()
}

/// 空白区切りの素性文字列をパースします。
fn parse_features(field: &str) -> Vec<Feature> {
    field
        .split_whitespace()
        .map(|pair| match pair.split_once('=') {
            Some((name, value)) => Feature::new(name, value),
            None => Feature::bare(pair),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let rule = Rule::from_record("[X] ||| the [X,1] ||| le [1] ||| Marginal=0.5").unwrap();
        assert_eq!("[X]", rule.lhs);
        assert_eq!(
            vec![
                Token::Terminal("the".to_string()),
                Token::Nonterminal("X,1".to_string())
            ],
            rule.src
        );
        assert_eq!(
            vec![
                Token::Terminal("le".to_string()),
                Token::Nonterminal("1".to_string())
            ],
            rule.tgt
        );
        assert_eq!(vec![Feature::new("Marginal", "0.5")], rule.features);
    }

    #[test]
    fn test_parse_record_trailing_empty_features() {
        let rule = Rule::from_record("[X] ||| the [X,1] ||| le [1] ||| \n").unwrap();
        assert!(rule.features.is_empty());
        assert_eq!("[X] ||| the [X,1] ||| le [1] |||", rule.to_string());
    }

    #[test]
    fn test_parse_record_three_fields() {
        let rule = Rule::from_record("[X] ||| chat ||| cat").unwrap();
        assert!(rule.features.is_empty());
        assert_eq!("chat", rule.src_text());
    }

    #[test]
    fn test_parse_record_too_few_fields() {
        let err = Rule::from_record("[X] ||| chat").unwrap_err();
        assert!(matches!(err, KazariError::MalformedRecord(_)));
    }

    #[test]
    fn test_parse_record_nonterminal_mismatch() {
        let err = Rule::from_record("[X] ||| the [X,1] ||| le |||").unwrap_err();
        assert!(matches!(err, KazariError::MalformedRecord(_)));
    }

    #[test]
    fn test_display_preserves_features() {
        let line = "[X] ||| the [X,1] ||| le [1] ||| EgivenF=-0.0 IsSingletonF=1";
        let rule = Rule::from_record(line).unwrap();
        assert_eq!(line, rule.to_string());
    }

    #[test]
    fn test_derive_key_span_aware() {
        let rule =
            Rule::from_record("[NP_2_5] ||| der [A_2_3] haus [B_4_5] ||| the [2] house [1] |||")
                .unwrap();
        let derived = rule.derive_key(true);
        assert_eq!("[NP]", derived.key.lhs);
        assert_eq!("der [X,1] haus [X,2]", derived.key.src);
        assert_eq!("the [X,2] house [X,1]", derived.key.tgt);
        assert!(!derived.no_lex);
    }

    #[test]
    fn test_derive_key_idempotent() {
        let rule =
            Rule::from_record("[X_0_4] ||| a [B_1_2] b [C_3_4] ||| x [2] y [1] |||").unwrap();
        let first = rule.derive_key(true);
        let normalized = Rule::from_record(&format!(
            "{} ||| {} ||| {} |||",
            first.key.lhs, first.key.src, first.key.tgt
        ))
        .unwrap();
        let second = normalized.derive_key(true);
        assert_eq!(first.key, second.key);
    }

    #[test]
    fn test_derive_key_no_lex() {
        let rule = Rule::from_record("[X_0_2] ||| [A_0_1] [B_1_2] ||| [2] [1] |||").unwrap();
        let derived = rule.derive_key(true);
        assert!(derived.no_lex);
        assert_eq!("[X,1] [X,2]", derived.key.src);
    }

    #[test]
    fn test_derive_key_oov_substitution() {
        let rule = Rule::from_record("[X_1_2] ||| <unk> ||| tokyo |||").unwrap();
        let derived = rule.derive_key(true);
        assert_eq!("tokyo", derived.key.src);
        assert_eq!("tokyo", derived.key.tgt);
    }

    #[test]
    fn test_derive_key_raw_mode() {
        let rule = Rule::from_record("[X] ||| the [X,1] ||| le [1] |||").unwrap();
        let derived = rule.derive_key(false);
        assert_eq!("the [X,1]", derived.key.src);
        assert_eq!("le [1]", derived.key.tgt);
        assert!(!derived.no_lex);
    }

    #[test]
    fn test_strip_nonterminals() {
        let rule =
            Rule::from_record("[X] ||| the [X,1] big dog ||| le [1] grand chien |||").unwrap();
        assert_eq!(vec!["the", "big", "dog"], rule.src_terminals());
        assert_eq!(vec!["le", "grand", "chien"], rule.tgt_terminals());
    }

    #[test]
    fn test_target_nt_indices() {
        let aligned = Rule::from_record("[X] ||| a [X,1] b [X,2] ||| [X,2] c [X,1] |||").unwrap();
        assert_eq!(vec![2, 1], aligned.target_nt_indices(false).unwrap());

        let marginal = Rule::from_record("[X_0_2] ||| [A_0_1] [B_1_2] ||| [2] [1] |||").unwrap();
        assert_eq!(vec![2, 1], marginal.target_nt_indices(true).unwrap());
    }

    #[test]
    fn test_target_nt_indices_missing_alignment() {
        let rule = Rule::from_record("[X] ||| a [X,1] ||| [1] |||").unwrap();
        assert!(rule.target_nt_indices(false).is_err());
    }
}
