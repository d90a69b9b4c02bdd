//! 双方向の語彙翻訳確率テーブル
//!
//! このモジュールは、事前学習された語ペアの翻訳確率テーブルと、
//! 規則の語彙内容に対する最大語彙翻訳スコアの計算を提供します。
//! テーブルは素性計算の前に一度だけロードされ、変更されません。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, Read, Write};
use std::path::Path;

use bincode::{Decode, Encode};

use crate::common;
use crate::errors::{KazariError, Result};

/// 語彙翻訳モデルファイルのマジックナンバー
pub const BILEX_MAGIC: &[u8] = b"KazariBiLex 0.2\n";

/// 空整列を表すセンチネル語
///
/// どの語とも整列しなかった場合のスコアリングに使用され、
/// テーブル内で常に有効なキーです。
pub const NULL_WORD: &str = "NULL";

/// スコア不能な語ペアに代入されるペナルティの上限値
///
/// テーブルに項目が無い語ペアの `-log10(0)` の代わりに使用されます。
/// 合計スコアがこの値に達した素性は信頼できないものとして
/// 出力から抑制されます。
pub const MAX_SCORE: f64 = 99.0;

/// 翻訳確率の方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// P(e|f): 原言語の語が与えられたときの目的言語の語の確率
    EGivenF,
    /// P(f|e): 目的言語の語が与えられたときの原言語の語の確率
    FGivenE,
}

/// 語ペアの双方向確率
#[derive(Debug, Clone, Copy, Default, Encode, Decode)]
struct LexProb {
    e_given_f: f64,
    f_given_e: f64,
}

/// 双方向の語彙翻訳確率テーブル
///
/// 原言語の語をキーとする2段の写像で、各語ペアに対して
/// 両方向の確率を保持します。
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct BiLex {
    table: HashMap<String, HashMap<String, LexProb>>,
}

impl BiLex {
    /// 空のテーブルを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// テーブルが空かどうかを返します。
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 語ペアの両方向確率を登録します。
    ///
    /// # 引数
    ///
    /// * `f` - 原言語の語
    /// * `e` - 目的言語の語
    /// * `e_given_f` - P(e|f)
    /// * `f_given_e` - P(f|e)
    pub fn insert<F, E>(&mut self, f: F, e: E, e_given_f: f64, f_given_e: f64)
    where
        F: Into<String>,
        E: Into<String>,
    {
        self.table.entry(f.into()).or_default().insert(
            e.into(),
            LexProb {
                e_given_f,
                f_given_e,
            },
        );
    }

    /// 語ペアの確率を返します。
    ///
    /// # 引数
    ///
    /// * `f` - 原言語の語
    /// * `e` - 目的言語の語
    /// * `direction` - 確率の方向
    ///
    /// # 戻り値
    ///
    /// テーブルに項目があればその確率、無ければ `0.0`
    pub fn score(&self, f: &str, e: &str, direction: Direction) -> f64 {
        self.table
            .get(f)
            .and_then(|inner| inner.get(e))
            .map_or(0.0, |p| match direction {
                Direction::EGivenF => p.e_given_f,
                Direction::FGivenE => p.f_given_e,
            })
    }

    /// 各目的言語の語を最良の原言語の語でスコアリングした合計を返します。
    ///
    /// 目的言語の各語 `e` について、原言語の語集合（`NULL` を含む）の
    /// 中で最大の P(e|f) を求め、その `-log10` を合計します。
    /// 最大値が0（テーブルに項目なし）の語には [`MAX_SCORE`] を加算します。
    ///
    /// # 引数
    ///
    /// * `fwords` - 原言語側の終端記号
    /// * `ewords` - 目的言語側の終端記号
    ///
    /// # 戻り値
    ///
    /// 合計スコア
    pub fn max_lex_e_given_f(&self, fwords: &[&str], ewords: &[&str]) -> f64 {
        let mut total = 0.0;
        for &e in ewords {
            let best = fwords
                .iter()
                .copied()
                .chain(std::iter::once(NULL_WORD))
                .map(|f| self.score(f, e, Direction::EGivenF))
                .fold(0.0_f64, f64::max);
            total += if best > 0.0 { -best.log10() } else { MAX_SCORE };
        }
        total
    }

    /// 各原言語の語を最良の目的言語の語でスコアリングした合計を返します。
    ///
    /// [`max_lex_e_given_f`](Self::max_lex_e_given_f) の対称形で、
    /// 原言語の各語を目的言語の語集合（`NULL` を含む）に対して
    /// 逆方向のテーブルでスコアリングします。
    ///
    /// # 引数
    ///
    /// * `fwords` - 原言語側の終端記号
    /// * `ewords` - 目的言語側の終端記号
    ///
    /// # 戻り値
    ///
    /// 合計スコア
    pub fn max_lex_f_given_e(&self, fwords: &[&str], ewords: &[&str]) -> f64 {
        let mut total = 0.0;
        for &f in fwords {
            let best = ewords
                .iter()
                .copied()
                .chain(std::iter::once(NULL_WORD))
                .map(|e| self.score(f, e, Direction::FGivenE))
                .fold(0.0_f64, f64::max);
            total += if best > 0.0 { -best.log10() } else { MAX_SCORE };
        }
        total
    }

    /// テキスト形式の語ペアレコードからテーブルを構築します。
    ///
    /// 各行は空白区切りの `fword eword P(e|f) P(f|e)` の形式です。
    /// 空行は無視されます。
    ///
    /// # 引数
    ///
    /// * `rdr` - 語ペアレコードのリーダー
    ///
    /// # 戻り値
    ///
    /// 構築されたテーブル
    ///
    /// # エラー
    ///
    /// フィールド数が不足している場合や確率が実数としてパースできない
    /// 場合はエラーを返します。
    pub fn from_reader<R>(rdr: R) -> Result<Self>
    where
        R: BufRead,
    {
        let mut table = Self::new();
        for line in rdr.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return Err(KazariError::malformed_record(
                    "a bilexical record requires 4 whitespace-delimited fields",
                    line,
                ));
            }
            let e_given_f = fields[2].parse::<f64>()?;
            let f_given_e = fields[3].parse::<f64>()?;
            table.insert(fields[0], fields[1], e_given_f, f_given_e);
        }
        Ok(table)
    }

    /// バイナリ形式のテーブルを読み込みます。
    ///
    /// # エラー
    ///
    /// bincodeがエラーを生成した場合、そのエラーがそのまま返されます。
    /// また、マジックナンバーが一致しない場合もエラーが返されます。
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut magic = [0; BILEX_MAGIC.len()];
        rdr.read_exact(&mut magic)?;
        if magic != BILEX_MAGIC {
            return Err(KazariError::invalid_argument(
                "rdr",
                "The magic number of the input lexical model mismatches.",
            ));
        }
        let config = common::bincode_config();
        let table = bincode::decode_from_std_read(&mut rdr, config)?;
        Ok(table)
    }

    /// zstd圧縮されたモデルファイルを読み込みます。
    ///
    /// # 引数
    ///
    /// * `path` - モデルファイルのパス
    ///
    /// # 戻り値
    ///
    /// 読み込まれたテーブル
    ///
    /// # エラー
    ///
    /// パスが通常ファイルとして存在しない場合、
    /// [`KazariError::MissingLexicalModel`]を返します。
    pub fn from_path<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(KazariError::MissingLexicalModel(path.to_path_buf()));
        }
        let decoder = zstd::Decoder::new(File::open(path)?)?;
        Self::read(decoder)
    }

    /// テーブルをバイナリ形式で書き出します。
    ///
    /// # 引数
    ///
    /// * `wtr` - 書き出し先のライター
    pub fn write<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_all(BILEX_MAGIC)?;
        let config = common::bincode_config();
        bincode::encode_into_std_write(self, &mut wtr, config)?;
        Ok(())
    }
}
