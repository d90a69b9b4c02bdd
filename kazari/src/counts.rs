//! 規則の結合頻度テーブル
//!
//! このモジュールは、(LHS, 原言語側パターン) から目的言語側パターンごとの
//! 結合頻度への写像を管理します。テーブルは素性計算の前に一度だけ
//! ロードされ、並列処理の間は読み取り専用で共有されます。
//! Top-Nフィルタのみが、全ワーカーの完了後に単一スレッドで
//! テーブルを変更します。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, Read, Write};
use std::path::Path;

use bincode::{Decode, Encode};

use crate::common;
use crate::errors::{KazariError, Result};

/// 頻度テーブルファイルのマジックナンバー
pub const COUNTS_MAGIC: &[u8] = b"KazariCounts 0.2\n";

/// 頻度テーブルの原言語側キー
///
/// LHSラベルと原言語側パターンの組で、規則キーの目的言語側を除いた
/// 部分に対応します。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Encode, Decode)]
pub struct SourceKey {
    /// 左辺の非終端記号ラベル
    pub lhs: String,
    /// 原言語側RHSのテキスト表現
    pub src: String,
}

impl SourceKey {
    /// 新しい原言語側キーを作成します。
    pub fn new<L, S>(lhs: L, src: S) -> Self
    where
        L: Into<String>,
        S: Into<String>,
    {
        Self {
            lhs: lhs.into(),
            src: src.into(),
        }
    }
}

/// 規則の結合頻度テーブル
///
/// 原言語側キーごとに、目的言語側パターンから非負の結合頻度への
/// 写像を保持します。
#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct CountTable {
    table: HashMap<SourceKey, HashMap<String, u64>>,
}

impl CountTable {
    /// 空のテーブルを作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// 原言語側キーの数を返します。
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// テーブルが空かどうかを返します。
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// 結合頻度を加算します。
    ///
    /// # 引数
    ///
    /// * `lhs` - 左辺ラベル
    /// * `src` - 原言語側パターン
    /// * `tgt` - 目的言語側パターン
    /// * `count` - 加算する頻度
    pub fn add<L, S, T>(&mut self, lhs: L, src: S, tgt: T, count: u64)
    where
        L: Into<String>,
        S: Into<String>,
        T: Into<String>,
    {
        *self
            .table
            .entry(SourceKey::new(lhs, src))
            .or_default()
            .entry(tgt.into())
            .or_insert(0) += count;
    }

    /// 指定された原言語側キーの目的言語側の選択肢を返します。
    ///
    /// # 引数
    ///
    /// * `key` - 原言語側キー
    ///
    /// # 戻り値
    ///
    /// キーが存在する場合は目的言語側パターンから頻度への写像、
    /// 存在しない場合は `None`
    pub fn alternatives(&self, key: &SourceKey) -> Option<&HashMap<String, u64>> {
        self.table.get(key)
    }

    /// 指定された規則がテーブルに選択肢として含まれるかを返します。
    pub fn contains_alternative(&self, key: &SourceKey, tgt: &str) -> bool {
        self.table
            .get(key)
            .map_or(false, |alts| alts.contains_key(tgt))
    }

    /// テキスト形式の頻度レコードからテーブルを構築します。
    ///
    /// 各行は `LHS ||| srcRHS ||| tgtRHS ||| count` の形式です。
    /// 空行は無視されます。
    ///
    /// # 引数
    ///
    /// * `rdr` - 頻度レコードのリーダー
    ///
    /// # 戻り値
    ///
    /// 構築されたテーブル
    ///
    /// # エラー
    ///
    /// フィールド数が不足している場合や頻度が整数としてパースできない
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
            let fields: Vec<&str> = line.split("|||").map(str::trim).collect();
            if fields.len() < 4 {
                return Err(KazariError::malformed_record(
                    "a count record requires 4 pipe-delimited fields",
                    line,
                ));
            }
            let count = fields[3].parse::<u64>()?;
            table.add(fields[0], fields[1], fields[2], count);
        }
        Ok(table)
    }

    /// バイナリ形式のテーブルを読み込みます。
    ///
    /// # 引数
    ///
    /// * `rdr` - テーブルデータを読み込むリーダー
    ///
    /// # 戻り値
    ///
    /// 読み込まれたテーブル
    ///
    /// # エラー
    ///
    /// bincodeがエラーを生成した場合、そのエラーがそのまま返されます。
    /// また、マジックナンバーが一致しない場合もエラーが返されます。
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut magic = [0; COUNTS_MAGIC.len()];
        rdr.read_exact(&mut magic)?;
        if magic != COUNTS_MAGIC {
            return Err(KazariError::invalid_argument(
                "rdr",
                "The magic number of the input count table mismatches.",
            ));
        }
        let config = common::bincode_config();
        let table = bincode::decode_from_std_read(&mut rdr, config)?;
        Ok(table)
    }

    /// zstd圧縮されたテーブルファイルを読み込みます。
    ///
    /// # 引数
    ///
    /// * `path` - テーブルファイルのパス
    ///
    /// # 戻り値
    ///
    /// 読み込まれたテーブル
    pub fn from_path<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path.as_ref())?;
        let decoder = zstd::Decoder::new(file)?;
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
        wtr.write_all(COUNTS_MAGIC)?;
        let config = common::bincode_config();
        bincode::encode_into_std_write(self, &mut wtr, config)?;
        Ok(())
    }

    /// 原言語側キーごとの目的言語側の選択肢を上位 `limit` 件に制限します。
    ///
    /// 選択肢が `limit` 件を超える原言語側キーについて、結合頻度の
    /// 降順で上位 `limit` 件のみを残し、残りをテーブルから除去します。
    /// 頻度が同じ場合の順序はテーブルの反復順に依存し、規定されません。
    /// 1件以上除去したキーごとに診断メッセージを出力します。
    ///
    /// # 引数
    ///
    /// * `limit` - 原言語側キーごとに保持する選択肢の最大数
    pub fn filter_top_n(&mut self, limit: usize) {
        for (key, alts) in self.table.iter_mut() {
            let num_alts = alts.len();
            if num_alts <= limit {
                continue;
            }
            let mut ranked: Vec<(String, u64)> =
                alts.iter().map(|(tgt, &cnt)| (tgt.clone(), cnt)).collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1));
            ranked.truncate(limit);
            *alts = ranked.into_iter().collect();
            eprintln!(
                "Source RHS: {} ||| {}; out of {} rules, filtered {}",
                key.lhs,
                key.src,
                num_alts,
                num_alts - limit
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::count_table;

    #[test]
    fn test_from_reader() {
        let data = "\
[X] ||| the [X,1] ||| le [1] ||| 8
[X] ||| the [X,1] ||| la [1] ||| 2

[X] ||| dog ||| chien ||| 1
";
        let table = CountTable::from_reader(data.as_bytes()).unwrap();
        assert_eq!(2, table.len());
        let alts = table
            .alternatives(&SourceKey::new("[X]", "the [X,1]"))
            .unwrap();
        assert_eq!(2, alts.len());
        assert_eq!(8, alts["le [1]"]);
        assert_eq!(2, alts["la [1]"]);
    }

    #[test]
    fn test_from_reader_rejects_bad_count() {
        let data = "[X] ||| a ||| b ||| eight\n";
        assert!(CountTable::from_reader(data.as_bytes()).is_err());
    }

    #[test]
    fn test_read_write() {
        let table = count_table! {
            ("[X]", "the [X,1]") => { "le [1]" => 8, "la [1]" => 2 },
            ("[X]", "dog") => { "chien" => 1 },
        };
        let mut buf = vec![];
        table.write(&mut buf).unwrap();
        let loaded = CountTable::read(buf.as_slice()).unwrap();
        assert_eq!(2, loaded.len());
        assert!(loaded.contains_alternative(&SourceKey::new("[X]", "dog"), "chien"));
    }

    #[test]
    fn test_read_rejects_bad_magic() {
        let buf = b"NotACountTable 9.9\n".to_vec();
        assert!(CountTable::read(buf.as_slice()).is_err());
    }

    #[test]
    fn test_filter_top_n() {
        let mut table = count_table! {
            ("[X]", "a") => { "t1" => 5, "t2" => 9, "t3" => 1, "t4" => 7 },
            ("[X]", "b") => { "u1" => 3, "u2" => 2 },
        };
        table.filter_top_n(2);

        let a = table.alternatives(&SourceKey::new("[X]", "a")).unwrap();
        assert_eq!(2, a.len());
        assert_eq!(9, a["t2"]);
        assert_eq!(7, a["t4"]);

        // Under the limit, untouched.
        let b = table.alternatives(&SourceKey::new("[X]", "b")).unwrap();
        assert_eq!(2, b.len());
    }

    #[test]
    fn test_filter_top_n_matches_brute_force() {
        let mut table = CountTable::new();
        for i in 0..20u64 {
            table.add("[X]", "s", format!("t{i}"), (i * 7) % 13 + 1);
        }
        let mut expected: Vec<(String, u64)> = table
            .alternatives(&SourceKey::new("[X]", "s"))
            .unwrap()
            .iter()
            .map(|(t, &c)| (t.clone(), c))
            .collect();
        expected.sort_by(|a, b| b.1.cmp(&a.1));
        let cutoff = expected[4].1;

        table.filter_top_n(5);
        let kept = table.alternatives(&SourceKey::new("[X]", "s")).unwrap();
        assert_eq!(5, kept.len());
        // Everything retained must count at least as much as the cutoff.
        assert!(kept.values().all(|&c| c >= cutoff));
    }
}
