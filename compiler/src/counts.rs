//! 結合頻度テーブルのコンパイルモジュール
//!
//! このモジュールは、規則抽出器が出力したテキスト形式の頻度レコードから
//! バイナリ形式の結合頻度テーブルを構築する機能を提供します。

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;

use kazari::{CountTable, KazariError};

/// 頻度テーブルコンパイルコマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "counts", about = "A program to compile the joint count table.")]
pub struct Args {
    /// Count records, one `LHS ||| srcRHS ||| tgtRHS ||| count` per line
    /// (plain text or gzip).
    #[clap(short = 'i', long)]
    counts_in: PathBuf,

    /// File to which the binary count table is output (in zstd).
    #[clap(short = 'o', long)]
    counts_out: PathBuf,
}

/// 頻度テーブルのコンパイル中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum CountsError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// テーブル構築エラー
    #[error("Count table compilation failed: {0}")]
    Kazari(#[from] KazariError),
}

/// 頻度テーブルコンパイルコマンドを実行する
///
/// 入力レコードからテーブルを構築し、zstd圧縮したバイナリ形式で出力します。
///
/// # 引数
///
/// * `args` - コマンドの引数
///
/// # 戻り値
///
/// 成功時は`Ok(())`
///
/// # エラー
///
/// ファイルの読み書きやレコードのパースに失敗した場合、`CountsError`を返します。
pub fn run(args: Args) -> Result<(), CountsError> {
    println!("Compiling the count table...");
    let table = CountTable::from_reader(open_input(&args.counts_in)?)?;
    println!("number of source keys: {}", table.len());

    println!("Writing the count table...");
    let file = File::create(&args.counts_out)?;
    let mut encoder = zstd::Encoder::new(file, 19)?;
    table.write(&mut encoder)?;
    encoder.finish()?;

    println!(
        "Successfully compiled the count table to {}",
        args.counts_out.display()
    );
    Ok(())
}

/// 拡張子に応じてgzipまたは平文のリーダーを開く
fn open_input(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use kazari::counts::SourceKey;

    #[test]
    fn test_compile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let counts_in = dir.path().join("counts.txt");
        let counts_out = dir.path().join("counts.bin.zst");
        std::fs::write(
            &counts_in,
            "[X] ||| the [X,1] ||| le [X,1] ||| 8\n[X] ||| the [X,1] ||| la [X,1] ||| 2\n",
        )
        .unwrap();

        run(Args {
            counts_in,
            counts_out: counts_out.clone(),
        })
        .unwrap();

        let decoder = zstd::Decoder::new(File::open(counts_out).unwrap()).unwrap();
        let table = CountTable::read(decoder).unwrap();
        assert_eq!(1, table.len());
        assert!(table.contains_alternative(&SourceKey::new("[X]", "the [X,1]"), "le [X,1]"));
    }

    #[test]
    fn test_compile_gzip_input() {
        let dir = tempfile::tempdir().unwrap();
        let counts_in = dir.path().join("counts.txt.gz");
        let counts_out = dir.path().join("counts.bin.zst");
        {
            let mut enc = flate2::write::GzEncoder::new(
                File::create(&counts_in).unwrap(),
                flate2::Compression::default(),
            );
            enc.write_all(b"[X] ||| dog ||| chien ||| 1\n").unwrap();
            enc.finish().unwrap();
        }

        run(Args {
            counts_in,
            counts_out: counts_out.clone(),
        })
        .unwrap();

        let table = CountTable::from_path(counts_out).unwrap();
        assert!(table.contains_alternative(&SourceKey::new("[X]", "dog"), "chien"));
    }
}
