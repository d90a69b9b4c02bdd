//! 語彙翻訳モデルのコンパイルモジュール
//!
//! このモジュールは、語アライナが出力したテキスト形式の語ペアレコードから
//! バイナリ形式の双方向語彙翻訳モデルを構築する機能を提供します。

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;

use kazari::{BiLex, KazariError};

/// 語彙翻訳モデルコンパイルコマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "bilex", about = "A program to compile the bilexical model.")]
pub struct Args {
    /// Word pair records, one `fword eword P(e|f) P(f|e)` per line
    /// (plain text or gzip).
    #[clap(short = 'i', long)]
    bilex_in: PathBuf,

    /// File to which the binary lexical model is output (in zstd).
    #[clap(short = 'o', long)]
    bilex_out: PathBuf,
}

/// 語彙翻訳モデルのコンパイル中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum BilexError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// モデル構築エラー
    #[error("Bilexical model compilation failed: {0}")]
    Kazari(#[from] KazariError),
}

/// 語彙翻訳モデルコンパイルコマンドを実行する
///
/// 入力レコードからモデルを構築し、zstd圧縮したバイナリ形式で出力します。
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
/// ファイルの読み書きやレコードのパースに失敗した場合、`BilexError`を返します。
pub fn run(args: Args) -> Result<(), BilexError> {
    println!("Compiling the bilexical model...");
    let model = BiLex::from_reader(open_input(&args.bilex_in)?)?;

    println!("Writing the bilexical model...");
    let file = File::create(&args.bilex_out)?;
    let mut encoder = zstd::Encoder::new(file, 19)?;
    model.write(&mut encoder)?;
    encoder.finish()?;

    println!(
        "Successfully compiled the bilexical model to {}",
        args.bilex_out.display()
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

    use kazari::bilex::Direction;

    #[test]
    fn test_compile_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let bilex_in = dir.path().join("lex.txt");
        let bilex_out = dir.path().join("lex.bin.zst");
        std::fs::write(&bilex_in, "chien dog 0.5 0.25\nNULL dog 0.125 0.0\n").unwrap();

        run(Args {
            bilex_in,
            bilex_out: bilex_out.clone(),
        })
        .unwrap();

        let model = BiLex::from_path(bilex_out).unwrap();
        assert_eq!(0.5, model.score("chien", "dog", Direction::EGivenF));
        assert_eq!(0.125, model.score("NULL", "dog", Direction::EGivenF));
    }

    #[test]
    fn test_compile_rejects_short_record() {
        let dir = tempfile::tempdir().unwrap();
        let bilex_in = dir.path().join("lex.txt");
        let bilex_out = dir.path().join("lex.bin.zst");
        std::fs::write(&bilex_in, "chien dog 0.5\n").unwrap();

        let err = run(Args {
            bilex_in,
            bilex_out,
        })
        .unwrap_err();
        assert!(matches!(err, BilexError::Kazari(_)));
    }
}
