//! モデルコンパイラのメインエントリーポイント
//!
//! このモジュールは、素性装飾に必要なバイナリモデルをビルドするための
//! サブコマンドを提供します。テキスト形式の頻度レコードから結合頻度
//! テーブルを、テキスト形式の語ペアレコードから語彙翻訳モデルを構築し、
//! それぞれzstd圧縮したバイナリ形式で出力します。

mod bilex;
mod counts;

use clap::Parser;
use thiserror::Error;

use crate::{bilex::BilexError, counts::CountsError};

/// コマンドライン引数の構造体
///
/// `clap`を使用してコマンドライン引数をパースします。
#[derive(Parser, Debug)]
#[clap(name = "compile", version)]
struct Cli {
    /// 実行するサブコマンド
    #[clap(subcommand)]
    command: Command,
}

/// 利用可能なサブコマンド
#[derive(Parser, Debug)]
enum Command {
    /// テキスト形式の頻度レコードから結合頻度テーブルを構築します
    ///
    /// 各行は `LHS ||| srcRHS ||| tgtRHS ||| count` の形式です。
    Counts(counts::Args),

    /// テキスト形式の語ペアレコードから語彙翻訳モデルを構築します
    ///
    /// 各行は空白区切りの `fword eword P(e|f) P(f|e)` の形式です。
    Bilex(bilex::Args),
}

/// コンパイラの実行中に発生する可能性のあるエラー
///
/// 各サブコマンドで発生したエラーをラップします。
#[derive(Debug, Error)]
pub enum CompileError {
    /// 頻度テーブル構築中のエラー
    #[error(transparent)]
    Counts(#[from] CountsError),
    /// 語彙翻訳モデル構築中のエラー
    #[error(transparent)]
    Bilex(#[from] BilexError),
}

/// メイン関数
///
/// コマンドライン引数をパースし、指定されたサブコマンドを実行します。
///
/// # 戻り値
///
/// 実行が成功した場合は`Ok(())`、失敗した場合は対応する`CompileError`を返します。
fn main() -> Result<(), CompileError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Counts(args) => Ok(counts::run(args)?),
        Command::Bilex(args) => Ok(bilex::run(args)?),
    }
}
