//! 文法装飾ツールのメインエントリーポイント
//!
//! このツールは、規則抽出器が出力した文単位の文法ファイル群を読み込み、
//! コンパイル済みの結合頻度テーブルと語彙翻訳モデルを用いて各規則に
//! 翻訳素性を付与します。文単位モードでは入力と同名の装飾済みファイルを
//! 出力ディレクトリに書き出し、それ以外のモードでは重複排除された単一の
//! 結合文法ファイルを書き出します。

use std::fs;
use std::io;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use kazari::decorator::Pipeline;
use kazari::{BiLex, CountTable, Decorator, DecoratorOptions, KazariError};

/// コマンドライン引数の構造体
#[derive(Parser, Debug)]
#[clap(
    name = "decorate",
    version,
    about = "A program to decorate grammar rules with translation features."
)]
struct Args {
    /// Directory containing the per-sentence grammar files
    /// (plain text or gzip, one rule record per line).
    #[clap(short = 'd', long)]
    grammar_dir: PathBuf,

    /// Output directory (with --per-sentence or --marginal) or output file.
    #[clap(short = 'o', long)]
    out: PathBuf,

    /// Compiled joint count table (in zstd).
    #[clap(short = 'c', long)]
    counts: PathBuf,

    /// Compiled bilexical model (in zstd).
    #[clap(short = 'l', long)]
    lex_model: PathBuf,

    /// Write one decorated grammar per input file instead of a single
    /// combined grammar.
    #[clap(short = 's', long)]
    per_sentence: bool,

    /// Treat the input as span-annotated grammars with marginal features.
    /// Implies per-sentence output.
    #[clap(short = 'm', long)]
    marginal: bool,

    /// Apply add-one smoothing to the count-based features.
    #[clap(short = 'a', long)]
    add_one: bool,

    /// Keep only the top N target alternatives per source side.
    /// Cannot be combined with --per-sentence or --marginal.
    #[clap(short = 'f', long)]
    filter: Option<usize>,

    /// Number of worker threads.
    #[clap(short = 'w', long, default_value = "1")]
    num_workers: usize,
}

/// 装飾ツールの実行中に発生する可能性のあるエラー
#[derive(Debug, Error)]
pub enum DecorateError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 装飾処理エラー
    #[error("Grammar decoration failed: {0}")]
    Kazari(#[from] KazariError),
}

/// メイン関数
///
/// コマンドライン引数をパースし、装飾パイプラインを実行します。
fn main() -> Result<(), DecorateError> {
    let args = Args::parse();

    let opts = DecoratorOptions {
        per_sentence: args.per_sentence,
        span_aware: args.marginal,
        add_one: args.add_one,
        top_n: args.filter,
        num_workers: args.num_workers,
    };

    eprintln!("Loading the count table...");
    let counts = CountTable::from_path(&args.counts)?;
    eprintln!("Loading the bilexical model...");
    let bilex = BiLex::from_path(&args.lex_model)?;

    let files = list_grammar_files(&args.grammar_dir)?;
    eprintln!("number of grammar files: {}", files.len());

    let mut decorator = Decorator::new(counts, bilex, &opts)?;
    match decorator.pipeline() {
        Pipeline::PerSentence { .. } => fs::create_dir_all(&args.out)?,
        Pipeline::GlobalAggregate | Pipeline::GlobalFiltered { .. } => {
            if let Some(parent) = args.out.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
    }

    let summary = decorator.run(&files, &args.out)?;
    println!(
        "Decorated {} grammar files ({} failed): {} rules written",
        summary.num_files, summary.num_failed, summary.num_rules
    );
    Ok(())
}

/// 文法ディレクトリ直下の通常ファイルをパス順に列挙します。
fn list_grammar_files(dir: &PathBuf) -> io::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_grammar_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("grammar.10"), "").unwrap();
        fs::write(dir.path().join("grammar.2"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let files = list_grammar_files(&dir.path().to_path_buf()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        // Lexicographic order, directories skipped.
        assert_eq!(vec!["grammar.10", "grammar.2"], names);
    }
}
