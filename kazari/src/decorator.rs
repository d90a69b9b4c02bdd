//! 文法装飾のオーケストレーション
//!
//! このモジュールは、規則ファイル群に対する素性装飾のパイプライン全体を
//! 駆動します。固定サイズのワーカープールが1ファイル1タスクで入力を
//! 処理し、文単位モードでは各ファイルの装飾済み文法を即座に書き出し、
//! グローバルモードでは全ワーカーの完了後に重複排除・語彙スコアリング・
//! フィルタリングを単一スレッドで実行して1つの結合ファイルを書き出します。
//!
//! 頻度テーブルと語彙翻訳モデルはディスパッチ前にロードされ、
//! ワーカー間で読み取り専用で共有されます。グローバルモードのワーカーは
//! 共有メモリを変更せず、完成したレコードのバッチをチャネル経由で
//! オーケストレータに返します。

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::bilex::BiLex;
use crate::counts::{CountTable, SourceKey};
use crate::errors::{KazariError, Result};
use crate::featurize;
use crate::rule::{Feature, Rule, OOV_TOKEN, START_SYMBOL};

/// すべての出力文法の末尾に付加される構造規則
///
/// 2つの並べ替えグルー規則と1つの開始規則で、観測データに依存せず
/// デコーダが文法を利用できることを保証します。
pub const STRUCTURAL_RULES: [&str; 3] = [
    "[X] ||| [X,1] [X,2] ||| [1] [2] ||| Glue=1",
    "[X] ||| [X,1] [X,2] ||| [2] [1] ||| Glue=1 Inverse=1",
    "[S] ||| [X,1] ||| [1] ||| 0",
];

/// 装飾処理の解決済みオプション
///
/// コマンドライン等の外部インターフェースで解決された生のフラグの
/// 集合です。[`Pipeline::resolve`]によって検証され、閉じた
/// パイプラインバリアントに変換されます。
#[derive(Debug, Clone)]
pub struct DecoratorOptions {
    /// 文単位の文法を書き出すかどうか
    pub per_sentence: bool,
    /// 入力がスパン注釈付き（周辺確率付き）かどうか
    ///
    /// 真の場合、文単位の書き出しが暗黙に有効になります。
    pub span_aware: bool,
    /// 加算スムージングを有効にするかどうか
    pub add_one: bool,
    /// 原言語側キーごとに保持する目的言語側選択肢の上限
    pub top_n: Option<usize>,
    /// ワーカースレッド数
    pub num_workers: usize,
}

impl Default for DecoratorOptions {
    fn default() -> Self {
        Self {
            per_sentence: false,
            span_aware: false,
            add_one: false,
            top_n: None,
            num_workers: 1,
        }
    }
}

/// 検証済みのパイプラインバリアント
///
/// 相互排他的な動作モードの組み合わせは[`Pipeline::resolve`]で
/// 網羅的に検証され、処理開始前に拒否されます。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// 文単位の装飾: 各入力ファイルを独立に装飾して即座に書き出す
    PerSentence {
        /// スパン注釈付き入力かどうか
        span_aware: bool,
    },
    /// グローバル集約: 全ファイルのレコードを集約・重複排除して
    /// 1つの結合ファイルを書き出す
    GlobalAggregate,
    /// グローバル集約に加えて、Top-Nフィルタを適用する
    GlobalFiltered {
        /// 原言語側キーごとの選択肢の上限
        limit: usize,
    },
}

impl Pipeline {
    /// オプションからパイプラインバリアントを解決します。
    ///
    /// # 引数
    ///
    /// * `opts` - 解決済みオプション
    ///
    /// # 戻り値
    ///
    /// 検証済みのパイプラインバリアント
    ///
    /// # エラー
    ///
    /// Top-Nフィルタが文単位モードまたはスパン注釈付き入力と同時に
    /// 要求された場合、[`KazariError::ConfigConflict`]を返します。
    /// フィルタリングには全選択肢の完成したグローバルビューが必要であり、
    /// 文単位のストリーミングはそれを提供できないためです。
    pub fn resolve(opts: &DecoratorOptions) -> Result<Self> {
        match opts.top_n {
            Some(limit) => {
                if opts.per_sentence {
                    return Err(KazariError::config_conflict(
                        "the Top-N filter cannot be combined with per-sentence decoration",
                    ));
                }
                if opts.span_aware {
                    return Err(KazariError::config_conflict(
                        "the Top-N filter cannot be combined with span-aware input",
                    ));
                }
                Ok(Self::GlobalFiltered { limit })
            }
            None => {
                if opts.per_sentence || opts.span_aware {
                    Ok(Self::PerSentence {
                        span_aware: opts.span_aware,
                    })
                } else {
                    Ok(Self::GlobalAggregate)
                }
            }
        }
    }
}

/// 装飾実行の集計結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 処理対象のファイル数
    pub num_files: usize,
    /// 失敗したファイル数
    pub num_failed: usize,
    /// 書き出された規則レコード数（構造規則を除く）
    pub num_rules: usize,
}

/// ワーカータスクの出力
enum TaskOutput {
    /// 文単位モード: 書き出された規則数
    Written(usize),
    /// グローバルモード: 完成したレコードのバッチ
    Batch(Vec<Rule>),
}

type FileOutcome = (PathBuf, Result<TaskOutput>);

/// 文法装飾のオーケストレータ
///
/// 頻度テーブルと語彙翻訳モデルを所有し、入力ファイル群に対して
/// 選択されたパイプラインを実行します。
pub struct Decorator {
    counts: CountTable,
    bilex: BiLex,
    pipeline: Pipeline,
    add_one: bool,
    num_workers: usize,
}

impl Decorator {
    /// 新しいオーケストレータを作成します。
    ///
    /// # 引数
    ///
    /// * `counts` - ロード済みの結合頻度テーブル
    /// * `bilex` - ロード済みの語彙翻訳確率テーブル
    /// * `opts` - 解決済みオプション
    ///
    /// # 戻り値
    ///
    /// 作成されたオーケストレータ
    ///
    /// # エラー
    ///
    /// オプションの組み合わせが無効な場合、
    /// [`KazariError::ConfigConflict`]を返します。
    pub fn new(counts: CountTable, bilex: BiLex, opts: &DecoratorOptions) -> Result<Self> {
        let pipeline = Pipeline::resolve(opts)?;
        Ok(Self {
            counts,
            bilex,
            pipeline,
            add_one: opts.add_one,
            num_workers: opts.num_workers.max(1),
        })
    }

    /// 解決されたパイプラインバリアントを返します。
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    /// 入力ファイル群に対して装飾パイプラインを実行します。
    ///
    /// 文単位モードでは `out` は出力ディレクトリとして扱われ、
    /// 各入力ファイルと同名の装飾済み文法が書き出されます。
    /// グローバルモードでは `out` は単一の出力ファイルのパスです。
    ///
    /// ファイル単位のエラーはそのファイルのタスクのみを中断し、
    /// 診断メッセージと共に報告されますが、他のファイルの処理は
    /// 続行されます。
    ///
    /// # 引数
    ///
    /// * `files` - 入力文法ファイルのパスのリスト
    /// * `out` - 出力先（モードに応じてディレクトリまたはファイル）
    ///
    /// # 戻り値
    ///
    /// 実行の集計結果
    pub fn run(&mut self, files: &[PathBuf], out: &Path) -> Result<RunSummary> {
        match self.pipeline {
            Pipeline::PerSentence { span_aware } => self.run_per_sentence(files, out, span_aware),
            Pipeline::GlobalAggregate => self.run_global(files, out, None),
            Pipeline::GlobalFiltered { limit } => self.run_global(files, out, Some(limit)),
        }
    }

    /// 文単位パイプラインを実行します。
    fn run_per_sentence(
        &self,
        files: &[PathBuf],
        out_dir: &Path,
        span_aware: bool,
    ) -> Result<RunSummary> {
        let counts = &self.counts;
        let bilex = &self.bilex;
        let add_one = self.add_one;
        let outcomes = self.dispatch(files, |path| {
            let mut rules = featurize_file(counts, path, span_aware, add_one)?;
            featurize::attach_lexical_features(bilex, &mut rules);
            let name = path.file_name().ok_or_else(|| {
                KazariError::invalid_argument("files", format!("not a file path: {path:?}"))
            })?;
            write_grammar(&out_dir.join(name), &rules)?;
            Ok(TaskOutput::Written(rules.len()))
        })?;

        let mut summary = RunSummary {
            num_files: files.len(),
            ..Default::default()
        };
        for (path, outcome) in outcomes {
            match outcome {
                Ok(TaskOutput::Written(n)) => {
                    eprintln!(
                        "Grammar {} featurization complete: {} rules",
                        path.display(),
                        n
                    );
                    summary.num_rules += n;
                }
                Ok(TaskOutput::Batch(_)) => unreachable!(),
                Err(e) => {
                    eprintln!("Failed to featurize {}: {}", path.display(), e);
                    summary.num_failed += 1;
                }
            }
        }
        Ok(summary)
    }

    /// グローバルパイプラインを実行します。
    ///
    /// 全ワーカーの完了（バリア）後の仕上げパスは単一スレッドで
    /// 実行されます。重複排除とTop-Nフィルタリングには完成した
    /// グローバルビューが必要なためです。
    fn run_global(
        &mut self,
        files: &[PathBuf],
        out_file: &Path,
        top_n: Option<usize>,
    ) -> Result<RunSummary> {
        let counts = &self.counts;
        let add_one = self.add_one;
        let outcomes = self.dispatch(files, |path| {
            let rules = featurize_file(counts, path, false, add_one)?;
            Ok(TaskOutput::Batch(rules))
        })?;

        let mut summary = RunSummary {
            num_files: files.len(),
            ..Default::default()
        };
        let mut num_seen = 0;
        let mut seen = hashbrown::HashSet::new();
        let mut uniq: Vec<Rule> = vec![];
        for (path, outcome) in outcomes {
            match outcome {
                Ok(TaskOutput::Batch(batch)) => {
                    eprintln!(
                        "Grammar {} featurization complete: {} rules",
                        path.display(),
                        batch.len()
                    );
                    num_seen += batch.len();
                    for rule in batch {
                        // Exact text-record equality decides duplicates.
                        if seen.insert(rule.to_string()) {
                            uniq.push(rule);
                        }
                    }
                }
                Ok(TaskOutput::Written(_)) => unreachable!(),
                Err(e) => {
                    eprintln!("Failed to featurize {}: {}", path.display(), e);
                    summary.num_failed += 1;
                }
            }
        }
        eprintln!("number of rules seen: {num_seen}");

        featurize::attach_lexical_features(&self.bilex, &mut uniq);

        if let Some(limit) = top_n {
            self.counts.filter_top_n(limit);
            let counts = &self.counts;
            uniq.retain(|rule| {
                let key = SourceKey::new(rule.lhs.clone(), rule.src_text());
                counts.contains_alternative(&key, &rule.tgt_text())
            });
        }

        write_grammar(out_file, &uniq)?;
        summary.num_rules = uniq.len();
        Ok(summary)
    }

    /// 固定サイズのワーカープールでタスクをディスパッチします。
    ///
    /// ファイルごとに1タスクを生成し、順序保証なしでワーカーに
    /// 割り当てます。各ワーカーは共有インデックスから次のファイルを
    /// 取得して処理し、結果をチャネル経由で返します。
    /// このメソッドは全ワーカーの完了を待ってから返ります
    /// （完全なバリア）。
    ///
    /// # 引数
    ///
    /// * `files` - 入力ファイルのリスト
    /// * `task` - 各ファイルに適用するタスク
    ///
    /// # 戻り値
    ///
    /// ファイルごとの処理結果（到着順）
    ///
    /// # エラー
    ///
    /// ワーカースレッドがパニックした場合、
    /// [`KazariError::ThreadPanic`]を返します。
    fn dispatch<F>(&self, files: &[PathBuf], task: F) -> Result<Vec<FileOutcome>>
    where
        F: Fn(&Path) -> Result<TaskOutput> + Sync,
    {
        let next = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel();
        let mut outcomes = Vec::with_capacity(files.len());
        thread::scope(|s| -> Result<()> {
            let mut handles = Vec::with_capacity(self.num_workers);
            for _ in 0..self.num_workers {
                let tx = tx.clone();
                let task = &task;
                let next = &next;
                handles.push(s.spawn(move || loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = files.get(i) else {
                        break;
                    };
                    if tx.send((path.clone(), task(path))).is_err() {
                        break;
                    }
                }));
            }
            drop(tx);
            for outcome in rx {
                outcomes.push(outcome);
            }
            for handle in handles {
                handle
                    .join()
                    .map_err(|_| KazariError::ThreadPanic("a worker thread panicked".to_string()))?;
            }
            Ok(())
        })?;
        Ok(outcomes)
    }
}

/// 1つの入力文法ファイルの規則をパースして素性を付与します。
///
/// 各レコードについてキーと `no_lex` フラグを導出し、頻度素性と
/// 形状素性を付与します。スパン注釈付きモードでは開始記号の規則は
/// ゼロマーカー付きでそのまま通過します。原言語側がOOVセンチネルの
/// 規則は逐語コピー規則として書き換えられます。
///
/// # 引数
///
/// * `counts` - 結合頻度テーブル
/// * `path` - 入力ファイルのパス
/// * `span_aware` - スパン注釈付き入力かどうか
/// * `add_one` - 加算スムージングを有効にするかどうか
///
/// # 戻り値
///
/// 素性が付与された規則のベクトル（語彙素性は未付与）
///
/// # エラー
///
/// 不正なレコードに遭遇した場合、このファイルの処理を中断して
/// エラーを返します。
fn featurize_file(
    counts: &CountTable,
    path: &Path,
    span_aware: bool,
    add_one: bool,
) -> Result<Vec<Rule>> {
    let rdr = open_reader(path)?;
    let mut rules = vec![];
    for line in rdr.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut rule = Rule::from_record(&line)?;
        if span_aware && rule.lhs == START_SYMBOL {
            // The top-level rule is passed through with a zero marker.
            rule.features = vec![Feature::bare("0")];
            rules.push(rule);
            continue;
        }
        let derived = rule.derive_key(span_aware);
        if rule.src_text() == OOV_TOKEN {
            // Verbatim copy rule: the target side carries the unknown word.
            rule.src = rule.tgt.clone();
            rule.push_feature(featurize::pass_through_feature());
        } else if !derived.no_lex {
            for feature in featurize::count_features(counts, &derived.key, add_one) {
                rule.push_feature(feature);
            }
        }
        if span_aware && derived.no_lex {
            rule.push_feature(featurize::glue_feature());
        }
        if let Some(feature) = featurize::inverse_feature(&rule, span_aware)? {
            rule.push_feature(feature);
        }
        rules.push(rule);
    }
    Ok(rules)
}

/// 装飾済みの文法を書き出します。
///
/// すべてのレコードの後に、3つの構造規則が必ず付加されます。
fn write_grammar(path: &Path, rules: &[Rule]) -> Result<()> {
    let mut wtr = open_writer(path)?;
    for rule in rules {
        writeln!(wtr, "{rule}")?;
    }
    for line in STRUCTURAL_RULES {
        writeln!(wtr, "{line}")?;
    }
    wtr.finish()?;
    Ok(())
}

/// 出力文法のライター
///
/// gzipエンコーダを暗黙のドロップに任せるとフッター書き出しの失敗が
/// 握り潰されるため、[`finish`](Self::finish)で明示的に完了させます。
enum GrammarWriter<W: Write> {
    /// 平文のバッファ付きライター
    Plain(BufWriter<W>),
    /// gzip圧縮ライター
    Gzip(GzEncoder<W>),
}

impl<W: Write> GrammarWriter<W> {
    /// ライターを完了し、残りのデータをすべて書き切ります。
    ///
    /// # エラー
    ///
    /// バッファの書き出しやgzipフッターの書き込みに失敗した場合は
    /// エラーを返します。
    fn finish(self) -> Result<()> {
        match self {
            Self::Plain(mut wtr) => wtr.flush()?,
            Self::Gzip(encoder) => {
                encoder.finish()?;
            }
        }
        Ok(())
    }
}

impl<W: Write> Write for GrammarWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(wtr) => wtr.write(buf),
            Self::Gzip(wtr) => wtr.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(wtr) => wtr.flush(),
            Self::Gzip(wtr) => wtr.flush(),
        }
    }
}

/// 拡張子に応じてgzipまたは平文のリーダーを開きます。
fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// 拡張子に応じてgzipまたは平文のライターを開きます。
fn open_writer(path: &Path) -> Result<GrammarWriter<File>> {
    let file = File::create(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(GrammarWriter::Gzip(GzEncoder::new(
            file,
            Compression::default(),
        )))
    } else {
        Ok(GrammarWriter::Plain(BufWriter::new(file)))
    }
}
