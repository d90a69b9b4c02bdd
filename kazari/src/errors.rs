//! エラー型の定義
//!
//! このモジュールは、Kazariライブラリで使用されるすべてのエラー型を定義します。

use std::error::Error;
use std::fmt::{self, Debug};
use std::path::PathBuf;

/// Kazari専用のResult型
///
/// エラー型としてデフォルトで[`KazariError`]を使用します。
pub type Result<T, E = KazariError> = std::result::Result<T, E>;

/// Kazariのエラー型
///
/// このライブラリで発生する可能性のあるすべてのエラーを表現します。
/// 各バリアントは特定のエラー条件に対応しています。
#[derive(Debug, thiserror::Error)]
pub enum KazariError {
    /// 無効な引数エラー
    ///
    /// [`InvalidArgumentError`]のエラーバリアント。
    #[error(transparent)]
    InvalidArgument(InvalidArgumentError),

    /// 不正な規則レコードエラー
    ///
    /// [`MalformedRecordError`]のエラーバリアント。
    #[error(transparent)]
    MalformedRecord(MalformedRecordError),

    /// 排他的な動作モードの競合エラー
    ///
    /// 同時に指定できない設定フラグが要求された場合に発生します。
    #[error("ConfigConflictError: {0}")]
    ConfigConflict(String),

    /// 語彙翻訳モデルが存在しないエラー
    ///
    /// 必須の語彙翻訳モデルのパスが見つからない場合に発生します。
    #[error("The lexical model file '{0}' does not exist.")]
    MissingLexicalModel(PathBuf),

    /// 整数パースエラー
    ///
    /// [`ParseIntError`](std::num::ParseIntError)のエラーバリアント。
    #[error(transparent)]
    ParseInt(std::num::ParseIntError),

    /// 浮動小数点数パースエラー
    ///
    /// [`ParseFloatError`](std::num::ParseFloatError)のエラーバリアント。
    #[error(transparent)]
    ParseFloat(std::num::ParseFloatError),

    /// 標準I/Oエラー
    ///
    /// [`std::io::Error`]のエラーバリアント。
    #[error(transparent)]
    StdIo(#[from] std::io::Error),

    /// バックグラウンドスレッドパニックエラー
    ///
    /// ワーカースレッドがパニックした場合に発生します。
    #[error("Background thread panicked: {0}")]
    ThreadPanic(String),

    /// bincodeデコードエラー
    ///
    /// [`DecodeError`](bincode::error::DecodeError)のラッパーです。
    #[error(transparent)]
    BincodeDecode(bincode::error::DecodeError),

    /// bincodeエンコードエラー
    ///
    /// [`EncodeError`](bincode::error::EncodeError)のラッパーです。
    #[error(transparent)]
    BincodeEncode(bincode::error::EncodeError),
}

impl KazariError {
    /// 無効な引数エラーを生成します
    ///
    /// # 引数
    ///
    /// * `arg` - 引数の名前
    /// * `msg` - エラーメッセージ
    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    /// 不正な規則レコードエラーを生成します
    ///
    /// # 引数
    ///
    /// * `msg` - エラーメッセージ
    /// * `record` - 問題のあるレコードのテキスト
    pub(crate) fn malformed_record<S, R>(msg: S, record: R) -> Self
    where
        S: Into<String>,
        R: Into<String>,
    {
        Self::MalformedRecord(MalformedRecordError {
            msg: msg.into(),
            record: record.into(),
        })
    }

    /// 動作モード競合エラーを生成します
    ///
    /// # 引数
    ///
    /// * `msg` - 競合の内容を表すメッセージ
    pub(crate) fn config_conflict<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::ConfigConflict(msg.into())
    }
}

/// 引数が無効な場合に使用されるエラー
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// 引数の名前
    pub(crate) arg: &'static str,

    /// エラーメッセージ
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// 規則レコードが不正な場合に使用されるエラー
///
/// パイプ区切りフィールドの不足など、レコードの構文違反を表します。
/// レコードを含むファイル名は報告側で付加されます。
#[derive(Debug)]
pub struct MalformedRecordError {
    /// エラーメッセージ
    pub(crate) msg: String,

    /// 問題のあるレコードのテキスト
    pub(crate) record: String,
}

impl fmt::Display for MalformedRecordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MalformedRecordError: {}: {:?}", self.msg, self.record)
    }
}

impl Error for MalformedRecordError {}

impl From<std::num::ParseIntError> for KazariError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::ParseInt(error)
    }
}

impl From<std::num::ParseFloatError> for KazariError {
    fn from(error: std::num::ParseFloatError) -> Self {
        Self::ParseFloat(error)
    }
}

impl From<bincode::error::DecodeError> for KazariError {
    fn from(error: bincode::error::DecodeError) -> Self {
        Self::BincodeDecode(error)
    }
}

impl From<bincode::error::EncodeError> for KazariError {
    fn from(error: bincode::error::EncodeError) -> Self {
        Self::BincodeEncode(error)
    }
}
