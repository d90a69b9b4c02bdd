//! ライブラリ共通の設定
//!
//! このモジュールは、バイナリアーティファクトの直列化における共通の設定を提供します。

use bincode::config::{self, Fixint, LittleEndian};

/// シリアライゼーションの共通bincode設定を取得します。
///
/// リトルエンディアンと固定長整数エンコーディングを使用するbincode設定を
/// 返します。これにより、異なるプラットフォーム間での一貫した
/// データシリアライゼーションが保証されます。
///
/// # 戻り値
///
/// リトルエンディアンと固定長整数エンコーディングが設定された
/// bincode設定オブジェクト
pub const fn bincode_config() -> config::Configuration<LittleEndian, Fixint> {
    config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}
