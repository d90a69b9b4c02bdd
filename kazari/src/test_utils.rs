/// 頻度テーブルを手軽に構築するマクロ
///
/// ```ignore
/// let table = count_table! {
///     ("[X]", "the [X,1]") => { "le [1]" => 8, "la [1]" => 2 },
/// };
/// ```
macro_rules! count_table {
    ( $( ($lhs:expr, $src:expr) => { $( $tgt:expr => $cnt:expr ),* $(,)? } ),* $(,)? ) => {
        {
            #[allow(unused_mut)]
            let mut table = crate::counts::CountTable::new();
            $(
                $(
                    table.add($lhs, $src, $tgt, $cnt);
                )*
            )*
            table
        }
    };
}

pub(crate) use count_table;
