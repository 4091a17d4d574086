//! 名称匹配用的文本规范化：去变音符、转小写、去首尾空白

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// 小写后做 NFD 分解并丢弃非 ASCII 组合记号，最后 trim。幂等，空串返回空串。
///
/// 先小写：`İ` 小写后会产生组合点号，放在分解之前才能一并去掉。
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| c.is_ascii() || !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_string()
}
