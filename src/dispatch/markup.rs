//! Telegram MarkdownV2 转义

/// MarkdownV2 保留字符（反斜杠本身不在其中）
pub const RESERVED_CHARS: [char; 17] = [
    '_', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// 每个保留字符前加反斜杠。
///
/// 单次调用内不会重复转义；但对已转义文本再次调用会再转义一次（`.` → `\.` → `\\.`）。
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    for c in text.chars() {
        if RESERVED_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 加粗；调用方负责先转义
pub fn bold(escaped: &str) -> String {
    format!("*{}*", escaped)
}
