//! 入站消息 → 植物：按名称子串匹配（忽略大小写与变音符）
//!
//! 这是纯子串启发式，不做分词：名字很短时会误匹配（植物 "Al" 会命中 "Alice"）。

use crate::plants::Plant;

use super::normalize::normalize;

/// 找出消息提到的植物。
///
/// 取匹配起点最靠左的；起点相同时名字（规范化后）更长者胜，仍相同则按登记顺序取先出现的。
/// 无匹配返回 None，由调用方发送澄清提示。
pub fn resolve<'a>(raw_text: &str, plants: &'a [Plant]) -> Option<&'a Plant> {
    let text = normalize(raw_text);
    if text.is_empty() {
        return None;
    }

    let mut best: Option<(usize, usize, &'a Plant)> = None;
    for plant in plants {
        let name = normalize(&plant.name);
        if name.is_empty() {
            continue;
        }
        let Some(index) = text.find(&name) else {
            continue;
        };
        let better = match best {
            None => true,
            Some((best_index, best_len, _)) => {
                index < best_index || (index == best_index && name.len() > best_len)
            }
        };
        if better {
            best = Some((index, name.len(), plant));
        }
    }

    best.map(|(_, _, plant)| plant)
}

/// 消息以植物名开头时去掉名字及其后的 `,:;` 与空白（"Vendula, how are you?" → "how are you?"）。
///
/// 不以名字开头时原样返回（去首尾空白）。
pub fn strip_address(text: &str, plant: &Plant) -> String {
    let trimmed = text.trim_start();
    let name = normalize(&plant.name);
    if name.is_empty() {
        return text.trim().to_string();
    }

    // 逐字符累积前缀，直到其规范化结果等于名字；规范化会改变长度，不能直接按字节切
    let mut end = None;
    for (idx, c) in trimmed.char_indices() {
        let prefix_end = idx + c.len_utf8();
        let prefix = normalize(&trimmed[..prefix_end]);
        if prefix == name {
            end = Some(prefix_end);
            // 继续吞掉紧随名字的组合记号
            continue;
        }
        if end.is_some() || prefix.len() > name.len() {
            break;
        }
    }

    match end {
        Some(end) => trimmed[end..]
            .trim_start_matches(|c: char| c == ',' || c == ':' || c == ';' || c.is_whitespace())
            .trim_end()
            .to_string(),
        None => text.trim().to_string(),
    }
}
