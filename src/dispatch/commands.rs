//! 斜杠命令解析：/start /help /plants /status /summary /care

/// 群聊中的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// 列出所有植物
    Plants,
    /// 每株植物立即发一条状态通知（不受冷却限制）
    Status,
    /// 每株植物一句话总结 + 湿度评估
    Summary,
    /// 每株植物一条照料建议
    Care,
    Unknown(String),
}

impl Command {
    /// 以 `/` 开头才是命令；支持 `/status@PlantBot` 形式，忽略参数
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or_default().to_lowercase();
        let cmd = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "plants" => Self::Plants,
            "status" => Self::Status,
            "summary" => Self::Summary,
            "care" => Self::Care,
            _ => Self::Unknown(name),
        };
        Some(cmd)
    }
}

pub const START_TEXT: &str =
    "Hi! I'm just a messenger. I will relay messages to plants while you are out!";

pub const HELP_TEXT: &str = "I can help you communicate with your plants!\n\n\
Available commands:\n\
/start - Start the bot\n\
/help - Show this help message\n\
/status - Check the status of all plants\n\
/summary - One-line summary of every plant\n\
/care - Care recommendation for every plant\n\
/plants - List available plants\n\n\
To chat with a specific plant, mention their name:\n\
Example: 'Vendula, how are you feeling today?'";

pub const NO_PLANTS_TEXT: &str = "No plants are registered with the bot yet.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("  /HELP  "), Some(Command::Help));
        assert_eq!(Command::parse("/status@PlantBot now"), Some(Command::Status));
        assert_eq!(Command::parse("/plants"), Some(Command::Plants));
        assert_eq!(Command::parse("/summary"), Some(Command::Summary));
        assert_eq!(Command::parse("/care@PlantBot"), Some(Command::Care));
        assert_eq!(
            Command::parse("/water Vendula"),
            Some(Command::Unknown("water".to_string()))
        );
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(Command::parse("Vendula /status"), None);
        assert_eq!(Command::parse(""), None);
    }
}
