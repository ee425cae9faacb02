use serde::{Deserialize, Serialize};

/// 目标语言类型
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub enum TargetLanguage {
    #[serde(rename = "zh")]
    #[default]
    Chinese,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "ko")]
    Korean,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "ru")]
    Russian,
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetLanguage::Chinese => write!(f, "zh"),
            TargetLanguage::English => write!(f, "en"),
            TargetLanguage::Japanese => write!(f, "ja"),
            TargetLanguage::Korean => write!(f, "ko"),
            TargetLanguage::German => write!(f, "de"),
            TargetLanguage::French => write!(f, "fr"),
            TargetLanguage::Russian => write!(f, "ru"),
        }
    }
}

impl std::str::FromStr for TargetLanguage {
    type Err = crate::config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "zh" | "chinese" | "中文" => Ok(TargetLanguage::Chinese),
            "en" | "english" | "英文" => Ok(TargetLanguage::English),
            "ja" | "japanese" | "日本語" | "日文" => Ok(TargetLanguage::Japanese),
            "ko" | "korean" | "한국어" | "韩文" => Ok(TargetLanguage::Korean),
            "de" | "german" | "deutsch" | "德文" => Ok(TargetLanguage::German),
            "fr" | "french" | "français" | "法文" => Ok(TargetLanguage::French),
            "ru" | "russian" | "русский" | "俄文" => Ok(TargetLanguage::Russian),
            _ => Err(crate::config::ConfigError::UnknownTargetLanguage(
                s.to_string(),
            )),
        }
    }
}

impl TargetLanguage {
    /// 获取语言的提示词指令，追加在每个系统提示词之后
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => "请使用中文输出，确保语言表达准确、客观、易于理解。",
            TargetLanguage::English => {
                "Please write your output in English, ensuring accurate, neutral, and easy-to-understand language."
            }
            TargetLanguage::Japanese => {
                "日本語で出力してください。正確で中立的かつ理解しやすい言語表現を心がけてください。"
            }
            TargetLanguage::Korean => {
                "한국어로 출력해 주세요. 정확하고 중립적이며 이해하기 쉬운 언어 표현을 사용해 주세요."
            }
            TargetLanguage::German => {
                "Bitte verfassen Sie Ihre Ausgabe auf Deutsch und achten Sie auf eine präzise, neutrale und leicht verständliche Sprache."
            }
            TargetLanguage::French => {
                "Veuillez rédiger votre réponse en français, en veillant à un langage précis, neutre et facile à comprendre."
            }
            TargetLanguage::Russian => {
                "Пожалуйста, пишите ответ на русском языке, обеспечив точность, нейтральность и понятность изложения."
            }
        }
    }

    /// 润色后文章开头概要章节的标题
    pub fn lead_section_heading(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => "概要",
            TargetLanguage::English => "summary",
            TargetLanguage::Japanese => "概要",
            TargetLanguage::Korean => "요약",
            TargetLanguage::German => "Zusammenfassung",
            TargetLanguage::French => "Résumé",
            TargetLanguage::Russian => "Аннотация",
        }
    }

    /// 默认视角，始终位于视角列表的第一位
    pub fn default_persona(&self) -> &'static str {
        match self {
            TargetLanguage::Chinese => {
                "基础事实撰写者：专注于广泛覆盖该主题的基础事实的撰写者。"
            }
            _ => {
                "Basic fact writer: Basic fact writer focusing on broadly covering the basic facts about the topic."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_language_from_str() {
        assert_eq!("zh".parse::<TargetLanguage>().unwrap(), TargetLanguage::Chinese);
        assert_eq!("English".parse::<TargetLanguage>().unwrap(), TargetLanguage::English);
        assert_eq!("日文".parse::<TargetLanguage>().unwrap(), TargetLanguage::Japanese);
        assert!("klingon".parse::<TargetLanguage>().is_err());
    }

    #[test]
    fn test_localized_strings() {
        assert_eq!(TargetLanguage::Chinese.lead_section_heading(), "概要");
        assert_eq!(TargetLanguage::English.lead_section_heading(), "summary");
        assert!(TargetLanguage::Chinese.default_persona().starts_with("基础事实撰写者"));
        assert!(TargetLanguage::German.default_persona().starts_with("Basic fact writer"));
    }
}
