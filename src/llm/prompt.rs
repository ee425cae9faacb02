//! 提示词模板：系统指令 + 带前缀的输入字段 + 输出提示

use anyhow::Result;

use crate::i18n::TargetLanguage;
use crate::llm::LanguageModel;
use crate::utils::text::trim_output_after_hint;

/// Prompt模板配置
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// 系统提示词
    pub system_prompt: String,
    /// 输出前的提示语，模型复述时会被裁掉
    pub output_hint: String,
}

/// 模板的一个输入字段
#[derive(Debug, Clone, Copy)]
pub struct PromptField<'a> {
    pub prefix: &'a str,
    pub value: &'a str,
}

impl<'a> PromptField<'a> {
    pub fn new(prefix: &'a str, value: &'a str) -> Self {
        Self { prefix, value }
    }
}

impl PromptTemplate {
    pub fn new(system_prompt: impl Into<String>, output_hint: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            output_hint: output_hint.into(),
        }
    }

    /// 系统提示词末尾追加目标语言指令
    pub fn render_system_prompt(&self, language: &TargetLanguage) -> String {
        format!("{}\n\n{}", self.system_prompt.trim(), language.prompt_instruction())
    }

    /// 按顺序拼接输入字段，最后附上输出提示
    pub fn render_user_prompt(&self, fields: &[PromptField<'_>]) -> String {
        let mut prompt = String::new();
        for field in fields {
            prompt.push_str(field.prefix);
            if !field.prefix.ends_with('\n') && !field.prefix.ends_with(' ') {
                prompt.push(' ');
            }
            prompt.push_str(field.value);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&self.output_hint);
        prompt
    }

    /// 调用模型并裁掉被复述的输出提示
    pub async fn invoke(
        &self,
        lm: &dyn LanguageModel,
        language: &TargetLanguage,
        fields: &[PromptField<'_>],
    ) -> Result<String> {
        let system_prompt = self.render_system_prompt(language);
        let user_prompt = self.render_user_prompt(fields);
        let output = lm.complete(&system_prompt, &user_prompt).await?;
        Ok(trim_output_after_hint(&output, self.output_hint.trim()).trim().to_string())
    }
}
