//! Instruction templates and request assembly per capture mode.
//!
//! Every template asks for Chinese output and "JSON only". That instruction
//! is advisory: replies still go through [`crate::response::extract`].

use crate::document::{CaptureDocument, MediaKind};
use crate::fields::Field;
use crate::gateway::{ContentPart, GatewayRequest};

/// Audio format tag sent alongside recorded audio.
pub const AUDIO_FORMAT: &str = "m4a";

const AUDIO_TRANSCRIPT: &str =
    r#"只输出 JSON：{"transcript": string}，内容为该音频逐字稿，不要额外文本。"#;

const AUDIO_WITH_TEXT: &str = r#"你是一个专业的语音内容分析师。请基于用户上传的音频，输出一个 JSON 对象，包含以下字段：

{
  "title": "不超过15个汉字的标题",
  "transcript": "演讲稿（删除非语义填充成分；修正无意义重复；不改写、不总结、不润色，仅做最小必要清理；若有多位说话人，请用 [说话人A]、[说话人B] 标注）",
  "summary": "80–150字的客观摘要，不得发散或添加外部信息"
}

只输出纯 JSON，不要额外文本。"#;

const VISUAL_HANDWRITTEN: &str = r#"你是专业的图文学习笔记整合助手，需严格按照以下要求整合手写笔记，输出唯一的JSON结果（无任何前置、后置或额外文本）。

请根据手写笔记图片生成JSON，各字段需满足：
1. "title"：不超过15个汉字，精准概括学习主题
2. "summary"：基于手写笔记提炼核心重点、关键信息或学习收获，500字以内
3. "visualTranscript"：准确还原图片中手写笔记的逐字稿
4. "tags"：至多5个中文简短标签，覆盖主题领域、核心概念等

注意：
- 所有内容用中文，不得添加外部信息
- 严格遵守各字段的字数限制
- 仅输出JSON，无其他任何文本"#;

const VISUAL_GENERIC: &str = r#"请基于这些图片/关键帧，只输出 JSON：{"title": string, "description": string, "summary": string, "tags": [string]}。要求：
1) title 不超过15字
2) description 详细描述图片与视频内容，500字内
3) summary 80-150字，严格如实不发散
4) tags 至多5个，中文，简短。"#;

const COMBINED_HEAD: &str = "你是专业的图文学习笔记整合助手，需严格按照以下要求整合学习资料与手写笔记，输出唯一的JSON结果（无任何前置、后置或额外文本）。\n\n首先，请阅读学习资料正文：\n";

const COMBINED_TAIL: &str = r#"
然后，请参考手写笔记图片。
请基于上述内容生成JSON，各字段需满足：
1. "title"：不超过15个汉字，精准概括学习主题
2. "integratedSummary"：仅对学习资料正文进行客观摘要，不得添加任何手写笔记内容或个人解读，500字以内
3. "summary"：结合学习资料正文与手写笔记，提炼共同核心重点、笔记补充的关键信息或学习收获，500字以内
4. "visualTranscript"：准确还原图片中手写笔记的逐字稿
5. "tags"：至多5个中文简短标签，覆盖主题领域、核心概念等

注意：
- 所有内容用中文，不得添加外部信息
- 严格遵守各字段的字数限制
- 仅输出JSON，无其他任何文本

请直接输出符合要求的JSON。"#;

const TEXT_SUMMARY: &str = "请基于以下‘输入文本(可选)’与‘音频逐字稿’，只输出 JSON：{\"summary\": string}。要求：\n1) 总结80-150字\n2) 严格如实，不发散、不杜撰\n3) 使用中文\n";

/// Which instruction template a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Audio only: `{transcript}`.
    AudioTranscript,
    /// Audio with typed text: `{title, transcript, summary}`.
    AudioWithText,
    /// Images of handwritten notes: `{title, summary, visualTranscript, tags}`.
    VisualHandwritten,
    /// Photos or video frames: `{title, description, summary, tags}`.
    VisualGeneric,
    /// Link body text plus handwritten images:
    /// `{title, integratedSummary, summary, visualTranscript, tags}`.
    Combined,
    /// Plain text: `{summary}`.
    TextSummary,
}

impl PromptMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::AudioTranscript => "audio_transcript",
            Self::AudioWithText => "audio_with_text",
            Self::VisualHandwritten => "visual_handwritten",
            Self::VisualGeneric => "visual_generic",
            Self::Combined => "combined",
            Self::TextSummary => "text_summary",
        }
    }

    /// Canonical fields this template asks the model for.
    pub fn expected_fields(self) -> &'static [Field] {
        match self {
            Self::AudioTranscript => &[Field::Transcript],
            Self::AudioWithText => &[Field::Title, Field::Transcript, Field::Summary],
            Self::VisualHandwritten => &[
                Field::Title,
                Field::Summary,
                Field::VisualTranscript,
                Field::Tags,
            ],
            Self::VisualGeneric => &[
                Field::Title,
                Field::VisualDescription,
                Field::Summary,
                Field::Tags,
            ],
            Self::Combined => &[
                Field::Title,
                Field::IntegratedSummary,
                Field::Summary,
                Field::VisualTranscript,
                Field::Tags,
            ],
            Self::TextSummary => &[Field::Summary],
        }
    }

    /// Template for an attached recording.
    pub fn for_audio(doc: &CaptureDocument) -> Self {
        if doc.body_text.trim().is_empty() {
            Self::AudioTranscript
        } else {
            Self::AudioWithText
        }
    }

    /// Template for the analysis branch, given whether any visual material was collected.
    pub fn for_analysis(doc: &CaptureDocument, has_visual: bool) -> Self {
        if !has_visual {
            Self::TextSummary
        } else if !doc.link_body.trim().is_empty() {
            Self::Combined
        } else if doc.has_media(MediaKind::Video) {
            Self::VisualGeneric
        } else {
            Self::VisualHandwritten
        }
    }
}

/// Media bytes resolved for one call.
#[derive(Debug, Clone)]
pub enum MediaPayload {
    Audio { data: Vec<u8>, format: String },
    /// A photo, or a frame standing in for a video.
    Image { data: Vec<u8> },
}

/// Instruction plus media parts for one gateway call.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub mode: PromptMode,
    pub instruction: String,
    pub media_parts: Vec<ContentPart>,
}

impl Prompt {
    /// Wire request with the instruction text first, then media in order.
    pub fn into_request(self) -> GatewayRequest {
        let mut parts = Vec::with_capacity(self.media_parts.len() + 1);
        parts.push(ContentPart::text(self.instruction));
        parts.extend(self.media_parts);
        GatewayRequest {
            operation: self.mode.label().to_string(),
            parts,
        }
    }
}

/// Build the prompt for `mode` from the document's text fields and resolved media.
pub fn build(mode: PromptMode, doc: &CaptureDocument, media: &[MediaPayload]) -> Prompt {
    let instruction = match mode {
        PromptMode::AudioTranscript => AUDIO_TRANSCRIPT.to_string(),
        PromptMode::AudioWithText => {
            format!("{}\n\n用户输入文本：\n{}", AUDIO_WITH_TEXT, doc.body_text.trim())
        }
        PromptMode::VisualHandwritten => VISUAL_HANDWRITTEN.to_string(),
        PromptMode::VisualGeneric => VISUAL_GENERIC.to_string(),
        PromptMode::Combined => {
            format!("{}{}\n{}", COMBINED_HEAD, doc.link_body.trim(), COMBINED_TAIL)
        }
        PromptMode::TextSummary => {
            let mut prompt = TEXT_SUMMARY.to_string();
            if !doc.body_text.is_empty() {
                prompt.push_str(&format!("输入文本：\n{}\n", doc.body_text));
            }
            if !doc.transcript.is_empty() {
                prompt.push_str(&format!("音频逐字稿：\n{}\n", doc.transcript));
            }
            prompt
        }
    };

    let media_parts = media
        .iter()
        .map(|payload| match payload {
            MediaPayload::Audio { data, format } => ContentPart::audio(data, format),
            MediaPayload::Image { data } => ContentPart::image(data),
        })
        .collect();

    Prompt {
        mode,
        instruction,
        media_parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MediaRef;

    #[test]
    fn test_audio_mode_depends_on_text() {
        let mut doc = CaptureDocument::new();
        assert_eq!(PromptMode::for_audio(&doc), PromptMode::AudioTranscript);
        doc.body_text = "会议要点".to_string();
        assert_eq!(PromptMode::for_audio(&doc), PromptMode::AudioWithText);
    }

    #[test]
    fn test_analysis_mode_selection() {
        let mut doc = CaptureDocument::new();
        assert_eq!(PromptMode::for_analysis(&doc, false), PromptMode::TextSummary);
        assert_eq!(
            PromptMode::for_analysis(&doc, true),
            PromptMode::VisualHandwritten
        );

        doc.attach(MediaRef::new(MediaKind::Video, "media://v"));
        assert_eq!(PromptMode::for_analysis(&doc, true), PromptMode::VisualGeneric);

        doc.link_body = "今天学习了Swift".to_string();
        assert_eq!(PromptMode::for_analysis(&doc, true), PromptMode::Combined);
        assert_eq!(PromptMode::for_analysis(&doc, false), PromptMode::TextSummary);
    }

    #[test]
    fn test_combined_embeds_link_body_only() {
        let mut doc = CaptureDocument::new();
        doc.link_body = "今天学习了Swift".to_string();
        doc.body_text = "私人备注".to_string();
        let prompt = build(PromptMode::Combined, &doc, &[]);
        assert!(prompt.instruction.contains("今天学习了Swift"));
        assert!(!prompt.instruction.contains("私人备注"));
        assert!(prompt.instruction.contains("integratedSummary"));
    }

    #[test]
    fn test_text_summary_includes_present_sources() {
        let mut doc = CaptureDocument::new();
        doc.transcript = "逐字内容".to_string();
        let prompt = build(PromptMode::TextSummary, &doc, &[]);
        assert!(prompt.instruction.contains("音频逐字稿：\n逐字内容"));
        assert!(!prompt.instruction.contains("输入文本：\n"));
    }

    #[test]
    fn test_request_puts_instruction_first_and_keeps_media_order() {
        let doc = CaptureDocument::new();
        let media = vec![
            MediaPayload::Image { data: vec![1] },
            MediaPayload::Audio {
                data: vec![2],
                format: AUDIO_FORMAT.to_string(),
            },
            MediaPayload::Image { data: vec![3] },
        ];
        let request = build(PromptMode::VisualGeneric, &doc, &media).into_request();

        assert_eq!(request.operation, "visual_generic");
        assert_eq!(request.parts.len(), 4);
        assert!(matches!(request.parts[0], ContentPart::Text { .. }));
        assert!(matches!(request.parts[1], ContentPart::ImageUrl { .. }));
        assert!(matches!(request.parts[2], ContentPart::InputAudio { .. }));
        assert!(matches!(request.parts[3], ContentPart::ImageUrl { .. }));
    }

    #[test]
    fn test_every_template_demands_json_only() {
        let mut doc = CaptureDocument::new();
        doc.body_text = "x".to_string();
        for mode in [
            PromptMode::AudioTranscript,
            PromptMode::AudioWithText,
            PromptMode::VisualHandwritten,
            PromptMode::VisualGeneric,
            PromptMode::Combined,
            PromptMode::TextSummary,
        ] {
            let prompt = build(mode, &doc, &[]);
            assert!(prompt.instruction.contains("JSON"), "{}", mode.label());
        }
    }
}
