//! Daily digest, search and multi-turn consultation over finalized notes.

use crate::document::CaptureDocument;
use crate::error::GatewayError;
use crate::gateway::{ChatGateway, GatewayRequest};
use crate::response;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::{debug, info};

const TODAY_PROMPT: &str = "你是用户的个人笔记助手。以下是用户今天记录的全部笔记，请用中文写一段今日总结：\n1) 概括今天做了什么、学到了什么\n2) 提炼值得回顾的重点\n3) 语气自然，不要杜撰笔记中没有的内容\n\n";

const SEARCH_PROMPT: &str = "你是用户的个人笔记助手。请仅根据下面的笔记内容回答用户的问题；如果笔记中没有相关信息，请直接说明没有找到。回答使用中文，并指出相关笔记的编号。\n\n";

const CONSULT_PROMPT: &str = r#"你是用户的个人笔记顾问。请结合下面的笔记和对话历史回答用户的新问题，只使用笔记中的信息，不要杜撰。
只输出 JSON：{"reply_content": string, "source_notes": [string]}。
- reply_content：给用户的中文回答
- source_notes：回答所依据笔记的标题列表，没有依据时为空数组"#;

const REPLY_KEYS: &[&str] = &["reply_content", "replyContent", "reply", "回复"];
const SOURCE_KEYS: &[&str] = &["source_notes", "sourceNotes", "sources", "来源笔记"];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DigestOutcome {
    /// No notes were created on the requested day.
    Empty,
    Summary(String),
}

/// Render notes as numbered blocks with only their non-empty fields.
pub fn format_notes(notes: &[CaptureDocument]) -> String {
    let mut out = String::new();
    for (index, note) in notes.iter().enumerate() {
        let _ = writeln!(out, "--- 笔记 {} ---", index + 1);
        if let Some(time) = note.created_at.get(11..16) {
            let _ = writeln!(out, "创建时间: {}", time);
        }

        let tags = note.tag_names().join(", ");
        let lines = [
            ("标题", note.title.as_str()),
            ("内容", note.body_text.as_str()),
            ("语音逐字稿", note.transcript.as_str()),
            ("AI总结", note.summary.as_str()),
            ("综合总结", note.integrated_summary.as_str()),
            ("视觉描述", note.visual_description.as_str()),
            ("视觉逐字稿", note.visual_transcript.as_str()),
            ("标签", tags.as_str()),
        ];
        for (label, value) in lines {
            if !value.trim().is_empty() {
                let _ = writeln!(out, "{}: {}", label, value.trim());
            }
        }
        out.push('\n');
    }
    out
}

/// Summarize the notes created on `today` (`YYYY-MM-DD`, UTC).
pub async fn summarize_today(
    gateway: &dyn ChatGateway,
    notes: &[CaptureDocument],
    today: &str,
) -> Result<DigestOutcome, GatewayError> {
    let todays: Vec<CaptureDocument> = notes
        .iter()
        .filter(|n| n.created_on(today))
        .cloned()
        .collect();
    if todays.is_empty() {
        info!("Digest: no notes on {}", today);
        return Ok(DigestOutcome::Empty);
    }

    let context = format_notes(&todays);
    info!("Digest: {} notes on {}, {} chars", todays.len(), today, context.chars().count());
    let reply = gateway
        .send(GatewayRequest::text("today_summary", format!("{}{}", TODAY_PROMPT, context)))
        .await?;
    Ok(DigestOutcome::Summary(reply.trim().to_string()))
}

/// Answer `query` from the notes. A blank query makes no call and yields `None`.
pub async fn search_notes(
    gateway: &dyn ChatGateway,
    query: &str,
    notes: &[CaptureDocument],
) -> Result<Option<String>, GatewayError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(None);
    }

    let prompt = format!("{}{}用户问题：{}", SEARCH_PROMPT, format_notes(notes), query);
    info!("Search: {:?} over {} notes", query, notes.len());
    let reply = gateway.send(GatewayRequest::text("search", prompt)).await?;
    Ok(Some(reply.trim().to_string()))
}

/// Who spoke a consultation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

/// One prior turn of a consultation, as kept by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Speaker,
    pub content: String,
    #[serde(default)]
    pub source_notes: Vec<String>,
}

/// Answer to a consultation turn, citing notes by title.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consultation {
    pub reply_content: String,
    pub source_notes: Vec<String>,
}

impl Consultation {
    /// Read `{reply_content, source_notes}` from a reply. Without a usable
    /// `reply_content` the trimmed raw reply is the answer and nothing is cited.
    pub fn from_reply(raw: &str) -> Self {
        let parsed = response::extract(raw).and_then(|obj| {
            let reply_content = response::pick(&obj, REPLY_KEYS)?;
            let source_notes = response::pick_array(&obj, SOURCE_KEYS).unwrap_or_default();
            Some(Self {
                reply_content,
                source_notes,
            })
        });
        parsed.unwrap_or_else(|| Self {
            reply_content: raw.trim().to_string(),
            source_notes: Vec::new(),
        })
    }
}

/// Render prior turns; empty when there are none.
pub fn format_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut out = String::from("对话历史：\n");
    for turn in history {
        let speaker = match turn.role {
            Speaker::User => "用户",
            Speaker::Ai => "AI",
        };
        let _ = writeln!(out, "{}: {}", speaker, turn.content.trim());
    }
    out
}

/// Ask a follow-up question with the notes and prior turns as context.
/// A blank query makes no call and yields `None`.
pub async fn consult(
    gateway: &dyn ChatGateway,
    query: &str,
    history: &[ChatTurn],
    notes: &[CaptureDocument],
) -> Result<Option<Consultation>, GatewayError> {
    let query = query.trim();
    if query.is_empty() {
        return Ok(None);
    }

    let prompt = format!(
        "{}\n\n{}\n{}用户问题：{}",
        CONSULT_PROMPT,
        format_notes(notes),
        format_history(history),
        query
    );
    info!(
        "Consult: {:?} over {} notes, {} prior turns",
        query,
        notes.len(),
        history.len()
    );
    let reply = gateway.send(GatewayRequest::text("consult", prompt)).await?;
    let consultation = Consultation::from_reply(&reply);
    debug!("Consult cited {:?}", consultation.source_notes);
    Ok(Some(consultation))
}
