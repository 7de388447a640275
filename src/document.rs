//! Capture document model.
//!
//! A [`CaptureDocument`] is the note being assembled from voice, photo, video
//! and link captures. It is owned by a [`DocumentHandle`] so the orchestrator
//! can mutate it while the HTTP layer reads status for display.

use crate::fields::MAX_TAGS;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

/// Max characters kept by the offline summary.
pub const OFFLINE_SUMMARY_MAX_CHARS: usize = 400;

/// Characters of transcript used when a title has to be derived locally.
pub const FALLBACK_TITLE_CHARS: usize = 15;

/// Default tag color, matches what the journaling UI renders for new tags.
const DEFAULT_TAG_COLOR: &str = "#999999";

/// Seconds since the Unix epoch.
fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Convert days since 1970-01-01 into a proleptic Gregorian (year, month, day).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// UTC timestamp for the current instant, e.g. `2025-02-05T12:00:00Z`.
pub fn now_iso8601() -> String {
    let secs = unix_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let tod = secs % 86_400;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        tod / 3600,
        (tod % 3600) / 60,
        tod % 60
    )
}

/// Current UTC date as `YYYY-MM-DD`.
pub fn today_utc() -> String {
    let (year, month, day) = civil_from_days((unix_secs() / 86_400) as i64);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// AI analysis status of a document.
///
/// Moves forward only: `idle → requesting → {success, unauthorized, payment_required, error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStatus {
    #[default]
    Idle,
    Requesting,
    Success,
    Unauthorized,
    PaymentRequired,
    Error,
}

impl AiStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Unauthorized | Self::PaymentRequired | Self::Error
        )
    }

    pub fn can_transition_to(self, next: AiStatus) -> bool {
        match self {
            Self::Idle => next == Self::Requesting,
            Self::Requesting => next.is_terminal(),
            _ => false,
        }
    }

    /// Short banner text shown next to the note.
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "空闲",
            Self::Requesting => "请求中",
            Self::Success => "成功",
            Self::Unauthorized => "未授权",
            Self::PaymentRequired => "需付费",
            Self::Error => "错误",
        }
    }

    /// Explanatory hint, only for the statuses the user can act on.
    pub fn hint(self) -> Option<&'static str> {
        match self {
            Self::Unauthorized => Some("AI 服务未授权：请检查是否已配置有效的 DASHSCOPE_API_KEY"),
            Self::PaymentRequired => Some("AI 服务额度不足：请充值或更换 API 密钥后重新提交"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Video,
}

impl MediaKind {
    /// Parse a form-field value into a media kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "audio" => Some(Self::Audio),
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

/// A medium attached to a document. Bytes live in the media store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub content_ref: String,
    /// Poster frame captured when a video is attached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,
    pub created_at: String,
}

impl MediaRef {
    pub fn new(kind: MediaKind, content_ref: impl Into<String>) -> Self {
        Self {
            kind,
            content_ref: content_ref.into(),
            thumbnail_ref: None,
            created_at: now_iso8601(),
        }
    }

    pub fn with_thumbnail(mut self, thumbnail_ref: impl Into<String>) -> Self {
        self.thumbnail_ref = Some(thumbnail_ref.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color_hex: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            color_hex: DEFAULT_TAG_COLOR.to_string(),
        }
    }
}

/// The note under construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureDocument {
    pub id: Uuid,
    pub created_at: String,
    pub title: String,
    pub body_text: String,
    pub transcript: String,
    pub summary: String,
    pub integrated_summary: String,
    pub visual_description: String,
    pub visual_transcript: String,
    pub link_url: String,
    /// Page text fetched for `link_url`; feeds the combined analysis mode.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_body: String,
    pub status: AiStatus,
    pub is_draft: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub media: Vec<MediaRef>,
}

impl Default for CaptureDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDocument {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now_iso8601(),
            title: String::new(),
            body_text: String::new(),
            transcript: String::new(),
            summary: String::new(),
            integrated_summary: String::new(),
            visual_description: String::new(),
            visual_transcript: String::new(),
            link_url: String::new(),
            link_body: String::new(),
            status: AiStatus::Idle,
            is_draft: true,
            tags: Vec::new(),
            media: Vec::new(),
        }
    }

    /// Move to `next` if the transition is forward. Returns whether it applied.
    pub fn set_status(&mut self, next: AiStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            warn!(
                "Document {}: rejected status transition {:?} -> {:?}",
                self.id, self.status, next
            );
            false
        }
    }

    pub fn attach(&mut self, media: MediaRef) {
        self.media.push(media);
    }

    pub fn media_of(&self, kind: MediaKind) -> impl Iterator<Item = &MediaRef> {
        self.media.iter().filter(move |m| m.kind == kind)
    }

    pub fn has_media(&self, kind: MediaKind) -> bool {
        self.media_of(kind).next().is_some()
    }

    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    /// Locally computed substitute summary: body, transcript and visual
    /// description (non-empty ones, newline separated), trimmed and capped.
    pub fn offline_summary(&self) -> String {
        let joined = [&self.body_text, &self.transcript, &self.visual_description]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        joined
            .trim()
            .chars()
            .take(OFFLINE_SUMMARY_MAX_CHARS)
            .collect()
    }

    /// Assign the offline summary, but only while no summary of either kind exists.
    /// Returns true if the summary was written.
    pub fn apply_offline_summary(&mut self) -> bool {
        if !self.summary.is_empty() || !self.integrated_summary.is_empty() {
            return false;
        }
        let offline = self.offline_summary();
        if offline.is_empty() {
            return false;
        }
        self.summary = offline;
        true
    }

    /// Derive a title when the model did not provide one.
    pub fn apply_title_fallback(&mut self) {
        if !self.title.is_empty() {
            return;
        }
        if let Some(first_line) = self.body_text.lines().map(str::trim).find(|l| !l.is_empty()) {
            self.title = first_line.to_string();
        } else if !self.transcript.trim().is_empty() {
            self.title = self
                .transcript
                .trim()
                .chars()
                .take(FALLBACK_TITLE_CHARS)
                .collect();
        }
    }

    /// Whether the document was created on the given `YYYY-MM-DD` UTC date.
    pub fn created_on(&self, date: &str) -> bool {
        self.created_at.starts_with(date)
    }
}

/// User edits applied from the confirm screen right before finalizing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoteEdits {
    pub title: Option<String>,
    pub body_text: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub integrated_summary: Option<String>,
    pub visual_description: Option<String>,
    pub visual_transcript: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl NoteEdits {
    /// Apply edits. Explicit user edits may clear a field; tag edits keep
    /// existing tag identities where the name matches and are capped at [`MAX_TAGS`].
    pub fn apply(self, doc: &mut CaptureDocument) {
        let targets = [
            (self.title, &mut doc.title),
            (self.body_text, &mut doc.body_text),
            (self.transcript, &mut doc.transcript),
            (self.summary, &mut doc.summary),
            (self.integrated_summary, &mut doc.integrated_summary),
            (self.visual_description, &mut doc.visual_description),
            (self.visual_transcript, &mut doc.visual_transcript),
        ];
        for (edit, field) in targets {
            if let Some(value) = edit {
                *field = value;
            }
        }

        if let Some(names) = self.tags {
            let mut tags: Vec<Tag> = Vec::new();
            for name in names {
                if tags.len() == MAX_TAGS {
                    break;
                }
                if name.trim().is_empty() || tags.iter().any(|t| t.name == name) {
                    continue;
                }
                let tag = doc
                    .tags
                    .iter()
                    .find(|t| t.name == name)
                    .cloned()
                    .unwrap_or_else(|| Tag::new(name));
                tags.push(tag);
            }
            doc.tags = tags;
        }
    }
}

/// Shared handle to a document: single writer (orchestrator), many readers.
///
/// Locks are only held for short synchronous sections, never across an await.
#[derive(Debug, Clone)]
pub struct DocumentHandle {
    inner: Arc<RwLock<CaptureDocument>>,
    abandoned: Arc<AtomicBool>,
}

impl DocumentHandle {
    pub fn new(doc: CaptureDocument) -> Self {
        Self {
            inner: Arc::new(RwLock::new(doc)),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.read().id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, CaptureDocument> {
        self.inner.read().unwrap()
    }

    pub fn snapshot(&self) -> CaptureDocument {
        self.read().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut CaptureDocument) -> R) -> R {
        let mut doc = self.inner.write().unwrap();
        f(&mut doc)
    }

    /// Mark the capture session as cancelled. No further gateway calls are issued.
    pub fn abandon(&self) {
        self.abandoned.store(true, Ordering::SeqCst);
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

/// JSON view returned to clients: the document plus status presentation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: CaptureDocument,
    pub status_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_hint: Option<&'static str>,
}

impl From<CaptureDocument> for DocumentView {
    fn from(document: CaptureDocument) -> Self {
        let status = document.status;
        Self {
            document,
            status_label: status.label(),
            status_hint: status.hint(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_civil_from_days() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_393), (2023, 2, 5));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
    }

    #[test]
    fn test_status_moves_forward_only() {
        let mut doc = CaptureDocument::new();
        assert!(!doc.set_status(AiStatus::Success));
        assert!(doc.set_status(AiStatus::Requesting));
        assert!(doc.set_status(AiStatus::PaymentRequired));
        assert!(!doc.set_status(AiStatus::Requesting));
        assert!(!doc.set_status(AiStatus::Success));
        assert_eq!(doc.status, AiStatus::PaymentRequired);
    }

    #[test]
    fn test_status_hints() {
        assert!(AiStatus::Unauthorized.hint().is_some());
        assert!(AiStatus::PaymentRequired.hint().is_some());
        assert!(AiStatus::Error.hint().is_none());
        assert_eq!(AiStatus::Requesting.label(), "请求中");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&AiStatus::PaymentRequired).unwrap();
        assert_eq!(json, "\"payment_required\"");
    }

    #[test]
    fn test_offline_summary_skips_empty_and_trims() {
        let mut doc = CaptureDocument::new();
        doc.body_text = "A".to_string();
        doc.transcript = "B\n".to_string();
        assert_eq!(doc.offline_summary(), "A\nB");
    }

    #[test]
    fn test_offline_summary_truncates_by_chars() {
        let mut doc = CaptureDocument::new();
        doc.body_text = "字".repeat(500);
        assert_eq!(doc.offline_summary().chars().count(), 400);
    }

    #[test]
    fn test_offline_summary_respects_existing_integrated_summary() {
        let mut doc = CaptureDocument::new();
        doc.body_text = "body".to_string();
        doc.integrated_summary = "I".to_string();
        assert!(!doc.apply_offline_summary());
        assert!(doc.summary.is_empty());
    }

    #[test]
    fn test_title_fallback() {
        let mut doc = CaptureDocument::new();
        doc.body_text = "\n第一行\n第二行".to_string();
        doc.apply_title_fallback();
        assert_eq!(doc.title, "第一行");

        let mut doc = CaptureDocument::new();
        doc.transcript = "今天天气很好我们一起去公园散步然后吃午饭".to_string();
        doc.apply_title_fallback();
        assert_eq!(doc.title.chars().count(), 15);
    }

    #[test]
    fn test_edits_keep_tag_identity() {
        let mut doc = CaptureDocument::new();
        let swift = Tag::new("Swift");
        let swift_id = swift.id;
        doc.tags = vec![swift, Tag::new("old")];

        NoteEdits {
            title: Some("标题".to_string()),
            tags: Some(vec!["Swift".to_string(), "新".to_string(), "Swift".to_string()]),
            ..Default::default()
        }
        .apply(&mut doc);

        assert_eq!(doc.title, "标题");
        assert_eq!(doc.tag_names(), vec!["Swift", "新"]);
        assert_eq!(doc.tags[0].id, swift_id);
    }

    #[test]
    fn test_edited_tags_are_capped() {
        let mut doc = CaptureDocument::new();
        NoteEdits {
            tags: Some(
                ["a", "", "b", "a", "c", "d", "e", "f", "g"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            ..Default::default()
        }
        .apply(&mut doc);

        assert_eq!(doc.tag_names(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_handle_abandon() {
        let handle = DocumentHandle::new(CaptureDocument::new());
        let reader = handle.clone();
        assert!(!reader.is_abandoned());
        handle.abandon();
        assert!(reader.is_abandoned());
    }
}
