//! Canonical note fields and the merge of extracted values into a document.

use crate::document::{CaptureDocument, Tag};
use crate::response::{self, JsonObject};
use serde::Serialize;
use tracing::debug;

/// Max tags kept from a single reply.
pub const MAX_TAGS: usize = 5;

/// Canonical document fields the model can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Title,
    Transcript,
    Summary,
    IntegratedSummary,
    VisualTranscript,
    VisualDescription,
    Tags,
}

impl Field {
    /// Merge order.
    pub const ALL: [Field; 7] = [
        Field::Title,
        Field::Transcript,
        Field::Summary,
        Field::IntegratedSummary,
        Field::VisualTranscript,
        Field::VisualDescription,
        Field::Tags,
    ];

    /// Reply keys accepted for this field, English first.
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Field::Title => &["title", "标题"],
            Field::Transcript => &["transcript", "逐字稿", "转写", "text"],
            Field::Summary => &["summary", "总结", "摘要"],
            Field::IntegratedSummary => &["integratedSummary", "综合总结", "整合总结"],
            Field::VisualTranscript => &["visualTranscript", "图片逐字稿", "手写逐字稿", "逐字稿"],
            Field::VisualDescription => &["description", "视觉描述", "图像描述"],
            Field::Tags => &["tags", "标签"],
        }
    }
}

/// Values recovered from one reply, keyed by canonical field.
/// Absent means "not provided"; empty strings never make it in here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields {
    pub title: Option<String>,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    pub integrated_summary: Option<String>,
    pub visual_transcript: Option<String>,
    pub visual_description: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ExtractedFields {
    /// Pick the `expected` fields out of a parsed reply object.
    pub fn from_object(obj: &JsonObject, expected: &[Field]) -> Self {
        let mut out = Self::default();
        for field in Field::ALL.into_iter().filter(|f| expected.contains(f)) {
            let keys = field.keys();
            match field {
                Field::Title => out.title = response::pick(obj, keys),
                Field::Transcript => out.transcript = response::pick(obj, keys),
                Field::Summary => out.summary = response::pick(obj, keys),
                Field::IntegratedSummary => out.integrated_summary = response::pick(obj, keys),
                Field::VisualTranscript => out.visual_transcript = response::pick(obj, keys),
                Field::VisualDescription => out.visual_description = response::pick(obj, keys),
                Field::Tags => out.tags = response::pick_array(obj, keys),
            }
        }
        out
    }

    /// Run the response extractor over a raw reply. `None` when the reply
    /// carries no JSON object at all.
    pub fn from_reply(raw: &str, expected: &[Field]) -> Option<Self> {
        response::extract(raw).map(|obj| Self::from_object(&obj, expected))
    }

    /// Fields that carry a value, in merge order.
    pub fn provided(&self) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|f| match f {
                Field::Title => self.title.is_some(),
                Field::Transcript => self.transcript.is_some(),
                Field::Summary => self.summary.is_some(),
                Field::IntegratedSummary => self.integrated_summary.is_some(),
                Field::VisualTranscript => self.visual_transcript.is_some(),
                Field::VisualDescription => self.visual_description.is_some(),
                Field::Tags => self.tags.is_some(),
            })
            .collect()
    }
}

/// Merge extracted fields into a document.
///
/// Never writes an empty value. The transcript is appended (with a trailing
/// newline); tags replace the previous set wholesale. Returns the fields
/// that changed the document.
pub fn apply(fields: Option<&ExtractedFields>, doc: &mut CaptureDocument) -> Vec<Field> {
    let Some(fields) = fields else {
        return Vec::new();
    };
    let mut applied = Vec::new();

    let scalars = [
        (Field::Title, &fields.title, &mut doc.title),
        (Field::Summary, &fields.summary, &mut doc.summary),
        (
            Field::IntegratedSummary,
            &fields.integrated_summary,
            &mut doc.integrated_summary,
        ),
        (
            Field::VisualTranscript,
            &fields.visual_transcript,
            &mut doc.visual_transcript,
        ),
        (
            Field::VisualDescription,
            &fields.visual_description,
            &mut doc.visual_description,
        ),
    ];
    for (field, value, target) in scalars {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            *target = value.to_string();
            applied.push(field);
        }
    }

    if let Some(transcript) = fields.transcript.as_deref().filter(|v| !v.is_empty()) {
        doc.transcript.push_str(transcript);
        doc.transcript.push('\n');
        applied.push(Field::Transcript);
    }

    if let Some(names) = fields.tags.as_deref() {
        let tags = resolve_tags(names, &doc.tags);
        if !tags.is_empty() {
            doc.tags = tags;
            applied.push(Field::Tags);
        }
    }

    // Report in canonical merge order regardless of the write order above.
    applied.sort_by_key(|f| Field::ALL.iter().position(|a| a == f));
    debug!("Merged fields into document {}: {:?}", doc.id, applied);
    applied
}

/// Resolve up to [`MAX_TAGS`] names into tags, reusing existing tags by exact name.
fn resolve_tags(names: &[String], existing: &[Tag]) -> Vec<Tag> {
    let mut tags: Vec<Tag> = Vec::with_capacity(MAX_TAGS);
    for name in names {
        if tags.len() == MAX_TAGS {
            break;
        }
        if name.trim().is_empty() || tags.iter().any(|t| &t.name == name) {
            continue;
        }
        let tag = existing
            .iter()
            .find(|t| &t.name == name)
            .cloned()
            .unwrap_or_else(|| Tag::new(name.clone()));
        tags.push(tag);
    }
    tags
}
