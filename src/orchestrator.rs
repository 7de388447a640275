//! Analysis orchestration for a submitted capture document.
//!
//! One submit runs: audio transcription (with local fallback), then one
//! visual/combined or plain-text call. Every gateway failure ends up as
//! document status plus an offline summary; nothing escapes to the caller.

use crate::collaborators::{FrameExtractor, SpeechRecognizer};
use crate::document::{AiStatus, DocumentHandle, MediaKind};
use crate::error::SessionError;
use crate::fields::{self, ExtractedFields, Field};
use crate::gateway::ChatGateway;
use crate::media_store::MediaStore;
use crate::prompts::{self, MediaPayload, PromptMode, AUDIO_FORMAT};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one submit did, returned alongside the document.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub status: AiStatus,
    /// Template used by the final call, if one was made.
    pub mode: Option<&'static str>,
    pub calls: usize,
    /// Fields merged from model replies, in merge order per call.
    pub applied: Vec<Field>,
    pub offline_fallback: bool,
    pub local_transcription: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub abandoned: bool,
}

impl AnalysisReport {
    fn new() -> Self {
        Self {
            status: AiStatus::Requesting,
            mode: None,
            calls: 0,
            applied: Vec::new(),
            offline_fallback: false,
            local_transcription: false,
            error: None,
            abandoned: false,
        }
    }
}

pub struct AnalysisOrchestrator {
    gateway: Arc<dyn ChatGateway>,
    store: MediaStore,
    speech: Arc<dyn SpeechRecognizer>,
    frames: Arc<dyn FrameExtractor>,
}

impl AnalysisOrchestrator {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        store: MediaStore,
        speech: Arc<dyn SpeechRecognizer>,
        frames: Arc<dyn FrameExtractor>,
    ) -> Self {
        Self {
            gateway,
            store,
            speech,
            frames,
        }
    }

    /// Analyze an idle document. Fails only if the document was already submitted.
    pub async fn analyze(&self, handle: &DocumentHandle) -> Result<AnalysisReport, SessionError> {
        handle.update(|doc| {
            if doc.status != AiStatus::Idle {
                return Err(SessionError::AlreadySubmitted(doc.id));
            }
            doc.set_status(AiStatus::Requesting);
            Ok(())
        })?;

        let id = handle.id();
        info!("Analysis start: document {}", id);
        let mut report = AnalysisReport::new();

        if !self.transcribe_audio(handle, &mut report).await {
            return Ok(abandoned(report, id));
        }
        if !self.analyze_content(handle, &mut report).await {
            return Ok(abandoned(report, id));
        }

        handle.update(|doc| doc.apply_title_fallback());
        info!(
            "Analysis done: document {}, status={:?}, calls={}, offline_fallback={}",
            id, report.status, report.calls, report.offline_fallback
        );
        Ok(report)
    }

    /// Audio step. One call per recording; failures never touch the status.
    /// Returns false if the session was abandoned.
    async fn transcribe_audio(&self, handle: &DocumentHandle, report: &mut AnalysisReport) -> bool {
        let recordings: Vec<_> = handle.read().media_of(MediaKind::Audio).cloned().collect();

        for recording in recordings {
            let Some(audio) = self.store.get(&recording.content_ref) else {
                warn!("Audio {} missing from media store, skipped", recording.content_ref);
                continue;
            };
            if handle.is_abandoned() {
                return false;
            }

            let doc = handle.snapshot();
            let mode = PromptMode::for_audio(&doc);
            let payload = MediaPayload::Audio {
                data: audio.to_vec(),
                format: AUDIO_FORMAT.to_string(),
            };
            let request = prompts::build(mode, &doc, &[payload]).into_request();

            report.calls += 1;
            let transcribed = match self.gateway.send(request).await {
                Ok(reply) => {
                    let extracted = ExtractedFields::from_reply(&reply, mode.expected_fields());
                    let applied = handle.update(|doc| fields::apply(extracted.as_ref(), doc));
                    let has_transcript = applied.contains(&Field::Transcript);
                    report.applied.extend(applied);
                    has_transcript
                }
                Err(e) => {
                    warn!("Audio analysis failed ({}), using local transcription", e);
                    false
                }
            };

            if !transcribed {
                if let Some(text) = self.speech.transcribe(&audio).await {
                    info!(
                        "Local transcription via {}: {} chars",
                        self.speech.name(),
                        text.chars().count()
                    );
                    handle.update(|doc| {
                        doc.transcript.push_str(&text);
                        doc.transcript.push('\n');
                    });
                    report.local_transcription = true;
                }
            }
        }
        true
    }

    /// Visual, combined or plain-text step; sets the terminal status.
    /// Returns false if the session was abandoned.
    async fn analyze_content(&self, handle: &DocumentHandle, report: &mut AnalysisReport) -> bool {
        let visual = self.collect_visual(handle).await;
        let doc = handle.snapshot();
        let mode = PromptMode::for_analysis(&doc, !visual.is_empty());
        info!(
            "Analysis branch for {}: {} ({} visual items)",
            doc.id,
            mode.label(),
            visual.len()
        );

        if mode == PromptMode::TextSummary
            && doc.body_text.trim().is_empty()
            && doc.transcript.trim().is_empty()
        {
            info!("Nothing to summarize for {}, no call made", doc.id);
            self.finish(handle, report, AiStatus::Success);
            return true;
        }
        if handle.is_abandoned() {
            return false;
        }

        let request = prompts::build(mode, &doc, &visual).into_request();
        report.mode = Some(mode.label());
        report.calls += 1;

        match self.gateway.send(request).await {
            Ok(reply) => {
                let extracted = ExtractedFields::from_reply(&reply, mode.expected_fields());
                debug!(
                    "{} reply for {}: fields {:?}",
                    mode.label(),
                    doc.id,
                    extracted.as_ref().map(ExtractedFields::provided)
                );
                let (applied, offline) = handle.update(|doc| {
                    let applied = fields::apply(extracted.as_ref(), doc);
                    // Runs after every merge; a no-op once any summary exists.
                    let offline = doc.apply_offline_summary();
                    if mode == PromptMode::TextSummary && doc.summary.is_empty() {
                        doc.summary = reply.trim().to_string();
                    }
                    (applied, offline)
                });
                if applied.is_empty() {
                    warn!("No usable fields in {} reply for {}", mode.label(), doc.id);
                }
                report.applied.extend(applied);
                report.offline_fallback = offline;
                self.finish(handle, report, AiStatus::Success);
            }
            Err(e) => {
                let status = e.status();
                warn!("{} call failed for {}: {} -> {:?}", mode.label(), doc.id, e, status);
                report.offline_fallback = handle.update(|doc| doc.apply_offline_summary());
                report.error = Some(e.to_string());
                self.finish(handle, report, status);
            }
        }
        true
    }

    /// Image bytes plus one frame per video, in attachment order.
    async fn collect_visual(&self, handle: &DocumentHandle) -> Vec<MediaPayload> {
        let media: Vec<_> = handle
            .read()
            .media
            .iter()
            .filter(|m| m.kind != MediaKind::Audio)
            .cloned()
            .collect();

        let mut visual = Vec::with_capacity(media.len());
        for item in media {
            let data = match item.kind {
                MediaKind::Image => self.store.get(&item.content_ref).map(|d| d.to_vec()),
                MediaKind::Video => self.frames.extract_frame(&item).await,
                MediaKind::Audio => None,
            };
            match data {
                Some(data) => visual.push(MediaPayload::Image { data }),
                None => warn!("No visual data for {:?} {}", item.kind, item.content_ref),
            }
        }
        visual
    }

    fn finish(&self, handle: &DocumentHandle, report: &mut AnalysisReport, status: AiStatus) {
        handle.update(|doc| doc.set_status(status));
        report.status = status;
    }
}

fn abandoned(mut report: AnalysisReport, id: uuid::Uuid) -> AnalysisReport {
    info!("Analysis stopped: document {} was abandoned", id);
    report.abandoned = true;
    report
}
