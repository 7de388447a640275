//! Capture session lifecycle: drafts, submission, finalization and cancellation.

use crate::collaborators::LinkFetcher;
use crate::document::{AiStatus, CaptureDocument, DocumentHandle, MediaKind, MediaRef, NoteEdits};
use crate::error::SessionError;
use crate::media_store::MediaStore;
use crate::orchestrator::{AnalysisOrchestrator, AnalysisReport};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::info;
use uuid::Uuid;

pub struct SessionRegistry {
    drafts: RwLock<HashMap<Uuid, DocumentHandle>>,
    notes: RwLock<Vec<CaptureDocument>>,
    store: MediaStore,
    links: Arc<dyn LinkFetcher>,
    orchestrator: AnalysisOrchestrator,
}

impl SessionRegistry {
    pub fn new(
        store: MediaStore,
        links: Arc<dyn LinkFetcher>,
        orchestrator: AnalysisOrchestrator,
    ) -> Self {
        Self {
            drafts: RwLock::new(HashMap::new()),
            notes: RwLock::new(Vec::new()),
            store,
            links,
            orchestrator,
        }
    }

    pub fn create(&self) -> CaptureDocument {
        let doc = CaptureDocument::new();
        info!("Session created: {}", doc.id);
        self.drafts
            .write()
            .unwrap()
            .insert(doc.id, DocumentHandle::new(doc.clone()));
        doc
    }

    /// A draft or finalized note by id.
    pub fn get(&self, id: Uuid) -> Result<CaptureDocument, SessionError> {
        if let Some(handle) = self.drafts.read().unwrap().get(&id) {
            return Ok(handle.snapshot());
        }
        self.notes
            .read()
            .unwrap()
            .iter()
            .find(|n| n.id == id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Finalized notes, newest first.
    pub fn notes(&self) -> Vec<CaptureDocument> {
        let mut notes = self.notes.read().unwrap().clone();
        notes.reverse();
        notes
    }

    pub fn attach_media(
        &self,
        id: Uuid,
        kind: MediaKind,
        data: Vec<u8>,
        thumbnail: Option<Vec<u8>>,
    ) -> Result<CaptureDocument, SessionError> {
        if data.is_empty() {
            return Err(SessionError::InvalidInput("empty media upload".to_string()));
        }
        let handle = self.draft(id)?;
        ensure_idle(&handle)?;

        let mut media = MediaRef::new(kind, self.store.put(data));
        if kind == MediaKind::Video {
            if let Some(frame) = thumbnail.filter(|t| !t.is_empty()) {
                media = media.with_thumbnail(self.store.put(frame));
            }
        }
        info!("Session {}: attached {:?} {}", id, kind, media.content_ref);
        edit_idle(&handle, |doc| doc.attach(media))
    }

    pub fn set_text(&self, id: Uuid, text: String) -> Result<CaptureDocument, SessionError> {
        let handle = self.draft(id)?;
        edit_idle(&handle, |doc| doc.body_text = text)
    }

    /// Fetch the page body for `url` and fold it into the draft's text.
    pub async fn attach_link(&self, id: Uuid, url: &str) -> Result<CaptureDocument, SessionError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SessionError::InvalidInput("empty link".to_string()));
        }
        let handle = self.draft(id)?;
        ensure_idle(&handle)?;

        let body = self.links.fetch(url).await;
        info!("Session {}: link body {} chars", id, body.chars().count());
        edit_idle(&handle, |doc| {
            doc.link_url = url.to_string();
            doc.body_text = [body.as_str(), doc.body_text.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            doc.link_body = body;
        })
    }

    pub async fn submit(
        &self,
        id: Uuid,
    ) -> Result<(AnalysisReport, CaptureDocument), SessionError> {
        let handle = self.draft(id)?;
        let report = self.orchestrator.analyze(&handle).await?;
        Ok((report, handle.snapshot()))
    }

    /// Apply the user's edits and move the note out of the drafts.
    pub fn finalize(
        &self,
        id: Uuid,
        edits: Option<NoteEdits>,
    ) -> Result<CaptureDocument, SessionError> {
        let handle = self.draft(id)?;
        if !handle.read().status.is_terminal() {
            return Err(SessionError::NotAnalyzed(id));
        }
        let Some(handle) = self.drafts.write().unwrap().remove(&id) else {
            return Err(SessionError::NotFound(id));
        };

        let note = handle.update(|doc| {
            if let Some(edits) = edits {
                edits.apply(doc);
            }
            doc.is_draft = false;
            doc.clone()
        });
        self.notes.write().unwrap().push(note.clone());
        info!("Session {}: finalized as {:?}", id, note.title);
        Ok(note)
    }

    /// Discard a draft. An analysis in flight issues no further calls.
    pub fn cancel(&self, id: Uuid) -> Result<(), SessionError> {
        self.draft(id)?;
        let Some(handle) = self.drafts.write().unwrap().remove(&id) else {
            return Err(SessionError::NotFound(id));
        };
        handle.abandon();

        let released = self.release_media(&handle.snapshot());
        info!("Session {}: cancelled, released {} media", id, released);
        Ok(())
    }

    /// Drop stored media only the discarded draft referenced.
    fn release_media(&self, discarded: &CaptureDocument) -> usize {
        let mut in_use: HashSet<String> = HashSet::new();
        let mut collect = |doc: &CaptureDocument| {
            for m in &doc.media {
                in_use.insert(m.content_ref.clone());
                in_use.extend(m.thumbnail_ref.clone());
            }
        };
        for handle in self.drafts.read().unwrap().values() {
            collect(&*handle.read());
        }
        for note in self.notes.read().unwrap().iter() {
            collect(note);
        }

        discarded
            .media
            .iter()
            .flat_map(|m| std::iter::once(&m.content_ref).chain(m.thumbnail_ref.as_ref()))
            .filter(|r| !in_use.contains(*r))
            .filter(|r| self.store.remove(r))
            .count()
    }

    fn draft(&self, id: Uuid) -> Result<DocumentHandle, SessionError> {
        if let Some(handle) = self.drafts.read().unwrap().get(&id) {
            return Ok(handle.clone());
        }
        if self.notes.read().unwrap().iter().any(|n| n.id == id) {
            Err(SessionError::Finalized(id))
        } else {
            Err(SessionError::NotFound(id))
        }
    }
}

/// Mutate a draft that has not been submitted yet.
fn edit_idle(
    handle: &DocumentHandle,
    f: impl FnOnce(&mut CaptureDocument),
) -> Result<CaptureDocument, SessionError> {
    handle.update(|doc| {
        if doc.status != AiStatus::Idle {
            return Err(SessionError::AlreadySubmitted(doc.id));
        }
        f(doc);
        Ok(doc.clone())
    })
}

fn ensure_idle(handle: &DocumentHandle) -> Result<(), SessionError> {
    let doc = handle.read();
    if doc.status == AiStatus::Idle {
        Ok(())
    } else {
        Err(SessionError::AlreadySubmitted(doc.id))
    }
}
