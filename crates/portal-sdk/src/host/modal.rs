use serde::Serialize;

use crate::protocol::{ModalContent, ModalDisplayOptions, ShowModalPayload};
use crate::utils::time::now_millis;

/// A modal the host is currently displaying on behalf of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalRequest {
    pub id: String,
    pub app_id: String,
    pub content: ModalContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_options: Option<ModalDisplayOptions>,
    pub opened_at: u64,
}

/// Open modals in the order they were requested.
#[derive(Debug, Default)]
pub(crate) struct ModalList {
    modals: Vec<ModalRequest>,
}

impl ModalList {
    /// Record a modal for `app_id`. A request reusing an id the same app
    /// already has open replaces that modal in place; an id held by another
    /// app is refused, so ids stay unique across apps.
    pub fn open(&mut self, app_id: &str, payload: ShowModalPayload) -> Option<ModalRequest> {
        let id = payload
            .modal_id
            .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());
        if self
            .modals
            .iter()
            .any(|existing| existing.id == id && existing.app_id != app_id)
        {
            return None;
        }
        let request = ModalRequest {
            id,
            app_id: app_id.to_string(),
            content: payload.content,
            display_options: payload.display_options,
            opened_at: now_millis(),
        };

        match self
            .modals
            .iter_mut()
            .find(|existing| existing.id == request.id && existing.app_id == request.app_id)
        {
            Some(existing) => *existing = request.clone(),
            None => self.modals.push(request.clone()),
        }
        Some(request)
    }

    /// Close modals owned by `app_id`: the one named by `modal_id`, or all
    /// of them when no id is given.
    pub fn close_owned(&mut self, app_id: &str, modal_id: Option<&str>) -> Vec<ModalRequest> {
        self.drain_where(|modal| {
            modal.app_id == app_id && modal_id.map_or(true, |id| modal.id == id)
        })
    }

    pub fn close_by_id(&mut self, modal_id: &str) -> Option<ModalRequest> {
        let index = self.modals.iter().position(|modal| modal.id == modal_id)?;
        Some(self.modals.remove(index))
    }

    pub fn list(&self) -> Vec<ModalRequest> {
        self.modals.clone()
    }

    fn drain_where<F>(&mut self, predicate: F) -> Vec<ModalRequest>
    where
        F: Fn(&ModalRequest) -> bool,
    {
        let (closed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.modals)
            .into_iter()
            .partition(|modal| predicate(modal));
        self.modals = kept;
        closed
    }
}
