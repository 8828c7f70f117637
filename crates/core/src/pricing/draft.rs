//! Unsubmitted price edits.
//!
//! A [`Draft`] is owned by whoever is editing a price: an interactive
//! editor, a batch script. It survives restarts through a [`DraftStore`] and
//! is cleared once the edit is submitted.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use pricebook_shared::types::UserId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::service::PendingPriceInput;
use super::types::{PriceAmounts, PriceTier, SubjectKey};
use crate::currency::{LinkageMode, LinkedAmountEditor};

/// Errors raised by draft stores.
#[derive(Debug, Error)]
pub enum DraftError {
    /// Filesystem failure.
    #[error("Draft I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored draft is not valid JSON.
    #[error("Draft serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A field required for submission is missing.
    #[error("Draft is missing {0}")]
    Incomplete(&'static str),
}

/// Identifies one editor's draft for one subject and tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftKey {
    /// Editor.
    pub owner: UserId,
    /// Subject being edited.
    pub subject: SubjectKey,
    /// Tier being edited.
    pub tier: PriceTier,
}

impl DraftKey {
    /// Filesystem-safe name for the draft.
    #[must_use]
    pub fn file_name(&self) -> String {
        let subject = self.subject.to_string().replace(':', "_");
        format!("{}_{}_{}.json", self.owner, subject, self.tier)
    }
}

/// Saved state of a pending price form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDraft {
    /// Entered amounts.
    pub amounts: PriceAmounts,
    /// Entered IDR per 1 CNY.
    pub exchange_rate: Option<Decimal>,
    /// Linkage mode in use.
    #[serde(default)]
    pub linkage: LinkageMode,
    /// Business-local start, `YYYY-MM-DDTHH:mm`.
    pub effective_from_local: Option<String>,
    /// Entered reason.
    pub reason: Option<String>,
}

impl PriceDraft {
    /// Captures the state of a linked editor.
    #[must_use]
    pub fn from_editor(editor: &LinkedAmountEditor) -> Self {
        Self {
            amounts: editor.amounts().clone(),
            exchange_rate: editor.rate(),
            linkage: editor.mode(),
            ..Self::default()
        }
    }

    /// Rebuilds a linked editor from the draft.
    #[must_use]
    pub fn editor(&self) -> LinkedAmountEditor {
        LinkedAmountEditor::new(self.linkage, self.exchange_rate, self.amounts.clone())
    }

    /// Turns the draft into a submission.
    pub fn into_input(self, changed_by: Option<UserId>) -> Result<PendingPriceInput, DraftError> {
        let effective_from_local = self
            .effective_from_local
            .ok_or(DraftError::Incomplete("effective_from_local"))?;
        Ok(PendingPriceInput {
            amounts: self.amounts,
            exchange_rate: self.exchange_rate,
            effective_from_local,
            linkage: self.linkage,
            reason: self.reason,
            changed_by,
            ..PendingPriceInput::new(PriceAmounts::new(), String::new())
        })
    }
}

/// Durable storage for drafts.
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Stores `draft`, replacing any previous one.
    async fn save(&self, key: &DraftKey, draft: &PriceDraft) -> Result<(), DraftError>;

    /// Returns the stored draft, if any.
    async fn load(&self, key: &DraftKey) -> Result<Option<PriceDraft>, DraftError>;

    /// Removes the stored draft. Clearing a missing draft is not an error.
    async fn clear(&self, key: &DraftKey) -> Result<(), DraftError>;
}

/// Draft store backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDraftStore {
    drafts: Arc<DashMap<DraftKey, PriceDraft>>,
}

impl InMemoryDraftStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn save(&self, key: &DraftKey, draft: &PriceDraft) -> Result<(), DraftError> {
        self.drafts.insert(*key, draft.clone());
        Ok(())
    }

    async fn load(&self, key: &DraftKey) -> Result<Option<PriceDraft>, DraftError> {
        Ok(self.drafts.get(key).map(|entry| entry.value().clone()))
    }

    async fn clear(&self, key: &DraftKey) -> Result<(), DraftError> {
        self.drafts.remove(key);
        Ok(())
    }
}

/// Draft store writing one JSON file per draft into a directory.
#[derive(Debug, Clone)]
pub struct JsonFileDraftStore {
    dir: PathBuf,
}

impl JsonFileDraftStore {
    /// Stores drafts under `dir`, created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, key: &DraftKey) -> PathBuf {
        self.dir.join(key.file_name())
    }
}

#[async_trait]
impl DraftStore for JsonFileDraftStore {
    async fn save(&self, key: &DraftKey, draft: &PriceDraft) -> Result<(), DraftError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(draft)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, key: &DraftKey) -> Result<Option<PriceDraft>, DraftError> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn clear(&self, key: &DraftKey) -> Result<(), DraftError> {
        match tokio::fs::remove_file(self.path(key)).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// One editor's draft handle.
#[derive(Debug, Clone)]
pub struct Draft<D> {
    key: DraftKey,
    store: D,
}

impl<D: DraftStore> Draft<D> {
    /// Binds `key` to `store`.
    pub fn new(store: D, key: DraftKey) -> Self {
        Self { key, store }
    }

    /// The draft's key.
    pub fn key(&self) -> &DraftKey {
        &self.key
    }

    /// Saves the current form state.
    pub async fn save(&self, draft: &PriceDraft) -> Result<(), DraftError> {
        self.store.save(&self.key, draft).await
    }

    /// Restores the saved form state, if any.
    pub async fn load(&self) -> Result<Option<PriceDraft>, DraftError> {
        self.store.load(&self.key).await
    }

    /// Discards the saved form state.
    pub async fn clear(&self) -> Result<(), DraftError> {
        self.store.clear(&self.key).await
    }
}
