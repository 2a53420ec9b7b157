// ABOUTME: File reconciliation service linking external file ids to local files and messages
// ABOUTME: External file id is the natural key; every operation is an idempotent upsert
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::database::AttachmentManager;
use crate::errors::{AppError, AppResult};
use crate::models::{AttachmentReference, MessageContent};

/// Cross-references between local files, external file ids, and messages
#[derive(Clone)]
pub struct FileReconciler {
    attachments: AttachmentManager,
}

impl FileReconciler {
    /// Create the service
    #[must_use]
    pub const fn new(attachments: AttachmentManager) -> Self {
        Self { attachments }
    }

    /// Link an external file to a message, creating a bare reference if none exists
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for blank ids or a store error
    pub async fn link_or_create(
        &self,
        external_file_id: &str,
        message_id: &str,
    ) -> AppResult<AttachmentReference> {
        require_non_blank("external file id", external_file_id)?;
        require_non_blank("message id", message_id)?;
        self.attachments
            .link_or_create(external_file_id, message_id)
            .await
    }

    /// Register an uploaded local file under its external id
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for blank ids, `FilePermissionDenied` when the
    /// external id is registered to another user, or a store error
    pub async fn attach_local_file(
        &self,
        local_file_id: &str,
        external_file_id: &str,
        owner_id: &str,
    ) -> AppResult<AttachmentReference> {
        require_non_blank("local file id", local_file_id)?;
        require_non_blank("external file id", external_file_id)?;
        let reference = self
            .attachments
            .attach_local_file(local_file_id, external_file_id, owner_id)
            .await?
            .ok_or_else(|| {
                warn!(external_file_id, owner_id, "Rejected file registration by non-owner");
                AppError::file_permission_denied(external_file_id)
            })?;
        debug!(local_file_id, external_file_id, owner_id, "Registered local file");
        Ok(reference)
    }

    /// Link every image part of `content` to the message
    ///
    /// A failed link is logged and skipped; the message itself is already stored.
    pub async fn link_message_attachments(
        &self,
        message_id: &str,
        content: &MessageContent,
    ) -> Vec<AttachmentReference> {
        let mut linked = Vec::new();
        for file_id in content.image_file_ids() {
            match self.link_or_create(file_id, message_id).await {
                Ok(reference) => linked.push(reference),
                Err(e) => warn!(message_id, file_id, error = %e, "Failed to link attachment"),
            }
        }
        linked
    }

    /// References linked to a message
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn find_by_message(&self, message_id: &str) -> AppResult<Vec<AttachmentReference>> {
        self.attachments.find_by_message(message_id).await
    }

    /// References of every message in a thread, grouped by message id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn find_by_thread(
        &self,
        thread_id: &str,
    ) -> AppResult<HashMap<String, Vec<AttachmentReference>>> {
        let mut by_message: HashMap<String, Vec<AttachmentReference>> = HashMap::new();
        for reference in self.attachments.find_by_thread(thread_id).await? {
            if let Some(message_id) = reference.message_id.clone() {
                by_message.entry(message_id).or_default().push(reference);
            }
        }
        Ok(by_message)
    }

    /// Reference for an external file id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn get_by_external_id(
        &self,
        external_file_id: &str,
    ) -> AppResult<Option<AttachmentReference>> {
        self.attachments.get_by_external_id(external_file_id).await
    }
}

fn require_non_blank(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_input(format!("{field} must not be empty")));
    }
    Ok(())
}
