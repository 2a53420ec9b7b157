// ABOUTME: Thread lifecycle service binding each local conversation to exactly one external thread
// ABOUTME: Enforces external-first create and delete ordering plus ownership checks
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::assistant::{AssistantClient, RemoteThread};
use crate::database::ThreadManager;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::models::{NewThread, Thread};

/// Local record together with the external view of the same thread
#[derive(Debug, Clone, Serialize)]
pub struct ThreadDetails {
    /// Local record
    #[serde(flatten)]
    pub thread: Thread,
    /// External state
    pub remote: RemoteThread,
}

/// Reject anything that is not a local UUID before touching storage
///
/// # Errors
///
/// Returns `InvalidThreadId` for malformed ids
pub fn validate_thread_id(thread_id: &str) -> AppResult<()> {
    Uuid::parse_str(thread_id)
        .map(|_| ())
        .map_err(|_| AppError::invalid_thread_id(thread_id))
}

/// Creates, resolves, and deletes conversation threads
#[derive(Clone)]
pub struct ThreadLifecycle {
    assistant: Arc<dyn AssistantClient>,
    threads: ThreadManager,
}

impl ThreadLifecycle {
    /// Create the service
    #[must_use]
    pub fn new(assistant: Arc<dyn AssistantClient>, threads: ThreadManager) -> Self {
        Self { assistant, threads }
    }

    /// Create the external thread, then the local record bound to it
    ///
    /// # Errors
    ///
    /// Returns `UpstreamFailure` if the external create fails (nothing is
    /// written locally) or `PersistenceFailure` if the local insert fails
    pub async fn create_thread(&self, owner_id: &str, new_thread: &NewThread) -> AppResult<Thread> {
        let metadata = new_thread
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        if !metadata.is_object() {
            return Err(AppError::invalid_input("Thread metadata must be a JSON object"));
        }

        let remote = self.assistant.create_thread(&metadata).await?;

        match self
            .threads
            .create_thread(&remote.id, owner_id, new_thread)
            .await
        {
            Ok(thread) => {
                info!(
                    thread_id = %thread.id,
                    external_thread_id = %remote.id,
                    owner_id,
                    "Created thread"
                );
                Ok(thread)
            }
            Err(e) => {
                // The remote thread has no local owner from here on
                error!(
                    external_thread_id = %remote.id,
                    owner_id,
                    error = %e,
                    "Abandoned external thread after local insert failed"
                );
                Err(e)
            }
        }
    }

    /// Load the local record and the external thread it is bound to
    ///
    /// # Errors
    ///
    /// Returns `InvalidThreadId`, `ThreadNotFound` when either side is
    /// missing, or `UpstreamFailure`
    pub async fn retrieve_thread(&self, thread_id: &str) -> AppResult<ThreadDetails> {
        let thread = self.load(thread_id).await?;

        let Some(remote) = self
            .assistant
            .retrieve_thread(&thread.external_thread_id)
            .await?
        else {
            warn!(
                thread_id,
                external_thread_id = %thread.external_thread_id,
                "External thread no longer exists"
            );
            return Err(AppError::thread_not_found(thread_id));
        };

        Ok(ThreadDetails { thread, remote })
    }

    /// Delete a thread owned by `user_id`, external side first
    ///
    /// # Errors
    ///
    /// Returns `ThreadPermissionDenied` for non-owners, or `UpstreamFailure`
    /// when the external delete fails, in which case the local record is kept.
    /// An external thread that no longer exists counts as deleted.
    pub async fn delete_thread(&self, thread_id: &str, user_id: &str) -> AppResult<()> {
        let thread = self.authorize(thread_id, user_id).await?;

        match self
            .assistant
            .delete_thread(&thread.external_thread_id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.code == ErrorCode::ResourceNotFound => {
                info!(
                    thread_id,
                    external_thread_id = %thread.external_thread_id,
                    "External thread already gone; removing local record"
                );
            }
            Err(e) => {
                warn!(thread_id, error = %e, "External thread delete failed; keeping local record");
                return Err(AppError::external_service(
                    self.assistant.name(),
                    format!("Failed to delete thread {thread_id}: {}", e.message),
                ));
            }
        }

        self.threads.delete_thread(thread_id).await?;
        info!(thread_id, user_id, "Deleted thread");
        Ok(())
    }

    /// Whether `user_id` owns the thread
    ///
    /// # Errors
    ///
    /// Returns `ThreadNotFound` for unknown threads rather than `false`
    pub async fn is_owner(&self, thread_id: &str, user_id: &str) -> AppResult<bool> {
        validate_thread_id(thread_id)?;
        let owner = self
            .threads
            .get_owner(thread_id)
            .await?
            .ok_or_else(|| AppError::thread_not_found(thread_id))?;
        Ok(owner == user_id)
    }

    /// Load a thread and require `user_id` to own it
    ///
    /// # Errors
    ///
    /// Returns `InvalidThreadId`, `ThreadNotFound`, or `ThreadPermissionDenied`
    pub async fn authorize(&self, thread_id: &str, user_id: &str) -> AppResult<Thread> {
        let thread = self.load(thread_id).await?;
        if thread.owner_id != user_id {
            debug!(thread_id, user_id, "Rejected access by non-owner");
            return Err(AppError::thread_permission_denied(thread_id));
        }
        Ok(thread)
    }

    /// Threads owned by a user, most recently active first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub async fn list_threads(
        &self,
        owner_id: &str,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Thread>> {
        self.threads
            .list_threads(owner_id, limit.clamp(1, 100), offset.max(0))
            .await
    }

    /// Name the thread unless it already has a name
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn set_name_if_unset(&self, thread_id: &str, name: &str) -> AppResult<bool> {
        self.threads.set_name_if_unset(thread_id, name).await
    }

    /// Record activity on the thread
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails
    pub async fn touch(&self, thread_id: &str) -> AppResult<()> {
        self.threads.touch(thread_id).await
    }

    async fn load(&self, thread_id: &str) -> AppResult<Thread> {
        validate_thread_id(thread_id)?;
        self.threads
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| AppError::thread_not_found(thread_id))
    }
}
