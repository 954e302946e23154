// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Exponential backoff around any embedder

use super::Embedder;
use crate::config::RetryPolicy;
use crate::errors::{RagError, Result};
use async_trait::async_trait;
use std::future::Future;
use tracing::warn;

/// Retries transient embedding failures according to a [`RetryPolicy`]
///
/// Only `Embedding` and `Io` errors are retried; shape errors are returned
/// on the first attempt.
pub struct RetryingEmbedder<E> {
    inner: E,
    policy: RetryPolicy,
}

impl<E: Embedder> RetryingEmbedder<E> {
    pub fn new(inner: E, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    async fn with_retry<'a, T, F, Fut>(&'a self, op: F) -> Result<T>
    where
        F: Fn(&'a E) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match op(&self.inner).await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(&e) => {
                    if !self.policy.allows_retry(retries) {
                        return Err(RagError::RetriesExhausted {
                            attempts: retries + 1,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.policy.delay_for(retries);
                    warn!(
                        "Embedding attempt {} failed, retrying in {:?}: {}",
                        retries + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(err: &RagError) -> bool {
    matches!(err, RagError::Embedding(_) | RagError::Io(_))
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.with_retry(|inner| inner.embed(text)).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.with_retry(|inner| inner.embed_batch(texts)).await
    }
}
