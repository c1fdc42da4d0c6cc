//! User hooks applied to entries crossing the connection.
//!
//! Outgoing entries run through `out_filter` then `out_map`; incoming
//! entries through `in_filter` then `in_map`. Every hook is async and the
//! engine awaits the whole chain before sending or appending an entry.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use tandem_core::{Action, Meta};

use crate::error::SyncError;

/// Error raised by a user hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Decides whether an entry passes.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn filter(&self, action: &Action, meta: &Meta) -> Result<bool, HookError>;
}

/// Replaces an entry before further processing.
#[async_trait]
pub trait Mapper: Send + Sync {
    async fn map(&self, action: Action, meta: Meta) -> Result<(Action, Meta), HookError>;
}

/// Which hook produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    OutFilter,
    OutMap,
    InFilter,
    InMap,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookKind::OutFilter => "out_filter",
            HookKind::OutMap => "out_map",
            HookKind::InFilter => "in_filter",
            HookKind::InMap => "in_map",
        })
    }
}

/// Filter backed by an async closure.
pub struct FnFilter<F>(F);

/// Mapper backed by an async closure.
pub struct FnMapper<F>(F);

/// Adapt an async closure into a [`Filter`].
///
/// The closure receives clones of the action and meta.
pub fn filter_fn<F, Fut>(f: F) -> FnFilter<F>
where
    F: Fn(Action, Meta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, HookError>> + Send,
{
    FnFilter(f)
}

/// Adapt an async closure into a [`Mapper`].
pub fn map_fn<F, Fut>(f: F) -> FnMapper<F>
where
    F: Fn(Action, Meta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(Action, Meta), HookError>> + Send,
{
    FnMapper(f)
}

#[async_trait]
impl<F, Fut> Filter for FnFilter<F>
where
    F: Fn(Action, Meta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, HookError>> + Send,
{
    async fn filter(&self, action: &Action, meta: &Meta) -> Result<bool, HookError> {
        (self.0)(action.clone(), meta.clone()).await
    }
}

#[async_trait]
impl<F, Fut> Mapper for FnMapper<F>
where
    F: Fn(Action, Meta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(Action, Meta), HookError>> + Send,
{
    async fn map(&self, action: Action, meta: Meta) -> Result<(Action, Meta), HookError> {
        (self.0)(action, meta).await
    }
}

/// The four optional hooks of a sync engine.
#[derive(Clone, Default)]
pub struct Hooks {
    out_filter: Option<Arc<dyn Filter>>,
    out_map: Option<Arc<dyn Mapper>>,
    in_filter: Option<Arc<dyn Filter>>,
    in_map: Option<Arc<dyn Mapper>>,
}

impl Hooks {
    /// No hooks: every entry passes unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_out_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.out_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_out_map(mut self, mapper: impl Mapper + 'static) -> Self {
        self.out_map = Some(Arc::new(mapper));
        self
    }

    pub fn with_in_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.in_filter = Some(Arc::new(filter));
        self
    }

    pub fn with_in_map(mut self, mapper: impl Mapper + 'static) -> Self {
        self.in_map = Some(Arc::new(mapper));
        self
    }

    /// Run `out_filter` then `out_map`. `None` means filtered out.
    pub async fn outgoing(
        &self,
        action: Action,
        meta: Meta,
    ) -> Result<Option<(Action, Meta)>, SyncError> {
        pipeline(
            (self.out_filter.as_deref(), HookKind::OutFilter),
            (self.out_map.as_deref(), HookKind::OutMap),
            action,
            meta,
        )
        .await
    }

    /// Run `in_filter` then `in_map`. `None` means filtered out.
    pub async fn incoming(
        &self,
        action: Action,
        meta: Meta,
    ) -> Result<Option<(Action, Meta)>, SyncError> {
        pipeline(
            (self.in_filter.as_deref(), HookKind::InFilter),
            (self.in_map.as_deref(), HookKind::InMap),
            action,
            meta,
        )
        .await
    }
}

async fn pipeline(
    (filter, filter_kind): (Option<&dyn Filter>, HookKind),
    (mapper, map_kind): (Option<&dyn Mapper>, HookKind),
    action: Action,
    meta: Meta,
) -> Result<Option<(Action, Meta)>, SyncError> {
    if let Some(filter) = filter {
        let keep = filter
            .filter(&action, &meta)
            .await
            .map_err(|source| SyncError::Hook {
                hook: filter_kind,
                source,
            })?;
        if !keep {
            return Ok(None);
        }
    }

    match mapper {
        Some(mapper) => mapper
            .map(action, meta)
            .await
            .map(Some)
            .map_err(|source| SyncError::Hook {
                hook: map_kind,
                source,
            }),
        None => Ok(Some((action, meta))),
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("out_filter", &self.out_filter.is_some())
            .field("out_map", &self.out_map.is_some())
            .field("in_filter", &self.in_filter.is_some())
            .field("in_map", &self.in_map.is_some())
            .finish()
    }
}
