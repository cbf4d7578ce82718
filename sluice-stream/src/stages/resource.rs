// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Sources reading from an externally owned resource.
//!
//! The resource is opened when the stage starts and closed exactly once after
//! every successful open, whichever way the stream ends: completion, failure,
//! downstream cancellation or abrupt termination, including while a read is
//! still in flight. A failed open fails the stream without a close.
//!
//! Read failures are supervised: `Resume` skips the failure and reads again,
//! `Restart` closes the resource and opens a fresh one, `Stop` closes the
//! resource and then fails. A failing close fails the stream.

use super::source_stage;
use crate::context::StageContext;
use crate::dsl::Source;
use crate::logging::{debug, warn};
use crate::logic::{downcast_event, StageLogic};
use crate::shape::SourceShape;
use async_trait::async_trait;
use sluice_core::supervision::Directive;
use sluice_core::{Attributes, NotUsed, Result, StreamError};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// A resource read asynchronously by `Source::unfold_resource_async`.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use sluice_core::Result;
/// use sluice_stream::stages::resource::AsyncResource;
///
/// struct Countdown(u32);
///
/// #[async_trait]
/// impl AsyncResource for Countdown {
///     type Item = u32;
///
///     async fn read(&mut self) -> Result<Option<u32>> {
///         if self.0 == 0 {
///             return Ok(None);
///         }
///         self.0 -= 1;
///         Ok(Some(self.0))
///     }
///
///     async fn close(&mut self) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncResource: Send + 'static {
    /// Elements read from the resource.
    type Item: Send + 'static;

    /// Read the next element; `None` ends the stream.
    async fn read(&mut self) -> Result<Option<Self::Item>>;

    /// Release the resource. Called exactly once.
    async fn close(&mut self) -> Result<()>;
}

/// Owns an open resource and closes it when dropped unless it was closed
/// explicitly, so a dropped read future or mailbox event cannot leak it.
struct ResourceGuard<R: AsyncResource> {
    resource: Option<R>,
}

impl<R: AsyncResource> ResourceGuard<R> {
    fn new(resource: R) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    async fn read(&mut self) -> Result<Option<R::Item>> {
        match self.resource.as_mut() {
            Some(resource) => resource.read().await,
            None => Err(StreamError::stream_error("read after close")),
        }
    }

    async fn close(mut self) -> Result<()> {
        match self.resource.take() {
            Some(mut resource) => resource.close().await,
            None => Ok(()),
        }
    }
}

impl<R: AsyncResource> Drop for ResourceGuard<R> {
    fn drop(&mut self) {
        let Some(mut resource) = self.resource.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = resource.close().await {
                        warn!("closing an abandoned resource failed: {}", error);
                    }
                });
            }
            Err(_) => warn!("resource dropped outside of a runtime; it was not closed"),
        }
    }
}

/// What to do once the resource is closed.
enum AfterClose {
    Complete,
    Fail(StreamError),
    Reopen,
}

enum ResourceEvent<R: AsyncResource> {
    Opened(Result<ResourceGuard<R>>),
    Read(ResourceGuard<R>, Result<Option<R::Item>>),
    Closed(Result<()>, AfterClose),
}

struct UnfoldResourceAsyncLogic<R: AsyncResource, F> {
    shape: SourceShape<R::Item>,
    open: Arc<F>,
    idle: Option<ResourceGuard<R>>,
    cancelled: bool,
}

impl<R, F, Fut> UnfoldResourceAsyncLogic<R, F>
where
    R: AsyncResource,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn open(&mut self, ctx: &mut StageContext<'_>) {
        let opening = (self.open)();
        ctx.run_future(async move { ResourceEvent::Opened(opening.await.map(ResourceGuard::new)) });
    }

    fn read(&mut self, ctx: &mut StageContext<'_>) {
        if let Some(mut guard) = self.idle.take() {
            ctx.run_future(async move {
                let result = guard.read().await;
                ResourceEvent::Read(guard, result)
            });
        }
    }

    fn close(ctx: &mut StageContext<'_>, guard: ResourceGuard<R>, after: AfterClose) {
        ctx.set_keep_going(true);
        ctx.run_future(async move { ResourceEvent::<R>::Closed(guard.close().await, after) });
    }
}

impl<R, F, Fut> StageLogic for UnfoldResourceAsyncLogic<R, F>
where
    R: AsyncResource,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    fn pre_start(&mut self, ctx: &mut StageContext<'_>) -> Result<()> {
        self.open(ctx);
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.read(ctx);
        Ok(())
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        self.cancelled = true;
        match self.idle.take() {
            Some(guard) => Self::close(ctx, guard, AfterClose::Complete),
            // Opening or reading: the resource is closed when that finishes.
            None => ctx.set_keep_going(true),
        }
        Ok(())
    }

    fn on_async(&mut self, ctx: &mut StageContext<'_>, event: Box<dyn Any + Send>) -> Result<()> {
        match downcast_event::<ResourceEvent<R>>(event)? {
            ResourceEvent::Opened(Ok(guard)) => {
                if self.cancelled {
                    Self::close(ctx, guard, AfterClose::Complete);
                    return Ok(());
                }
                self.idle = Some(guard);
                if ctx.is_available(self.shape.out) {
                    self.read(ctx);
                }
                Ok(())
            }
            ResourceEvent::Opened(Err(error)) => ctx.fail_stage(error),
            ResourceEvent::Read(guard, result) => {
                if self.cancelled {
                    Self::close(ctx, guard, AfterClose::Complete);
                    return Ok(());
                }
                match result {
                    Ok(Some(element)) => {
                        self.idle = Some(guard);
                        ctx.push(self.shape.out, element)
                    }
                    Ok(None) => {
                        Self::close(ctx, guard, AfterClose::Complete);
                        Ok(())
                    }
                    Err(error) => {
                        match ctx.supervision_directive(&error) {
                            Directive::Resume => {
                                debug!("{}: skipping failed read: {}", ctx.stage_name(), error);
                                self.idle = Some(guard);
                                self.read(ctx);
                            }
                            Directive::Restart => {
                                debug!("{}: reopening after failed read: {}", ctx.stage_name(), error);
                                Self::close(ctx, guard, AfterClose::Reopen);
                            }
                            Directive::Stop => Self::close(ctx, guard, AfterClose::Fail(error)),
                        }
                        Ok(())
                    }
                }
            }
            ResourceEvent::Closed(result, after) => match (result, after) {
                (Ok(()), AfterClose::Complete) => ctx.complete_stage(),
                (Ok(()), AfterClose::Reopen) if !self.cancelled => {
                    self.open(ctx);
                    Ok(())
                }
                (Ok(()), AfterClose::Reopen) => ctx.complete_stage(),
                (Ok(()), AfterClose::Fail(error)) => ctx.fail_stage(error),
                (Err(close_error), AfterClose::Fail(error)) => {
                    warn!("{}: close failed after a read failure: {}", ctx.stage_name(), close_error);
                    ctx.fail_stage(error)
                }
                (Err(close_error), _) => ctx.fail_stage(close_error),
            },
        }
    }
}

pub(crate) fn unfold_resource_async<R, F, Fut>(open: F) -> Source<R::Item>
where
    R: AsyncResource,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let open = Arc::new(open);
    source_stage("unfold_resource_async", move |_: &Attributes| {
        let logic = UnfoldResourceAsyncLogic::<R, F> {
            shape: SourceShape::<R::Item>::new(),
            open: Arc::clone(&open),
            idle: None,
            cancelled: false,
        };
        Ok((Box::new(logic) as Box<dyn StageLogic>, NotUsed))
    })
}

struct UnfoldResourceLogic<R, T, O, Rd, C> {
    shape: SourceShape<T>,
    open: Arc<O>,
    read: Arc<Rd>,
    close: Arc<C>,
    resource: Option<R>,
}

impl<R, T, O, Rd, C> UnfoldResourceLogic<R, T, O, Rd, C>
where
    R: Send + 'static,
    T: Send + 'static,
    O: Fn() -> Result<R> + Send + Sync + 'static,
    Rd: Fn(&mut R) -> Result<Option<T>> + Send + Sync + 'static,
    C: Fn(R) -> Result<()> + Send + Sync + 'static,
{
    fn close_resource(&mut self) -> Result<()> {
        match self.resource.take() {
            Some(resource) => (self.close)(resource),
            None => Ok(()),
        }
    }
}

impl<R, T, O, Rd, C> StageLogic for UnfoldResourceLogic<R, T, O, Rd, C>
where
    R: Send + 'static,
    T: Send + 'static,
    O: Fn() -> Result<R> + Send + Sync + 'static,
    Rd: Fn(&mut R) -> Result<Option<T>> + Send + Sync + 'static,
    C: Fn(R) -> Result<()> + Send + Sync + 'static,
{
    fn pre_start(&mut self, _ctx: &mut StageContext<'_>) -> Result<()> {
        self.resource = Some((self.open)()?);
        Ok(())
    }

    fn on_pull(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        loop {
            let Some(resource) = self.resource.as_mut() else {
                return ctx.complete_stage();
            };
            match (self.read)(resource) {
                Ok(Some(element)) => return ctx.push(self.shape.out, element),
                Ok(None) => {
                    return match self.close_resource() {
                        Ok(()) => ctx.complete_stage(),
                        Err(close_error) => ctx.fail_stage(close_error),
                    };
                }
                Err(error) => match ctx.supervision_directive(&error) {
                    Directive::Resume => {}
                    Directive::Restart => {
                        // Close and reopen failures are never supervised.
                        if let Err(close_error) = self.close_resource() {
                            return ctx.fail_stage(close_error);
                        }
                        match (self.open)() {
                            Ok(resource) => self.resource = Some(resource),
                            Err(open_error) => return ctx.fail_stage(open_error),
                        }
                    }
                    Directive::Stop => {
                        if let Err(close_error) = self.close_resource() {
                            warn!("closing after a read failure failed: {}", close_error);
                        }
                        return ctx.fail_stage(error);
                    }
                },
            }
        }
    }

    fn on_downstream_finish(&mut self, ctx: &mut StageContext<'_>, _outlet: usize) -> Result<()> {
        match self.close_resource() {
            Ok(()) => ctx.complete_stage(),
            Err(error) => ctx.fail_stage(error),
        }
    }

    fn post_stop(&mut self, _abort_cause: Option<&StreamError>) {
        if let Err(error) = self.close_resource() {
            warn!("closing resource on stop failed: {}", error);
        }
    }
}

pub(crate) fn unfold_resource<R, T, O, Rd, C>(open: O, read: Rd, close: C) -> Source<T>
where
    R: Send + 'static,
    T: Send + 'static,
    O: Fn() -> Result<R> + Send + Sync + 'static,
    Rd: Fn(&mut R) -> Result<Option<T>> + Send + Sync + 'static,
    C: Fn(R) -> Result<()> + Send + Sync + 'static,
{
    let open = Arc::new(open);
    let read = Arc::new(read);
    let close = Arc::new(close);
    source_stage("unfold_resource", move |_: &Attributes| {
        let logic = UnfoldResourceLogic {
            shape: SourceShape::<T>::new(),
            open: Arc::clone(&open),
            read: Arc::clone(&read),
            close: Arc::clone(&close),
            resource: None,
        };
        Ok((Box::new(logic) as Box<dyn StageLogic>, NotUsed))
    })
}
