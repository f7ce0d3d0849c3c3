//! Pluggable presentation strategies.
//!
//! The cache engine never renders anything itself. A collaborator supplies a
//! [`RenderStrategy`] that turns bytes, errors and progress snapshots into its
//! own presentation type, and [`present`] drives a resolve through it.

use bytes::Bytes;

use crate::{Error, ProgressState, Resolver};

/// Turns cache-engine results into presentation nodes.
pub trait RenderStrategy {
    type Node;

    fn render_success(&self, bytes: &Bytes) -> Self::Node;

    fn render_error(&self, error: &Error) -> Self::Node;

    fn render_progress(&self, progress: &ProgressState) -> Self::Node;
}

/// A [`RenderStrategy`] built from three builder functions.
pub struct RenderFns<S, E, P> {
    pub success: S,
    pub error: E,
    pub progress: P,
}

impl<N, S, E, P> RenderStrategy for RenderFns<S, E, P>
where
    S: Fn(&Bytes) -> N,
    E: Fn(&Error) -> N,
    P: Fn(&ProgressState) -> N,
{
    type Node = N;

    fn render_success(&self, bytes: &Bytes) -> N {
        (self.success)(bytes)
    }

    fn render_error(&self, error: &Error) -> N {
        (self.error)(error)
    }

    fn render_progress(&self, progress: &ProgressState) -> N {
        (self.progress)(progress)
    }
}

/// Resolve `url` and render every step of it.
///
/// `emit` receives one progress node per observed non-terminal snapshot
/// while a fetch runs, then exactly one success or error node. The result of
/// the resolve is returned as well.
pub async fn present<R>(
    resolver: &Resolver, url: &str, strategy: &R, emit: impl FnMut(R::Node) + Send,
) -> Result<Bytes, Error>
where
    R: RenderStrategy + Sync,
{
    present_with(resolver, url, false, strategy, emit).await
}

/// [`present`] over [`Resolver::refresh`].
pub async fn present_refresh<R>(
    resolver: &Resolver, url: &str, strategy: &R, emit: impl FnMut(R::Node) + Send,
) -> Result<Bytes, Error>
where
    R: RenderStrategy + Sync,
{
    present_with(resolver, url, true, strategy, emit).await
}

async fn present_with<R>(
    resolver: &Resolver, url: &str, refresh: bool, strategy: &R, mut emit: impl FnMut(R::Node) + Send,
) -> Result<Bytes, Error>
where
    R: RenderStrategy + Sync,
{
    let mut observe = |state: ProgressState| {
        if !state.is_terminal() {
            emit(strategy.render_progress(&state));
        }
    };

    let result = if refresh {
        resolver.refresh_observed(url, &mut observe).await
    } else {
        resolver.resolve_observed(url, &mut observe).await
    };

    match &result {
        Ok(bytes) => emit(strategy.render_success(bytes)),
        Err(e) => emit(strategy.render_error(e)),
    }

    result
}
