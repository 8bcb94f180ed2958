//! The page operations shared by the popup caller and the content endpoint.
//!
//! Each operation type fixes a route path and its input and output types
//! for both sides at compile time. The content-side router built here is
//! the receiving half: every route validates its input (all three take
//! none) and reads from the page-content provider.

use std::sync::Arc;

use tabwise_rpc::{
    Dispatcher, EndpointHandle, InProcessChannel, Operation, Router, RouterBuildError,
    RouterBuilder, TabId, schema, spawn_endpoint,
};

use crate::content::{PageContentProvider, PageDetails};

/// Fetches the full page markup. Route `page.content`.
#[derive(Debug)]
pub struct FetchPageContent;

impl Operation for FetchPageContent {
    const PATH: &'static str = "page.content";
    type Input = ();
    type Output = String;
}

/// Fetches the current text selection. Route `page.selection`.
#[derive(Debug)]
pub struct FetchPageSelection;

impl Operation for FetchPageSelection {
    const PATH: &'static str = "page.selection";
    type Input = ();
    type Output = String;
}

/// Fetches page metadata. Route `page.details`.
#[derive(Debug)]
pub struct FetchPageDetails;

impl Operation for FetchPageDetails {
    const PATH: &'static str = "page.details";
    type Input = ();
    type Output = PageDetails;
}

/// Dispatch context for content-side handlers: the tab being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabContext {
    /// Identity of the tab this endpoint answers for.
    pub tab: TabId,
}

/// Builds the content-side router over a page provider.
///
/// # Errors
///
/// Returns a [`RouterBuildError`] if the route set is inconsistent; with
/// this fixed set that indicates a defect in this module.
pub fn page_router(
    provider: Arc<dyn PageContentProvider>,
) -> Result<Router<TabContext>, RouterBuildError> {
    let content_provider = Arc::clone(&provider);
    let selection_provider = Arc::clone(&provider);
    let details_provider = provider;

    RouterBuilder::new()
        .operation::<FetchPageContent, _, _>(schema::unit, move |(), _ctx| {
            content_provider.page_content().map_err(Into::into)
        })
        .operation::<FetchPageSelection, _, _>(schema::unit, move |(), _ctx| {
            selection_provider.page_selection().map_err(Into::into)
        })
        .operation::<FetchPageDetails, _, _>(schema::unit, move |(), _ctx| {
            details_provider.page_details().map_err(Into::into)
        })
        .build()
}

/// Attaches a tab to the channel and serves the page router on it.
///
/// This is the content-script bootstrap in miniature: attach, build the
/// router once, then answer deliveries until the tab detaches.
///
/// # Errors
///
/// Returns a [`RouterBuildError`] if the router cannot be built.
pub fn spawn_page_endpoint(
    channel: &InProcessChannel,
    provider: Arc<dyn PageContentProvider>,
) -> Result<(TabId, EndpointHandle), RouterBuildError> {
    let (tab, inbox) = channel.attach_tab();
    let dispatcher = Arc::new(Dispatcher::new(page_router(provider)?));
    let endpoint = spawn_endpoint(inbox, dispatcher, Arc::new(TabContext { tab }));
    Ok((tab, endpoint))
}
