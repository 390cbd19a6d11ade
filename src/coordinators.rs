//! Provider call coordination: ordered first-result race and full aggregation.
//!
//! Provider clients are blocking, so every call runs on the runtime's blocking
//! pool and is awaited under a deadline. A call that misses its deadline is
//! abandoned, not interrupted; its eventual result is dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{ProviderError, SearchFault};
use crate::image_pipeline::CandidateImage;
use crate::providers::{CoverProvider, ProviderKind};
use crate::track::Track;

/// Runtime hosting provider calls for a search manager.
///
/// Dropping it releases the runtime without waiting for abandoned provider calls.
pub struct SearchRuntime {
    runtime: Option<Runtime>,
}

impl SearchRuntime {
    pub fn new() -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .thread_name("cover-search-provider")
            .build()?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        match self.runtime.as_ref() {
            Some(runtime) => runtime.block_on(future),
            None => unreachable!("search runtime is only released on drop"),
        }
    }
}

impl Drop for SearchRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

type ProviderCall = JoinHandle<Result<Vec<CandidateImage>, ProviderError>>;

fn spawn_provider_call(provider: &Arc<dyn CoverProvider>, track: &Arc<Track>) -> ProviderCall {
    let provider = Arc::clone(provider);
    let track = Arc::clone(track);
    tokio::task::spawn_blocking(move || provider.search(&track))
}

/// Waits for one provider call until `deadline`, tagging results with their source.
async fn settle_provider_call(
    provider: ProviderKind,
    call: ProviderCall,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<CandidateImage>, SearchFault> {
    match tokio::time::timeout_at(deadline, call).await {
        Err(_) => Err(SearchFault::Timeout { provider, timeout }),
        Ok(Err(join_error)) => Err(SearchFault::Worker {
            provider,
            message: join_error.to_string(),
        }),
        Ok(Ok(Err(source))) => Err(SearchFault::Provider { provider, source }),
        Ok(Ok(Ok(images))) => Ok(images
            .into_iter()
            .map(|image| image.with_source(provider))
            .collect()),
    }
}

/// Tries providers one at a time in priority order and returns the first
/// non-empty result. Providers after the winner are never started.
///
/// Timeouts and errors skip to the next provider. Exhausting the list yields an
/// empty vector, meaning no cover was found.
pub async fn race_first_result(
    providers: &[Arc<dyn CoverProvider>],
    track: &Track,
    timeout: Duration,
) -> Vec<CandidateImage> {
    let track = Arc::new(track.clone());
    for provider in providers {
        let kind = provider.kind();
        let call = spawn_provider_call(provider, &track);
        match settle_provider_call(kind, call, Instant::now() + timeout, timeout).await {
            Ok(images) if !images.is_empty() => {
                info!(
                    "Race: {} returned {} candidate(s) for {}",
                    kind,
                    images.len(),
                    track.path().display()
                );
                return images;
            }
            Ok(_) => debug!("Race: {} found nothing for {}", kind, track.path().display()),
            Err(fault) => warn!("Race: {} ({})", fault, track.path().display()),
        }
    }
    Vec::new()
}

/// Runs every provider concurrently under one shared deadline and concatenates
/// all results in provider priority order, keeping each provider's own order.
///
/// Failed or timed-out providers contribute nothing.
pub async fn aggregate_all_results(
    providers: &[Arc<dyn CoverProvider>],
    track: &Track,
    timeout: Duration,
) -> Vec<CandidateImage> {
    let track = Arc::new(track.clone());
    let deadline = Instant::now() + timeout;
    let calls: Vec<(ProviderKind, ProviderCall)> = providers
        .iter()
        .map(|provider| (provider.kind(), spawn_provider_call(provider, &track)))
        .collect();

    let mut combined = Vec::new();
    for (kind, call) in calls {
        match settle_provider_call(kind, call, deadline, timeout).await {
            Ok(images) => {
                debug!(
                    "Aggregate: {} contributed {} candidate(s) for {}",
                    kind,
                    images.len(),
                    track.path().display()
                );
                combined.extend(images);
            }
            Err(fault) => warn!("Aggregate: {} ({})", fault, track.path().display()),
        }
    }
    combined
}
