//! Validating Admission Webhook
//!
//! Every registered resource kind gets one POST endpoint. The handler turns
//! the incoming `AdmissionReview` into a request, runs it through that kind's
//! [`ValidatingDispatcher`], and answers with the review response. The HTTP
//! status is always 200; the admission verdict and its code travel inside the
//! review, which is what the API server reads.
//!
//! TLS is terminated in front of this server.

mod access_key;
mod bucket;
pub mod validation;

pub use access_key::AccessKeyValidator;
pub use bucket::BucketValidator;
pub use validation::{
    AdmissionContext, AdmissionDecision, AdmissionHandler, ValidatingDispatcher, ValidationError,
    Validator, ValidatorError,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::Resource;
use serde::de::DeserializeOwned;
use tracing::{error, info};

use crate::crd::{AccessKey, ObjectBucket};

/// Webhook path for resources of kind `K`
///
/// Follows the `/validate-<group>-<version>-<kind>` convention with dots in the
/// group replaced by dashes, e.g.
/// `/validate-connectors-lattice-dev-v1alpha1-objectbucket`.
pub fn validation_path<K: Resource<DynamicType = ()>>() -> String {
    format!(
        "/validate-{}-{}-{}",
        K::group(&()).replace('.', "-"),
        K::version(&()),
        K::kind(&()).to_lowercase()
    )
}

/// Collects per-kind dispatchers and serves them over HTTP
#[derive(Default, Clone)]
pub struct ValidatorRegistry {
    handlers: BTreeMap<String, Arc<dyn AdmissionHandler>>,
}

impl ValidatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `validator` for resources of kind `K`
    ///
    /// Registering a kind twice replaces the earlier validator.
    pub fn register<K>(mut self, validator: Arc<dyn Validator<K>>) -> Self
    where
        K: Resource<DynamicType = ()> + DeserializeOwned + Send + Sync + 'static,
    {
        let path = validation_path::<K>();
        info!(%path, kind = %K::kind(&()), "registering validator");
        self.handlers
            .insert(path, Arc::new(ValidatingDispatcher::new(validator)));
        self
    }

    /// Registered webhook paths, sorted
    pub fn paths(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Build the router: one POST route per kind plus `/healthz`
    pub fn router(&self) -> Router {
        let mut router = Router::new().route("/healthz", get(|| async { StatusCode::OK }));

        for (path, handler) in &self.handlers {
            let handler = handler.clone();
            router = router.route(
                path,
                post(move |Json(review): Json<AdmissionReview<DynamicObject>>| {
                    let handler = handler.clone();
                    async move { Json(review_handler(handler.as_ref(), review).await) }
                }),
            );
        }
        router
    }
}

/// Registry with the validators for every connector kind
pub fn default_registry() -> ValidatorRegistry {
    ValidatorRegistry::new()
        .register::<ObjectBucket>(Arc::new(BucketValidator))
        .register::<AccessKey>(Arc::new(AccessKeyValidator))
}

async fn review_handler(
    handler: &dyn AdmissionHandler,
    review: AdmissionReview<DynamicObject>,
) -> AdmissionReview<DynamicObject> {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "failed to parse admission request");
            return AdmissionResponse::invalid(e.to_string()).into_review();
        }
    };

    handler.handle(&request).await.into_response(&request).into_review()
}

/// Serve the webhook until SIGINT or SIGTERM arrives
pub async fn serve(registry: ValidatorRegistry, bind_addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    serve_until(registry, listener, shutdown_signal()).await
}

/// Serve the webhook on `listener` until `shutdown` resolves
pub async fn serve_until(
    registry: ValidatorRegistry,
    listener: tokio::net::TcpListener,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let bind_addr = listener.local_addr()?;
    info!(%bind_addr, paths = ?registry.paths(), "webhook server listening");

    axum::serve(listener, registry.router())
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("webhook server stopped");
    Ok(())
}

/// Resolves on the first SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("received SIGINT, draining webhook server"),
        _ = terminate => info!("received SIGTERM, draining webhook server"),
    }
}
