//! Admission validation dispatch
//!
//! A [`ValidatingDispatcher`] decodes the objects carried by an admission
//! request, routes by operation to a per-kind [`Validator`], and classifies
//! the outcome:
//!
//! | validator result                   | decision        | status code |
//! |------------------------------------|-----------------|-------------|
//! | `Ok(())`                           | allowed         | 200         |
//! | `Err(ValidatorError::Denied(_))`   | denied          | 403         |
//! | `Err(ValidatorError::Fault(_))`    | server error    | 500         |
//! | payload could not be decoded       | client error    | 400         |
//!
//! A denial is a business-rule verdict and is never retried by the API
//! server; a fault means validation itself could not complete.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, Operation};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// A policy denial: the request is semantically invalid
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    message: String,
    field: Option<String>,
}

impl ValidationError {
    /// Create a denial with the given reason
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    /// Create a denial attributed to a field path (e.g. `spec.bucketName`)
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Denial for a change to a field that is fixed at creation
    pub fn immutable(
        field: impl Into<String>,
        old: impl std::fmt::Display,
        new: impl std::fmt::Display,
    ) -> Self {
        let field = field.into();
        let message = format!("{field} must be immutable, was changed from {old} to {new}");
        Self::for_field(field, message)
    }

    /// The reason surfaced to the requester
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The offending field path, if known
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

/// Error returned by a [`Validator`]
#[derive(Debug, Error)]
pub enum ValidatorError {
    /// The request violates policy
    #[error(transparent)]
    Denied(#[from] ValidationError),

    /// Validation could not be completed
    #[error(transparent)]
    Fault(#[from] crate::Error),
}

/// Request-scoped context handed to validators
///
/// Validators log through `tracing`; the dispatcher runs them inside a span
/// carrying the request uid, operation and object name.
#[derive(Clone, Debug, Default)]
pub struct AdmissionContext {
    /// Request uid
    pub uid: String,
    /// Name of the object under admission
    pub name: String,
    /// Namespace of the object, if namespaced
    pub namespace: Option<String>,
    /// Operation name as sent by the API server (e.g. "UPDATE")
    pub operation: String,
    /// Requesting user
    pub username: Option<String>,
    /// Whether the request will be persisted
    pub dry_run: bool,
}

impl AdmissionContext {
    /// Extract the context of an admission request
    pub fn from_request<T: kube::Resource>(request: &AdmissionRequest<T>) -> Self {
        Self {
            uid: request.uid.clone(),
            name: request.name.clone(),
            namespace: request.namespace.clone(),
            operation: operation_name(&request.operation),
            username: request.user_info.username.clone(),
            dry_run: request.dry_run,
        }
    }
}

/// Wire name of an admission operation (CREATE, UPDATE, DELETE, CONNECT)
fn operation_name(operation: &Operation) -> String {
    serde_json::to_value(operation)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_else(|| format!("{operation:?}").to_uppercase())
}

/// Per-kind admission validation
#[async_trait]
pub trait Validator<K>: Send + Sync {
    /// Validate a new object
    async fn validate_creation(&self, ctx: &AdmissionContext, new: &K) -> Result<(), ValidatorError>;

    /// Validate a change from `old` to `new`
    async fn validate_update(
        &self,
        ctx: &AdmissionContext,
        new: &K,
        old: &K,
    ) -> Result<(), ValidatorError>;

    /// Validate removal of `old`
    async fn validate_deletion(&self, ctx: &AdmissionContext, old: &K) -> Result<(), ValidatorError>;
}

/// Outcome of one admission dispatch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// The request may proceed
    Allowed,
    /// The request violates policy
    Denied(String),
    /// The request was malformed
    ClientError(String),
    /// Validation failed for reasons unrelated to the request
    ServerError(String),
}

impl AdmissionDecision {
    /// Status code reported in the admission response
    pub fn status_code(&self) -> u16 {
        match self {
            AdmissionDecision::Allowed => 200,
            AdmissionDecision::Denied(_) => 403,
            AdmissionDecision::ClientError(_) => 400,
            AdmissionDecision::ServerError(_) => 500,
        }
    }

    /// Returns true if the request may proceed
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmissionDecision::Allowed)
    }

    /// Build the admission response for `request`
    pub fn into_response(self, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
        let code = self.status_code();
        let response = AdmissionResponse::from(request);
        match self {
            AdmissionDecision::Allowed => response,
            AdmissionDecision::Denied(reason)
            | AdmissionDecision::ClientError(reason)
            | AdmissionDecision::ServerError(reason) => {
                let mut response = response.deny(reason);
                response.result.code = code;
                response
            }
        }
    }
}

impl From<Result<(), ValidatorError>> for AdmissionDecision {
    fn from(result: Result<(), ValidatorError>) -> Self {
        match result {
            Ok(()) => AdmissionDecision::Allowed,
            Err(ValidatorError::Denied(denial)) => AdmissionDecision::Denied(denial.message),
            Err(ValidatorError::Fault(fault)) => AdmissionDecision::ServerError(fault.to_string()),
        }
    }
}

/// Type-erased dispatcher, one per registered resource kind
#[async_trait]
pub trait AdmissionHandler: Send + Sync {
    /// Decide on an admission request
    async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionDecision;
}

/// Routes admission requests for kind `K` to its validator
pub struct ValidatingDispatcher<K> {
    validator: Arc<dyn Validator<K>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: DeserializeOwned + Send + Sync + 'static> ValidatingDispatcher<K> {
    /// Create a dispatcher for `validator`
    pub fn new(validator: Arc<dyn Validator<K>>) -> Self {
        Self {
            validator,
            _kind: PhantomData,
        }
    }

    /// Decode, validate and classify one admission request
    #[instrument(
        skip(self, request),
        fields(uid = %request.uid, name = %request.name, operation = ?request.operation)
    )]
    pub async fn dispatch(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionDecision {
        let ctx = AdmissionContext::from_request(request);

        let result = match request.operation {
            Operation::Create => {
                let new = match decode::<K>(request.object.as_ref(), "object") {
                    Ok(new) => new,
                    Err(reason) => return malformed(reason),
                };
                self.validator.validate_creation(&ctx, &new).await
            }
            Operation::Update => {
                let new = match decode::<K>(request.object.as_ref(), "object") {
                    Ok(new) => new,
                    Err(reason) => return malformed(reason),
                };
                let old = match decode::<K>(request.old_object.as_ref(), "oldObject") {
                    Ok(old) => old,
                    Err(reason) => return malformed(reason),
                };
                self.validator.validate_update(&ctx, &new, &old).await
            }
            Operation::Delete => {
                let old = match decode::<K>(request.old_object.as_ref(), "oldObject") {
                    Ok(old) => old,
                    Err(reason) => return malformed(reason),
                };
                self.validator.validate_deletion(&ctx, &old).await
            }
            _ => {
                return malformed(format!("invalid request operation: {}", ctx.operation));
            }
        };

        let decision = AdmissionDecision::from(result);
        match &decision {
            AdmissionDecision::Allowed => debug!("admission allowed"),
            AdmissionDecision::Denied(reason) => info!(%reason, "admission denied"),
            AdmissionDecision::ServerError(reason) => error!(%reason, "validation failed"),
            AdmissionDecision::ClientError(_) => {}
        }
        decision
    }
}

#[async_trait]
impl<K: DeserializeOwned + Send + Sync + 'static> AdmissionHandler for ValidatingDispatcher<K> {
    async fn handle(&self, request: &AdmissionRequest<DynamicObject>) -> AdmissionDecision {
        self.dispatch(request).await
    }
}

fn malformed(reason: String) -> AdmissionDecision {
    warn!(%reason, "malformed admission request");
    AdmissionDecision::ClientError(reason)
}

/// Decode the typed object carried in an admission payload
fn decode<K: DeserializeOwned>(object: Option<&DynamicObject>, field: &str) -> Result<K, String> {
    let object = object.ok_or_else(|| format!("admission request has no {field}"))?;
    let value =
        serde_json::to_value(object).map_err(|e| format!("failed to read {field}: {e}"))?;
    serde_json::from_value(value).map_err(|e| format!("failed to decode {field}: {e}"))
}
