//! AccessKey admission rules

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::info;

use super::validation::{AdmissionContext, ValidationError, Validator, ValidatorError};
use crate::crd::AccessKey;

/// Validates AccessKey create, update and delete requests
///
/// A key is issued for one service account; rebinding it would silently hand
/// its buckets to a different identity, so the binding is fixed.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessKeyValidator;

#[async_trait]
impl Validator<AccessKey> for AccessKeyValidator {
    async fn validate_creation(
        &self,
        ctx: &AdmissionContext,
        new: &AccessKey,
    ) -> Result<(), ValidatorError> {
        info!(
            user = ?ctx.username,
            key = %new.name_any(),
            service_account = %new.spec.service_account_id,
            "access key creation requested"
        );
        Ok(())
    }

    async fn validate_update(
        &self,
        ctx: &AdmissionContext,
        new: &AccessKey,
        old: &AccessKey,
    ) -> Result<(), ValidatorError> {
        info!(user = ?ctx.username, key = %new.name_any(), "validating access key update");

        if new.spec.service_account_id != old.spec.service_account_id {
            return Err(ValidationError::for_field(
                "spec.serviceAccountId",
                format!(
                    "bound service account must be immutable, was changed from {} to {}",
                    old.spec.service_account_id, new.spec.service_account_id
                ),
            )
            .into());
        }
        Ok(())
    }

    async fn validate_deletion(
        &self,
        ctx: &AdmissionContext,
        old: &AccessKey,
    ) -> Result<(), ValidatorError> {
        info!(user = ?ctx.username, key = %old.name_any(), "access key deletion requested");
        Ok(())
    }
}
