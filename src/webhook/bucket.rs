//! ObjectBucket admission rules

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::info;

use super::validation::{AdmissionContext, ValidationError, Validator, ValidatorError};
use crate::crd::{ObjectBucket, ObjectBucketSpec};

/// Validates ObjectBucket create, update and delete requests
#[derive(Clone, Copy, Debug, Default)]
pub struct BucketValidator;

/// Check a bucket name against the storage service's naming rules
fn validate_bucket_name(name: &str) -> Result<(), ValidationError> {
    const FIELD: &str = "spec.bucketName";

    if !(3..=63).contains(&name.len()) {
        return Err(ValidationError::for_field(
            FIELD,
            format!("{FIELD} must be between 3 and 63 characters, got {}", name.len()),
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '.'))
    {
        return Err(ValidationError::for_field(
            FIELD,
            format!("{FIELD} may only contain lowercase letters, digits, '-' and '.', found '{c}'"),
        ));
    }

    let alphanumeric = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !alphanumeric(name.chars().next()) || !alphanumeric(name.chars().last()) {
        return Err(ValidationError::for_field(
            FIELD,
            format!("{FIELD} must start and end with a letter or digit"),
        ));
    }
    Ok(())
}

/// Rules that apply to every admitted spec
fn validate_spec(spec: &ObjectBucketSpec) -> Result<(), ValidationError> {
    validate_bucket_name(&spec.bucket_name)?;

    if spec.access_key_ref.trim().is_empty() {
        return Err(ValidationError::for_field(
            "spec.accessKeyRef",
            "spec.accessKeyRef must not be empty",
        ));
    }
    if spec.max_size_bytes == Some(0) {
        return Err(ValidationError::for_field(
            "spec.maxSizeBytes",
            "spec.maxSizeBytes must be greater than zero when set",
        ));
    }
    Ok(())
}

#[async_trait]
impl Validator<ObjectBucket> for BucketValidator {
    async fn validate_creation(
        &self,
        ctx: &AdmissionContext,
        new: &ObjectBucket,
    ) -> Result<(), ValidatorError> {
        info!(user = ?ctx.username, bucket = %new.spec.bucket_name, "validating bucket creation");
        validate_spec(&new.spec)?;
        Ok(())
    }

    async fn validate_update(
        &self,
        ctx: &AdmissionContext,
        new: &ObjectBucket,
        old: &ObjectBucket,
    ) -> Result<(), ValidatorError> {
        info!(user = ?ctx.username, bucket = %new.name_any(), "validating bucket update");

        if new.spec.bucket_name != old.spec.bucket_name {
            return Err(ValidationError::immutable(
                "spec.bucketName",
                &old.spec.bucket_name,
                &new.spec.bucket_name,
            )
            .into());
        }
        if new.spec.access_key_ref != old.spec.access_key_ref {
            return Err(ValidationError::immutable(
                "spec.accessKeyRef",
                &old.spec.access_key_ref,
                &new.spec.access_key_ref,
            )
            .into());
        }

        validate_spec(&new.spec)?;
        Ok(())
    }

    async fn validate_deletion(
        &self,
        ctx: &AdmissionContext,
        old: &ObjectBucket,
    ) -> Result<(), ValidatorError> {
        info!(
            user = ?ctx.username,
            bucket = %old.spec.bucket_name,
            "bucket deletion requested"
        );
        Ok(())
    }
}
