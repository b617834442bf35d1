// ABOUTME: Validation capability for signed commands and fetched Data.
// ABOUTME: Ships a DigestSha256 validator; other trust policies plug in through the trait.

use async_trait::async_trait;
use ndnrepo_core::{Data, Interest, Name, data::DIGEST_SHA256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {0}")]
pub struct ValidationError(pub String);

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate_data(&self, data: &Data) -> Result<(), ValidationError>;

    async fn validate_command(&self, interest: &Interest) -> Result<(), ValidationError>;
}

/// Accepts packets carrying a correct DigestSha256 signature.
///
/// Commands must also fall under the configured command prefix.
#[derive(Debug, Clone)]
pub struct DigestSha256Validator {
    command_prefix: Name,
}

impl DigestSha256Validator {
    pub fn new(command_prefix: Name) -> Self {
        Self { command_prefix }
    }
}

#[async_trait]
impl Validator for DigestSha256Validator {
    async fn validate_data(&self, data: &Data) -> Result<(), ValidationError> {
        let signature_type = data.signature_info().signature_type;
        if signature_type != DIGEST_SHA256 {
            return Err(ValidationError(format!(
                "{}: unsupported signature type {}",
                data.name(),
                signature_type
            )));
        }
        if !data.verify_digest_sha256() {
            return Err(ValidationError(format!("{}: digest mismatch", data.name())));
        }
        Ok(())
    }

    async fn validate_command(&self, interest: &Interest) -> Result<(), ValidationError> {
        if !self.command_prefix.is_prefix_of(interest.name()) {
            return Err(ValidationError(format!(
                "{} is outside command prefix {}",
                interest.name(),
                self.command_prefix
            )));
        }
        if !interest.verify_digest_sha256() {
            return Err(ValidationError(format!(
                "{}: missing or invalid command signature",
                interest.name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndnrepo_core::command::{RepoCommandParameter, SyncVerb, command_interest, command_name};

    fn validator() -> DigestSha256Validator {
        DigestSha256Validator::new(Name::from_uri("/repo/command").unwrap())
    }

    #[tokio::test]
    async fn accepts_digest_signed_data_and_rejects_forgeries() {
        let good = Data::builder(Name::from_uri("/d").unwrap()).sign_digest_sha256();
        assert!(validator().validate_data(&good).await.is_ok());

        let forged = Data::builder(Name::from_uri("/d").unwrap()).sign_with(DIGEST_SHA256, |_| vec![1; 32]);
        assert!(validator().validate_data(&forged).await.is_err());

        let other_type = Data::builder(Name::from_uri("/d").unwrap()).sign_with(3, |_| vec![0; 64]);
        let err = validator().validate_data(&other_type).await.unwrap_err();
        assert!(err.to_string().contains("unsupported signature type 3"));
    }

    #[tokio::test]
    async fn commands_need_prefix_and_signature() {
        let prefix = Name::from_uri("/repo/command").unwrap();
        let parameter = RepoCommandParameter::with_name(Name::from_uri("/sync").unwrap());

        let signed = command_interest(&prefix, SyncVerb::Start, &parameter);
        assert!(validator().validate_command(&signed).await.is_ok());

        let unsigned = Interest::new(command_name(&prefix, SyncVerb::Start, &parameter));
        assert!(validator().validate_command(&unsigned).await.is_err());

        let elsewhere = command_interest(&Name::from_uri("/other").unwrap(), SyncVerb::Start, &parameter);
        assert!(validator().validate_command(&elsewhere).await.is_err());
    }
}
