use crate::common::config::PasswordSource;
use crate::common::types::{EtlError, EtlResult};
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use tracing::info;

/// Resolve the Peloton password, reading Secrets Manager when configured to.
pub async fn resolve_password(source: &PasswordSource) -> EtlResult<String> {
    match source {
        PasswordSource::Plain(password) => Ok(password.clone()),
        PasswordSource::SecretsManager { secret_arn } => {
            let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            let secrets_client = SecretsManagerClient::new(&config);

            let secret_value = secrets_client
                .get_secret_value()
                .secret_id(secret_arn)
                .send()
                .await
                .map_err(|e| EtlError::Configuration(format!("Failed to retrieve secret: {e}")))?;

            let password = secret_value
                .secret_string()
                .ok_or_else(|| EtlError::Configuration("Secret string not found".to_string()))?;

            info!("Loaded Peloton password from Secrets Manager");
            Ok(password.to_string())
        }
    }
}
