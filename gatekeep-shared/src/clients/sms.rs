use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sns::Client as SnsClient;

/// Outbound SMS transport.
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, phone_number: &str, message: &str) -> anyhow::Result<()>;
}

/// Direct-to-phone SMS through AWS SNS.
#[derive(Clone)]
pub struct SnsSmsClient {
    client: SnsClient,
}

impl SnsSmsClient {
    /// Credentials come from the default AWS provider chain.
    pub async fn new(region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        tracing::info!(region = %region, "SNS client initialized");
        Self {
            client: SnsClient::new(&config),
        }
    }
}

#[async_trait]
impl SmsSender for SnsSmsClient {
    async fn send_sms(&self, phone_number: &str, message: &str) -> anyhow::Result<()> {
        self.client
            .publish()
            .phone_number(phone_number)
            .message(message)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("sns publish failed: {}", aws_sdk_sns::error::DisplayErrorContext(&e)))?;

        tracing::debug!("sms sent");
        Ok(())
    }
}
