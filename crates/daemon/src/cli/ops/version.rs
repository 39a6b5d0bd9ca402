use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Version {}

#[derive(Debug, thiserror::Error)]
pub enum VersionError {}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = VersionError;
    type Output = String;

    async fn execute(
        &self,
        _ctx: &crate::cli::op::OpContext,
    ) -> Result<Self::Output, Self::Error> {
        Ok(format!("qpskd {}", env!("CARGO_PKG_VERSION")))
    }
}
