//! ahctl - Arrowhead onboarding and service registry tool

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    arrowhead_cli::run().await
}
