//! IDMaker Worker Service Entry Point
//!
//! Loads a `.env` file if present, then hands over to [`run`].

use idmaker_worker::run;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    run().await
}
