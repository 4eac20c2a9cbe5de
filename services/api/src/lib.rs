mod cli;
mod demo;
mod infra;
mod routes;
mod server;

use mbkm_registration::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
