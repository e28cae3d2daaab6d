//
// main.rs
// dicom-deident
//
// Tokio entry point that hands off execution to the CLI layer.
//

use dicom_deident::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
