//
// main.rs
// dicom-veil
//
// Tokio entry point on a single cooperative thread; all work is handed to the CLI layer.
//

use dicom_veil::cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
