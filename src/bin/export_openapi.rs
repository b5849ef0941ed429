//! Write the gateway's OpenAPI document as JSON
//!
//! Usage:
//!   cargo run --bin export_openapi > openapi.json
//!   cargo run --bin export_openapi -- --output docs/openapi.json

use escrow_desk::gateway::openapi::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let json = ApiDoc::openapi().to_pretty_json()?;

    let args: Vec<String> = std::env::args().collect();
    match args.iter().position(|a| a == "--output") {
        Some(i) => {
            let path = args
                .get(i + 1)
                .ok_or_else(|| anyhow::anyhow!("--output needs a path"))?;
            std::fs::write(path, &json)?;
            eprintln!("OpenAPI document written to {}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
