use threadline_db::{CatalogRepository, SqlCatalogRepository};

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("start") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("start") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let repository = SqlCatalogRepository::new(pool.clone());
        let counts = async {
            let products = repository
                .list_products()
                .await
                .map_err(|error| ("catalog_read", error.to_string(), 4u8))?;
            let documents = repository
                .count_documents()
                .await
                .map_err(|error| ("catalog_read", error.to_string(), 4u8))?;
            Ok::<(usize, u64), StepFailure>((products.len(), documents))
        }
        .await;
        pool.close().await;
        counts
    });

    match result {
        Ok((products, documents)) => {
            let mut message = format!(
                "preflight passed: webhook would serve http://{}:{}/whatsapp with model {} ({products} products, {documents} catalog documents)",
                config.server.bind_address, config.server.port, config.llm.model
            );
            if products == 0 {
                message.push_str("; catalog is empty, run `threadline seed`");
            } else if documents == 0 {
                message.push_str("; search index is empty, run `threadline index`");
            }
            CommandResult::success("start", message)
        }
        Err(failure) => CommandResult::from_failure("start", failure),
    }
}
