use threadline_db::{DemoCatalog, SqlCatalogRepository};

use crate::commands::{build_runtime, load_config, open_database, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match build_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        let repository = SqlCatalogRepository::new(pool.clone());

        let outcome = async {
            let seeded = DemoCatalog::load(&repository)
                .await
                .map_err(|error| ("seed_execution", error.to_string(), 6u8))?;
            let verification = DemoCatalog::verify(&repository)
                .await
                .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

            if verification.all_present {
                Ok::<usize, StepFailure>(seeded.products_seeded)
            } else {
                Err(("seed_verification", verification_message(&verification.checks), 6u8))
            }
        }
        .await;

        pool.close().await;
        outcome
    });

    match result {
        Ok(count) => CommandResult::success(
            "seed",
            format!(
                "demo catalog loaded: {count} products (run `threadline index` to refresh search)"
            ),
        ),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn verification_message(checks: &[(i64, bool)]) -> String {
    let missing = checks
        .iter()
        .filter_map(|(id, present)| (!present).then(|| id.to_string()))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for product ids: {}", missing.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_message_names_missing_products() {
        let message = verification_message(&[(1, true), (3, false), (7, false)]);
        assert_eq!(message, "Seed verification failed for product ids: 3, 7");
    }

    #[test]
    fn verification_message_falls_back_to_generic_when_nothing_is_missing() {
        assert_eq!(verification_message(&[(1, true)]), "Some seed data failed to load");
    }
}
