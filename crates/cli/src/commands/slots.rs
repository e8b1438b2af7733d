use std::sync::Arc;

use lineup_core::domain::slot::{format_date, parse_date};
use lineup_core::{ApplicationError, DomainError, FrontDesk, NoopNotifier, ProviderId};
use lineup_db::{connect_with_config, SqlLineupRepository};

use crate::commands::{
    load_config, runtime, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_INVALID_INPUT, EXIT_NOT_FOUND,
};

pub fn run(provider_id: i64, date: &str) -> CommandResult {
    let date = match parse_date(date) {
        Ok(date) => date,
        Err(error) => {
            return CommandResult::failure(
                "slots",
                "invalid_input",
                error.to_string(),
                EXIT_INVALID_INPUT,
            );
        }
    };
    let config = match load_config("slots") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("slots") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY))?;
        let desk = FrontDesk::with_horizon(
            Arc::new(SqlLineupRepository::new(pool.clone())),
            Arc::new(NoopNotifier),
            config.booking.horizon_days,
        );
        let slots = desk.available_slots(ProviderId(provider_id), date).await;
        pool.close().await;
        slots.map_err(classify)
    });

    match result {
        Ok(slots) if slots.is_empty() => {
            CommandResult::success("slots", format!("{}: no free slots", format_date(date)))
        }
        Ok(slots) => {
            let rendered: Vec<String> = slots.iter().map(ToString::to_string).collect();
            let listing = format!("{}: {}", format_date(date), rendered.join(", "));
            CommandResult::success("slots", listing)
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("slots", error_class, message, exit_code)
        }
    }
}

fn classify(error: ApplicationError) -> (&'static str, String, u8) {
    match error.domain() {
        Some(DomainError::ProviderNotFound { .. }) => {
            ("not_found", error.to_string(), EXIT_NOT_FOUND)
        }
        Some(_) => ("invalid_input", error.to_string(), EXIT_INVALID_INPUT),
        None => ("db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY),
    }
}
