use std::fs;
use std::path::Path;

use crate::commands::CommandResult;
use rolodex_core::config::{AppConfig, LoadOptions};
use rolodex_core::export::customers_csv;
use rolodex_db::connect;
use rolodex_db::store::{CrmStore, SqlCrmStore};

pub fn run(output: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "export",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "export",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let store = SqlCrmStore::new(pool.clone());
        let customers =
            store.list_customers().await.map_err(|error| ("query", error.to_string(), 5u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(customers)
    });

    let customers = match result {
        Ok(customers) => customers,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("export", error_class, message, exit_code);
        }
    };

    let csv = customers_csv(&customers);
    match output {
        Some(path) => match fs::write(path, &csv) {
            Ok(()) => CommandResult::success(
                "export",
                format!("wrote {} customer row(s) to {}", customers.len(), path.display()),
            ),
            Err(error) => CommandResult::failure(
                "export",
                "io",
                format!("could not write `{}`: {error}", path.display()),
                6,
            ),
        },
        // Without a path, the CSV itself is the command output.
        None => CommandResult { exit_code: 0, output: csv },
    }
}
