// src/utils/env.rs - Environment loading

use log::debug;

/// Load environment variables from a local .env file if one exists.
/// Variables already set in the process environment take precedence.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(_) => debug!("No .env file found, using process environment"),
    }
}
