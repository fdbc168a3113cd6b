use crate::config::{CONFIG_FILENAME, DEFAULT_DB_FILENAME, TODOS_DIR_NAME};
use crate::error::{Result, TdError};
use crate::storage::SqliteStorage;
use std::fs;
use std::path::Path;
use tracing::info;

const CONFIG_TEMPLATE: &str = r"# td project configuration
# lock-timeout: 30000
# query:
#   max-results: 10000
# webhook:
#   url: http://localhost:9000/td
#   secret: change-me
";

const GITIGNORE: &str = r"# Database
*.db
*.db-shm
*.db-wal
";

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if a database exists, or an I/O error.
pub fn execute(root_dir: Option<&Path>, json: bool) -> Result<()> {
    let base_dir = root_dir.unwrap_or_else(|| Path::new("."));
    let todos_dir = base_dir.join(TODOS_DIR_NAME);
    let db_path = todos_dir.join(DEFAULT_DB_FILENAME);

    if db_path.exists() {
        return Err(TdError::AlreadyInitialized { path: db_path });
    }
    fs::create_dir_all(&todos_dir)?;

    // Opening applies the schema.
    SqliteStorage::open(&db_path)?;

    let config_path = todos_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        fs::write(config_path, CONFIG_TEMPLATE)?;
    }
    let gitignore_path = todos_dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(gitignore_path, GITIGNORE)?;
    }

    info!(path = %todos_dir.display(), "initialized workspace");
    if json {
        super::print_json(&serde_json::json!({
            "initialized": true,
            "path": todos_dir.display().to_string(),
        }))?;
    } else {
        println!("Initialized td workspace in {TODOS_DIR_NAME}/");
    }
    Ok(())
}
