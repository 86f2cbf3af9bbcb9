//! Nurture application binary - composition root.
//!
//! Ties the Nurture crates into a single executable:
//! 1. Parse the CLI and load configuration from TOML, env and flags
//! 2. Open the SQLite database under the data directory
//! 3. Pick the media store and chatbot backend
//! 4. Start the axum REST API server, or bootstrap an Admin account

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use uuid::Uuid;

use nurture_api::chat::{GeminiClient, TextGenerator};
use nurture_api::media::{CloudinaryStore, DiskMediaStore, MediaStore};
use nurture_api::state::AppState;
use nurture_core::config::{MediaProvider, NurtureConfig};
use nurture_core::types::{Employee, EmployeeStatus, Role};
use nurture_core::validate::{require_email, require_password};
use nurture_storage::{Database, EmployeeRepository};

use cli::{CliArgs, Command, CreateAdminArgs, ServeArgs};

/// Expand ~ to the home directory in a path string.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Relative media directories live under the data directory.
fn resolve_media_dir(data_dir: &Path, disk_dir: &str) -> PathBuf {
    let dir = expand_home(disk_dir);
    if dir.is_absolute() {
        dir
    } else {
        data_dir.join(dir)
    }
}

fn open_database(data_dir: &Path) -> Result<Database, Box<dyn std::error::Error>> {
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("nurture.db");
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    Ok(db)
}

async fn serve(
    mut config: NurtureConfig,
    data_dir: PathBuf,
    args: ServeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    config.server.port = args.resolve_port(config.server.port);

    if args.dev {
        tracing::warn!("Running in dev mode; placeholder token secrets are allowed");
    } else {
        config.validate_secrets()?;
    }

    let db = open_database(&data_dir)?;

    let mut media_dir = None;
    let media: Arc<dyn MediaStore> = match config.media.provider {
        MediaProvider::Disk => {
            let root = resolve_media_dir(&data_dir, &config.media.disk_dir);
            let store = DiskMediaStore::new(
                root.clone(),
                &config.media.folder,
                &config.media.public_base_url,
            )?;
            tracing::info!(dir = %root.display(), "Storing media on disk");
            media_dir = Some(root);
            Arc::new(store)
        }
        MediaProvider::Cloudinary => {
            let store = CloudinaryStore::new(&config.media)?;
            tracing::info!(cloud = %config.media.cloud_name, "Storing media on Cloudinary");
            Arc::new(store)
        }
    };

    let chat: Option<Arc<dyn TextGenerator>> = if config.chat.is_available() {
        tracing::info!(model = %config.chat.model, "Chatbot enabled");
        Some(Arc::new(GeminiClient::new(&config.chat)?))
    } else {
        tracing::info!("Chatbot disabled (no API key or turned off)");
        None
    };

    let mut state = AppState::new(config.clone(), db, media, chat);
    if let Some(dir) = media_dir {
        state = state.with_media_dir(dir);
    }

    nurture_api::start_server(&config, state).await?;
    Ok(())
}

async fn create_admin(
    config: &NurtureConfig,
    data_dir: &Path,
    args: CreateAdminArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = args.name.trim();
    let designation = args.designation.trim();
    if name.is_empty() || designation.is_empty() {
        return Err("--name and --designation must not be empty".into());
    }
    let email = require_email("email", &args.email)?;
    require_password(&args.password)?;

    let employees = EmployeeRepository::new(Arc::new(open_database(data_dir)?));
    if employees.find_by_email(&email)?.is_some() {
        return Err(format!("An employee with email {} already exists", email).into());
    }

    let password_hash =
        nurture_api::auth::hash_password(&args.password, config.auth.bcrypt_cost).await?;
    let now = Utc::now();
    let admin = Employee {
        id: Uuid::new_v4(),
        employee_id: nurture_core::ids::employee_id(),
        name: name.to_string(),
        email,
        password_hash,
        gender: None,
        phone: None,
        designation: designation.to_string(),
        department: None,
        role: Role::Admin,
        status: EmployeeStatus::Active,
        date_of_joining: Some(now.date_naive()),
        avatar: None,
        refresh_token: None,
        created_at: now,
        updated_at: now,
    };
    employees.insert(&admin)?;

    tracing::info!(employee_id = %admin.employee_id, email = %admin.email, "Admin account created");
    println!("Created admin {} ({})", admin.employee_id, admin.email);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = NurtureConfig::load_or_default(&config_file);
    config.apply_env_overrides();
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Nurture v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration resolved");

    let data_dir = expand_home(&config.general.data_dir);

    match args.command {
        Command::Serve(serve_args) => serve(config, data_dir, serve_args).await,
        Command::CreateAdmin(admin_args) => create_admin(&config, &data_dir, admin_args).await,
    }
}
