mod api;
mod config;
mod consts;
mod environment;
mod error_classifier;
mod events;
mod grid_item;
mod layout;
mod loader;
mod logging;
mod pretty;
mod resolver;
mod session;
mod transfer;
mod variables;

use crate::api::{ApiClient, DashboardApi};
use crate::config::{Config, get_config_path};
use crate::environment::Environment;
use crate::pretty::{print_cmd_error, print_cmd_info};
use crate::session::{DashboardSession, run_headless_mode, setup_session};
use crate::transfer::{
    EXPORT_FILENAME, copy_grid_item, export_grid_item, import_grid_item, next_item_key,
};
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Command-line arguments
struct Args {
    /// Command to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Open a dashboard and stream engine events until Ctrl+C.
    Show {
        /// Dashboard ID
        #[arg(long, value_name = "DASHBOARD_ID")]
        id: Option<u64>,
    },
    /// Export a grid item as a standalone JSON document.
    ExportItem {
        /// Dashboard ID
        #[arg(long, value_name = "DASHBOARD_ID")]
        id: Option<u64>,

        /// Key (`i`) of the grid item to export.
        #[arg(long, value_name = "ITEM_KEY")]
        item: String,

        /// Output file. Defaults to TethysDashGridItem.json.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Import a grid item document into a dashboard and save it.
    ImportItem {
        /// Dashboard ID
        #[arg(long, value_name = "DASHBOARD_ID")]
        id: Option<u64>,

        /// Grid item document produced by export-item.
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
    },
    /// Duplicate a grid item within a dashboard and save it.
    CopyItem {
        /// Dashboard ID
        #[arg(long, value_name = "DASHBOARD_ID")]
        id: Option<u64>,

        /// Key (`i`) of the grid item to copy.
        #[arg(long, value_name = "ITEM_KEY")]
        item: String,
    },
    /// Remember a dashboard as the default for later commands.
    SetDefault {
        /// Dashboard ID
        #[arg(long, value_name = "DASHBOARD_ID")]
        id: u64,
    },
    /// Clear the remembered dashboard configuration.
    Logout,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let environment_str = std::env::var("TETHYSDASH_ENVIRONMENT").unwrap_or_default();
    let environment = environment_str
        .parse::<Environment>()
        .unwrap_or(Environment::default());

    let config_path = get_config_path()?;
    let args = Args::parse();
    match args.command {
        Command::Show { id } => {
            let dashboard_id = resolve_dashboard_id(id, &config_path)?;
            let session_data = setup_session(dashboard_id, environment).await?;
            run_headless_mode(session_data).await
        }
        Command::ExportItem { id, item, output } => {
            let dashboard_id = resolve_dashboard_id(id, &config_path)?;
            export_item(environment, dashboard_id, &item, output).await
        }
        Command::ImportItem { id, file } => {
            let dashboard_id = resolve_dashboard_id(id, &config_path)?;
            import_item(environment, dashboard_id, &file).await
        }
        Command::CopyItem { id, item } => {
            let dashboard_id = resolve_dashboard_id(id, &config_path)?;
            copy_item(environment, dashboard_id, &item).await
        }
        Command::SetDefault { id } => {
            let config = Config::new(id.to_string());
            config
                .save(&config_path)
                .map_err(|e| format!("Failed to save config: {}", e))?;
            println!("Dashboard {} is now the default.", id);
            Ok(())
        }
        Command::Logout => {
            println!("Logging out and clearing dashboard configuration file...");
            Config::clear(&config_path).map_err(Into::into)
        }
    }
}

/// Picks the dashboard to operate on: an explicit `--id` wins, otherwise
/// the remembered default from the config file.
fn resolve_dashboard_id(id: Option<u64>, config_path: &Path) -> Result<u64, Box<dyn Error>> {
    if let Some(id) = id {
        return Ok(id);
    }
    if config_path.exists() {
        if let Ok(config) = Config::load_from_file(config_path) {
            if let Ok(id) = config.dashboard_id.parse::<u64>() {
                return Ok(id);
            }
        }
    }
    Err(Box::from(
        "No dashboard ID provided. Pass --id or run `tethysdash set-default` first.",
    ))
}

async fn export_item(
    environment: Environment,
    dashboard_id: u64,
    item_key: &str,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn Error>> {
    let api = ApiClient::new(environment);
    let response = api.get_dashboard(dashboard_id).await?;
    let dashboard = match (response.success, response.dashboard) {
        (true, Some(dashboard)) => dashboard,
        _ => {
            let message = response
                .message
                .unwrap_or_else(|| "Dashboard not found".to_string());
            print_cmd_error!("Export failed", "{}", message);
            return Err(Box::from(message));
        }
    };

    let Some(item) = dashboard.grid_items.iter().find(|item| item.i == item_key) else {
        let message = format!(
            "Dashboard {} has no grid item with key '{}'",
            dashboard_id, item_key
        );
        print_cmd_error!("Export failed", "{}", message);
        return Err(Box::from(message));
    };

    let document = export_grid_item(&api, item).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(EXPORT_FILENAME));
    std::fs::write(&path, serde_json::to_string_pretty(&document)?)?;
    print_cmd_info!("Export", "Grid item '{}' written to {}", item_key, path.display());
    Ok(())
}

async fn import_item(
    environment: Environment,
    dashboard_id: u64,
    file: &Path,
) -> Result<(), Box<dyn Error>> {
    let document: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(file)?)?;

    let api = Arc::new(ApiClient::new(environment));
    let (event_tx, _event_rx) =
        tokio::sync::mpsc::channel(crate::consts::engine_consts::EVENT_QUEUE_SIZE);
    let mut session = DashboardSession::new(
        api.clone(),
        dashboard_id,
        crate::events::EventSender::new(event_tx),
    );
    if session.load().await == crate::events::SessionPhase::Failed {
        let message = format!("Dashboard {} failed to load", dashboard_id);
        print_cmd_error!("Import failed", "{}", message);
        return Err(Box::from(message));
    }

    let mut imported = match import_grid_item(api.as_ref(), &document).await {
        Ok(item) => item,
        Err(error) => {
            print_cmd_error!("Import failed", "{}", error);
            return Err(Box::new(error));
        }
    };

    // A key collision with an existing item gets the next free numeric key.
    let mut items = session.registry().items().to_vec();
    if items.iter().any(|existing| existing.i == imported.i) {
        imported.i = next_item_key(&items);
    }
    let imported_key = imported.i.clone();
    items.push(imported);

    session.update_grid_items(items);
    let response = session.save_layout().await?;
    if !response.success {
        let message = response
            .message
            .unwrap_or_else(|| "Save rejected".to_string());
        print_cmd_error!("Import failed", "{}", message);
        return Err(Box::from(message));
    }

    print_cmd_info!(
        "Import",
        "Grid item '{}' added to dashboard {}",
        imported_key,
        dashboard_id
    );
    Ok(())
}

async fn copy_item(
    environment: Environment,
    dashboard_id: u64,
    item_key: &str,
) -> Result<(), Box<dyn Error>> {
    let api = Arc::new(ApiClient::new(environment));
    let (event_tx, _event_rx) =
        tokio::sync::mpsc::channel(crate::consts::engine_consts::EVENT_QUEUE_SIZE);
    let mut session =
        DashboardSession::new(api, dashboard_id, crate::events::EventSender::new(event_tx));
    if session.load().await == crate::events::SessionPhase::Failed {
        let message = format!("Dashboard {} failed to load", dashboard_id);
        print_cmd_error!("Copy failed", "{}", message);
        return Err(Box::from(message));
    }

    let items = session.registry().items().to_vec();
    let Some(index) = items.iter().position(|existing| existing.i == item_key) else {
        let message = format!(
            "Dashboard {} has no grid item with key '{}'",
            dashboard_id, item_key
        );
        print_cmd_error!("Copy failed", "{}", message);
        return Err(Box::from(message));
    };

    let mut values = session.variable_input_values().clone();
    let extended = match copy_grid_item(&items, index, &mut values) {
        Ok(extended) => extended,
        Err(error) => {
            print_cmd_error!("Copy failed", "{}", error);
            return Err(Box::new(error));
        }
    };
    let copied_key = extended[extended.len() - 1].i.clone();
    // Carry the value seeded for a copied variable input into the session.
    for (name, value) in values {
        session.set_variable_input(name, value);
    }
    session.update_grid_items(extended);

    let response = session.save_layout().await?;
    if !response.success {
        let message = response
            .message
            .unwrap_or_else(|| "Save rejected".to_string());
        print_cmd_error!("Copy failed", "{}", message);
        return Err(Box::from(message));
    }

    print_cmd_info!(
        "Copy",
        "Grid item '{}' copied as '{}' on dashboard {}",
        item_key,
        copied_key,
        dashboard_id
    );
    Ok(())
}
