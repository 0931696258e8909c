//! Profile commands: saved cloud endpoints and credentials.

use colored::*;

use provlink_core::error::CoreError;
use provlink_core::storage::{Profile, ProfileStore};

use crate::cli::{ProfileArgs, ProfileCommands, ProfileDeleteArgs, ProfileSetArgs};
use crate::error::Result;
use crate::output::get_formatter;

/// Run the profile command
pub async fn run_profile(args: ProfileArgs, json: bool) -> Result<()> {
    let store = ProfileStore::open().map_err(CoreError::Storage)?;
    match args.command {
        ProfileCommands::Set(args) => run_set(&store, args, json).await,
        ProfileCommands::Show => run_show(&store, json).await,
        ProfileCommands::Delete(args) => run_delete(&store, args, json).await,
    }
}

async fn run_set(store: &ProfileStore, args: ProfileSetArgs, json: bool) -> Result<()> {
    let profile = Profile {
        name: args.name.clone(),
        base_url: args.base_url,
        access_token: args.access_token,
        user_id: args.user_id,
    };
    store.save(&profile).await.map_err(CoreError::Storage)?;
    store
        .set_current(&args.name)
        .await
        .map_err(CoreError::Storage)?;

    let formatter = get_formatter(json);
    println!(
        "{}",
        formatter.format_message(&format!("Profile '{}' saved and selected", args.name))
    );
    Ok(())
}

async fn run_show(store: &ProfileStore, json: bool) -> Result<()> {
    let names = store.list().await.map_err(CoreError::Storage)?;
    let current = store.current().await.ok();

    if json {
        let output = serde_json::json!({
            "current": current.as_ref().map(|p| &p.name),
            "profiles": names,
        });
        println!("{}", get_formatter(true).format_value(&output));
        return Ok(());
    }

    match &current {
        Some(profile) => {
            println!("Current profile: {}", profile.name.bold());
            println!("  Base URL: {}", profile.base_url);
            println!("  User ID:  {}", profile.user_id);
        }
        None => println!("No current profile."),
    }
    if names.is_empty() {
        println!("No profiles saved.");
    } else {
        println!("Saved profiles:");
        for name in &names {
            let marker = if Some(name.as_str())
                == current.as_ref().map(|p| p.name.as_str())
            {
                "*"
            } else {
                " "
            };
            println!("  {} {}", marker, name);
        }
    }
    Ok(())
}

async fn run_delete(store: &ProfileStore, args: ProfileDeleteArgs, json: bool) -> Result<()> {
    store.delete(&args.name).await.map_err(CoreError::Storage)?;
    let formatter = get_formatter(json);
    println!(
        "{}",
        formatter.format_message(&format!("Profile '{}' deleted", args.name))
    );
    Ok(())
}
