//! Market Bot
//!
//! Watches an in-game marketplace price with screen capture and Tesseract
//! OCR, and refreshes or buys depending on per-profile price thresholds.
//! Driven by global hotkeys on Windows; profiles are managed from the CLI.

mod automation;
mod capture;
mod cli;
mod error;
mod hotkeys;
mod logging;
mod ocr;
mod paths;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
#[cfg(windows)]
use tracing::info;

use crate::automation::{ProfileStore, ThresholdProfile};
use crate::cli::{Cli, Commands, ProfilesCommand, RunArgs, SetProfileArgs, TestOcrArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    paths::ensure_directories()?;
    logging::init(&cli.log_level, &paths::get_logs_dir());
    logging::install_panic_hook();

    let store = ProfileStore::new(cli.config.unwrap_or_else(paths::get_profiles_path));

    match cli.command {
        Commands::Run(args) => run_bot(&store, args),
        Commands::Profiles(command) => manage_profiles(&store, command),
        Commands::TestOcr(args) => test_ocr(&store, args),
    }
}

fn manage_profiles(store: &ProfileStore, command: ProfilesCommand) -> Result<()> {
    match command {
        ProfilesCommand::List => {
            let set = store.load();
            for profile in &set.configs {
                let marker = if profile.name == set.active_config_name {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {:<20} ideal {:>8}  unacceptable {:>8}{}{}{}",
                    marker,
                    profile.name,
                    profile.ideal_price,
                    profile.unacceptable_price,
                    if profile.convertible { "  [convertible]" } else { "" },
                    if profile.key_mode { "  [key]" } else { "" },
                    if profile.half_coin_mode { "  [half-coin]" } else { "" },
                );
            }
        }
        ProfilesCommand::Show { name } => {
            let profile = match name {
                Some(name) => find_profile(store, &name)?,
                None => store.get_active(),
            };
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
        ProfilesCommand::Activate { name } => {
            find_profile(store, &name)?;
            store.set_active(&name)?;
            println!("Active profile: {}", name);
        }
        ProfilesCommand::Set(args) => {
            let activate = args.activate;
            let profile = profile_from_args(args);
            let name = profile.name.clone();
            store.upsert(profile)?;
            if activate {
                store.set_active(&name)?;
            }
            println!("Saved profile {}", name);
        }
        ProfilesCommand::Remove { name } => {
            if !store.remove(&name)? {
                bail!("Profile '{}' does not exist or is the last profile", name);
            }
            println!("Removed profile {}", name);
        }
    }
    Ok(())
}

fn find_profile(store: &ProfileStore, name: &str) -> Result<ThresholdProfile> {
    store
        .load()
        .find(name)
        .cloned()
        .ok_or_else(|| anyhow!("No profile named '{}' in {}", name, store.path().display()))
}

fn profile_from_args(args: SetProfileArgs) -> ThresholdProfile {
    ThresholdProfile {
        name: args.name,
        ideal_price: args.ideal,
        unacceptable_price: args.unacceptable,
        volume: args.volume,
        screenshot_delay_ms: args.screenshot_delay_ms,
        loop_gap_ms: args.loop_gap_ms,
        convertible: args.convertible,
        key_mode: args.key_mode,
        half_coin_mode: args.half_coin_mode,
    }
}

#[cfg(windows)]
fn screen_marketplace(
    layout: &automation::MarketLayout,
) -> Result<automation::ScreenMarketplace> {
    use crate::automation::input::SendInputDriver;
    use crate::capture::{DebugCapture, ScreenCapture, ScreenRegionCapture};

    let tesseract = ocr::ensure_tesseract()?;
    let recognizer = ocr::TesseractEngine::new(tesseract, layout.ocr_threshold);

    let capture: Box<dyn ScreenCapture> = if layout.debug_mode {
        info!(
            "Debug mode: saving captures to {}",
            paths::get_screenshots_dir().display()
        );
        Box::new(DebugCapture::new(
            ScreenRegionCapture::new(),
            paths::get_screenshots_dir(),
        ))
    } else {
        Box::new(ScreenRegionCapture::new())
    };

    Ok(automation::ScreenMarketplace::new(
        capture,
        Box::new(recognizer),
        Box::new(SendInputDriver::new()),
        layout.clone(),
    ))
}

#[cfg(windows)]
fn run_bot(store: &ProfileStore, args: RunArgs) -> Result<()> {
    use crate::automation::input::SystemCursor;
    use crate::automation::{Controller, LoopParams};

    let set = store.load();
    let profile = match args.profile {
        Some(name) => set
            .find(&name)
            .cloned()
            .ok_or_else(|| anyhow!("No profile named '{}'", name))?,
        None => set.active(),
    };
    info!(
        "Profile '{}': ideal {}, unacceptable {}",
        profile.name, profile.ideal_price, profile.unacceptable_price
    );

    let market = screen_marketplace(&set.layout)?;
    let controller = Controller::new(
        Box::new(market),
        Box::new(SystemCursor),
        LoopParams::from(&profile),
    );

    info!("Hover the item and press F8 to start");
    hotkeys::run_message_loop(&controller)?;

    let status = controller.status();
    info!(
        "Exited after {} iterations, {} cancelled purchases (last action: {})",
        status.iterations,
        status.cancelled_purchases,
        status
            .last_action
            .map(|a| a.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(())
}

#[cfg(not(windows))]
fn run_bot(_store: &ProfileStore, _args: RunArgs) -> Result<()> {
    bail!("`run` needs screen capture and input injection, which are only available on Windows")
}

#[cfg(windows)]
fn test_ocr(store: &ProfileStore, args: TestOcrArgs) -> Result<()> {
    use crate::automation::Marketplace;

    let set = store.load();
    let mut market = screen_marketplace(&set.layout)?;

    match market.read_price(args.convertible) {
        Ok(price) => println!("Price: {}", price),
        Err(e) => println!("Price unreadable: {}", e),
    }
    if args.balance {
        match market.read_balance() {
            Ok(balance) => println!("Balance: {}", balance),
            Err(e) => println!("Balance unreadable: {}", e),
        }
    }
    Ok(())
}

#[cfg(not(windows))]
fn test_ocr(_store: &ProfileStore, _args: TestOcrArgs) -> Result<()> {
    bail!("`test-ocr` needs screen capture, which is only available on Windows")
}
