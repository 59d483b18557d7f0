//! Threshold profiles and screen layout, persisted as JSON.
//!
//! The profile file holds every named profile plus a pointer to the active
//! one. A file written by older versions (a single bare profile object) is
//! migrated on read. A missing file is created with defaults; a corrupt file
//! falls back to in-memory defaults without touching the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Reference resolution the default layout was measured at.
pub const DEVELOPER_RESOLUTION: (f32, f32) = (2560.0, 1440.0);

/// Name used for the profile created when no file exists.
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Used for defining screen regions that scale with screen size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of screen width
    pub width: f32,
    /// Height as fraction of screen height
    pub height: f32,
}

impl RelativeRect {
    /// Builds a relative rect from two pixel corners at the developer resolution.
    pub fn from_pixels(top_left: (f32, f32), bottom_right: (f32, f32)) -> Self {
        let (w, h) = DEVELOPER_RESOLUTION;
        Self {
            x: top_left.0 / w,
            y: top_left.1 / h,
            width: (bottom_right.0 - top_left.0) / w,
            height: (bottom_right.1 - top_left.1) / h,
        }
    }

    /// Maps the rect onto a `width` x `height` surface, clamped to its bounds.
    /// Returns `(x, y, width, height)` in pixels.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let x0 = ((self.x.max(0.0) * width as f32) as u32).min(width);
        let y0 = ((self.y.max(0.0) * height as f32) as u32).min(height);
        let rw = ((self.width.max(0.0) * width as f32) as u32).min(width - x0);
        let rh = ((self.height.max(0.0) * height as f32) as u32).min(height - y0);
        (x0, y0, rw, rh)
    }
}

impl Default for RelativeRect {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.1,
            height: 0.1,
        }
    }
}

/// A point in relative coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelativePoint {
    /// X position (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
}

impl RelativePoint {
    /// Converts a pixel position at the developer resolution.
    pub fn from_pixels(x: f32, y: f32) -> Self {
        let (w, h) = DEVELOPER_RESOLUTION;
        Self { x: x / w, y: y / h }
    }
}

impl Default for RelativePoint {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

/// Positions of the marketplace widgets the bot reads and clicks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketLayout {
    /// Lowest listed price of a regular item
    pub price_region: RelativeRect,
    /// Lowest listed price of a convertible item (shown one row higher)
    pub convertible_price_region: RelativeRect,
    /// Currency balance in the top bar
    pub balance_region: RelativeRect,
    /// Purchase button
    pub purchase_button: RelativePoint,
    /// Purchase button for convertible items
    pub convertible_purchase_button: RelativePoint,
    /// Quantity slider "max" button
    pub max_quantity_button: RelativePoint,
    /// Unit price shown by the confirmation dialog after a purchase click
    pub warning_region: RelativeRect,
    /// Accept button of that dialog
    pub warning_confirm_button: RelativePoint,
    /// Pause after each click so the UI can settle (milliseconds)
    pub click_settle_ms: u64,
    /// Keep only pixels brighter than this before OCR (None = plain grayscale)
    pub ocr_threshold: Option<u8>,
    /// Save every captured region to the screenshots directory
    pub debug_mode: bool,
}

impl Default for MarketLayout {
    fn default() -> Self {
        Self {
            price_region: RelativeRect::from_pixels((2200.0, 1150.0), (2330.0, 1175.0)),
            convertible_price_region: RelativeRect::from_pixels((2200.0, 1070.0), (2330.0, 1095.0)),
            balance_region: RelativeRect::from_pixels((2080.0, 62.0), (2240.0, 92.0)),
            purchase_button: RelativePoint::from_pixels(2257.0, 1154.0),
            convertible_purchase_button: RelativePoint::from_pixels(2257.0, 1074.0),
            max_quantity_button: RelativePoint::from_pixels(2395.0, 1010.0),
            warning_region: RelativeRect::from_pixels((1233.0, 989.0), (1360.0, 1020.0)),
            warning_confirm_button: RelativePoint::from_pixels(1233.0, 989.0),
            click_settle_ms: 80,
            ocr_threshold: None,
            debug_mode: false,
        }
    }
}

/// A named set of purchase thresholds and mode flags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdProfile {
    pub name: String,
    /// At or below this (per unit) the bot buys
    #[serde(alias = "lowest_price")]
    pub ideal_price: u64,
    /// Above this (per unit) the bot only free-refreshes
    pub unacceptable_price: u64,
    /// Units the displayed price covers
    #[serde(default = "default_volume")]
    pub volume: u64,
    /// Pause before each screenshot (milliseconds)
    #[serde(default = "default_screenshot_delay_ms", alias = "screenshot_delay")]
    pub screenshot_delay_ms: u64,
    /// Pause between loop iterations (milliseconds)
    #[serde(default = "default_loop_gap_ms", alias = "loop_gap")]
    pub loop_gap_ms: u64,
    #[serde(default)]
    pub convertible: bool,
    #[serde(default)]
    pub key_mode: bool,
    #[serde(default)]
    pub half_coin_mode: bool,
}

fn default_volume() -> u64 {
    1
}

fn default_screenshot_delay_ms() -> u64 {
    150
}

fn default_loop_gap_ms() -> u64 {
    500
}

impl ThresholdProfile {
    /// Creates a profile with the given thresholds and default timings.
    pub fn new(name: &str, ideal_price: u64, unacceptable_price: u64) -> Self {
        Self {
            name: name.to_string(),
            ideal_price,
            unacceptable_price,
            ..Self::default()
        }
    }
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        Self {
            name: DEFAULT_PROFILE_NAME.to_string(),
            ideal_price: 548,
            unacceptable_price: 608,
            volume: default_volume(),
            screenshot_delay_ms: default_screenshot_delay_ms(),
            loop_gap_ms: default_loop_gap_ms(),
            convertible: false,
            key_mode: false,
            half_coin_mode: false,
        }
    }
}

/// Every stored profile plus the active pointer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProfileSet {
    pub configs: Vec<ThresholdProfile>,
    pub active_config_name: String,
    #[serde(default)]
    pub layout: MarketLayout,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self {
            configs: vec![ThresholdProfile::default()],
            active_config_name: DEFAULT_PROFILE_NAME.to_string(),
            layout: MarketLayout::default(),
        }
    }
}

impl ProfileSet {
    /// Builds a set, pointing at `active_name` if it names a profile and at
    /// the first profile otherwise.
    pub fn new(configs: Vec<ThresholdProfile>, active_name: Option<&str>) -> Self {
        let active_config_name = active_name
            .filter(|name| configs.iter().any(|p| p.name == *name))
            .map(str::to_string)
            .or_else(|| configs.first().map(|p| p.name.clone()))
            .unwrap_or_default();
        Self {
            configs,
            active_config_name,
            layout: MarketLayout::default(),
        }
    }

    pub fn find(&self, name: &str) -> Option<&ThresholdProfile> {
        self.configs.iter().find(|p| p.name == name)
    }

    /// Active profile, else the first profile, else a default one.
    pub fn active(&self) -> ThresholdProfile {
        self.find(&self.active_config_name)
            .or_else(|| self.configs.first())
            .cloned()
            .unwrap_or_default()
    }
}

/// On-disk shapes accepted when reading.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredProfiles {
    Current(ProfileSet),
    Legacy(LegacyProfile),
}

/// Single-profile format written by older versions.
#[derive(Deserialize)]
struct LegacyProfile {
    #[serde(default)]
    name: Option<String>,
    #[serde(alias = "lowest_price")]
    ideal_price: u64,
    #[serde(default)]
    unacceptable_price: Option<u64>,
    #[serde(default = "default_volume")]
    volume: u64,
    #[serde(default = "default_screenshot_delay_ms", alias = "screenshot_delay")]
    screenshot_delay_ms: u64,
    #[serde(default = "default_loop_gap_ms", alias = "loop_gap")]
    loop_gap_ms: u64,
    #[serde(default)]
    convertible: bool,
    #[serde(default)]
    key_mode: bool,
    #[serde(default)]
    half_coin_mode: bool,
}

impl From<LegacyProfile> for ThresholdProfile {
    fn from(legacy: LegacyProfile) -> Self {
        Self {
            name: legacy
                .name
                .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string()),
            ideal_price: legacy.ideal_price,
            // Old files had a single threshold; with nothing above it every
            // price that is not a buy becomes a free refresh.
            unacceptable_price: legacy.unacceptable_price.unwrap_or(legacy.ideal_price),
            volume: legacy.volume,
            screenshot_delay_ms: legacy.screenshot_delay_ms,
            loop_gap_ms: legacy.loop_gap_ms,
            convertible: legacy.convertible,
            key_mode: legacy.key_mode,
            half_coin_mode: legacy.half_coin_mode,
        }
    }
}

/// Profile file bound to a path.
#[derive(Clone, Debug)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the profile set. Never fails; see module docs for fallbacks.
    pub fn load(&self) -> ProfileSet {
        if !self.path.exists() {
            info!(
                "Profile file not found at {}, creating defaults",
                self.path.display()
            );
            let defaults = ProfileSet::default();
            if let Err(e) = self.write(&defaults) {
                warn!("Failed to write default profiles: {}", e);
            }
            return defaults;
        }

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(
                    "Failed to read {}: {}. Using defaults.",
                    self.path.display(),
                    e
                );
                return ProfileSet::default();
            }
        };

        match serde_json::from_str::<StoredProfiles>(&contents) {
            Ok(StoredProfiles::Current(set)) => {
                debug!(
                    "Loaded {} profiles, active = {}",
                    set.configs.len(),
                    set.active_config_name
                );
                set
            }
            Ok(StoredProfiles::Legacy(legacy)) => {
                let profile = ThresholdProfile::from(legacy);
                info!("Migrating single-profile file to profile \"{}\"", profile.name);
                let set = ProfileSet::new(vec![profile], None);
                if let Err(e) = self.write(&set) {
                    warn!("Failed to rewrite migrated profiles: {}", e);
                }
                set
            }
            Err(e) => {
                warn!(
                    "Failed to parse {}: {}. Using defaults.",
                    self.path.display(),
                    e
                );
                ProfileSet::default()
            }
        }
    }

    /// Saves `profiles`, keeping the layout already on disk.
    ///
    /// The first profile becomes active when `active_name` is `None` or does
    /// not name one of `profiles`.
    pub fn save(&self, profiles: &[ThresholdProfile], active_name: Option<&str>) -> Result<()> {
        let mut set = ProfileSet::new(profiles.to_vec(), active_name);
        if self.path.exists() {
            set.layout = self.load().layout;
        }
        self.write(&set)
    }

    /// Writes a complete set, layout included.
    pub fn write(&self, set: &ProfileSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(set)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn get_active(&self) -> ThresholdProfile {
        self.load().active()
    }

    /// Points the active pointer at `name`. Unknown names are ignored.
    pub fn set_active(&self, name: &str) -> Result<()> {
        let mut set = self.load();
        if set.find(name).is_none() {
            warn!("No profile named \"{}\", active profile unchanged", name);
            return Ok(());
        }
        set.active_config_name = name.to_string();
        self.write(&set)?;
        info!("Active profile set to \"{}\"", name);
        Ok(())
    }

    /// Adds `profile`, replacing any profile with the same name.
    pub fn upsert(&self, profile: ThresholdProfile) -> Result<()> {
        let mut set = self.load();
        match set.configs.iter_mut().find(|p| p.name == profile.name) {
            Some(existing) => *existing = profile,
            None => set.configs.push(profile),
        }
        self.write(&set)
    }

    /// Removes the profile called `name`.
    ///
    /// Returns `false` if there was no such profile or it was the last one.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut set = self.load();
        if set.configs.len() <= 1 || set.find(name).is_none() {
            return Ok(false);
        }
        set.configs.retain(|p| p.name != name);
        if set.active_config_name == name {
            set.active_config_name = set.configs[0].name.clone();
        }
        self.write(&set)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(name: &str, ideal: u64, unacceptable: u64) -> ThresholdProfile {
        ThresholdProfile::new(name, ideal, unacceptable)
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.json"));

        let set = store.load();
        assert_eq!(set, ProfileSet::default());
        assert!(store.path().exists(), "Default profiles should be persisted");
        assert_eq!(store.load(), set);
    }

    #[test]
    fn test_round_trip_keeps_profiles_and_active() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.json"));
        let profiles = vec![profile("ammo", 500, 600), profile("keys", 90000, 120000)];

        store.save(&profiles, Some("keys")).unwrap();
        let set = store.load();

        assert_eq!(set.configs, profiles);
        assert_eq!(set.active_config_name, "keys");
    }

    #[test]
    fn test_save_defaults_active_to_first() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.json"));
        let profiles = vec![profile("a", 1, 2), profile("b", 3, 4)];

        store.save(&profiles, None).unwrap();
        assert_eq!(store.load().active_config_name, "a");

        store.save(&profiles, Some("missing")).unwrap();
        assert_eq!(store.load().active_config_name, "a");
    }

    #[test]
    fn test_legacy_single_profile_is_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"lowest_price": 548, "volume": 3540, "screenshot_delay": 250, "debug_mode": false}"#,
        )
        .unwrap();
        let store = ProfileStore::new(&path);

        let set = store.load();
        assert_eq!(set.configs.len(), 1);
        let active = set.active();
        assert_eq!(set.active_config_name, active.name);
        assert_eq!(active.ideal_price, 548);
        assert_eq!(active.volume, 3540);
        assert_eq!(active.screenshot_delay_ms, 250);

        // Rewritten in the current format
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("active_config_name"));
    }

    #[test]
    fn test_legacy_named_profile_keeps_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"name": "bullets", "ideal_price": 500, "unacceptable_price": 600, "half_coin_mode": true}"#,
        )
        .unwrap();

        let set = ProfileStore::new(&path).load();
        assert_eq!(set.active_config_name, "bullets");
        let active = set.active();
        assert_eq!(active.unacceptable_price, 600);
        assert!(active.half_coin_mode);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(&path, "{ not json").unwrap();
        let store = ProfileStore::new(&path);

        assert_eq!(store.load(), ProfileSet::default());
        assert_eq!(store.get_active(), ThresholdProfile::default());
        // The corrupt file is left for the user to inspect
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_set_active_ignores_unknown_name() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.json"));
        store
            .save(&[profile("a", 1, 2), profile("b", 3, 4)], Some("a"))
            .unwrap();

        store.set_active("b").unwrap();
        assert_eq!(store.get_active().name, "b");

        store.set_active("nope").unwrap();
        assert_eq!(store.get_active().name, "b");
    }

    #[test]
    fn test_get_active_falls_back_to_first() {
        let set = ProfileSet {
            configs: vec![profile("a", 1, 2)],
            active_config_name: "gone".to_string(),
            layout: MarketLayout::default(),
        };
        assert_eq!(set.active().name, "a");

        let empty = ProfileSet {
            configs: vec![],
            active_config_name: String::new(),
            layout: MarketLayout::default(),
        };
        assert_eq!(empty.active(), ThresholdProfile::default());
    }

    #[test]
    fn test_upsert_and_remove() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.json"));
        store.save(&[profile("a", 1, 2)], None).unwrap();

        store.upsert(profile("b", 3, 4)).unwrap();
        store.upsert(profile("a", 10, 20)).unwrap();
        let set = store.load();
        assert_eq!(set.configs.len(), 2);
        assert_eq!(set.find("a").unwrap().ideal_price, 10);

        store.set_active("b").unwrap();
        assert!(store.remove("b").unwrap());
        assert_eq!(store.load().active_config_name, "a");

        // Last profile cannot be removed
        assert!(!store.remove("a").unwrap());
        assert!(!store.remove("missing").unwrap());
    }

    #[test]
    fn test_save_preserves_layout() {
        let dir = tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles.json"));
        let mut set = ProfileSet::default();
        set.layout.debug_mode = true;
        set.layout.click_settle_ms = 5;
        store.write(&set).unwrap();

        store.save(&[profile("x", 1, 2)], None).unwrap();
        let reloaded = store.load();
        assert!(reloaded.layout.debug_mode);
        assert_eq!(reloaded.layout.click_settle_ms, 5);
    }

    #[test]
    fn test_default_layout_matches_developer_pixels() {
        let layout = MarketLayout::default();
        assert!((layout.purchase_button.x - 2257.0 / 2560.0).abs() < 1e-6);
        assert!((layout.price_region.width - 130.0 / 2560.0).abs() < 1e-6);
        assert!((layout.price_region.height - 25.0 / 1440.0).abs() < 1e-6);
    }

    #[test]
    fn test_rect_to_pixels_clamps_to_surface() {
        let rect = RelativeRect { x: 0.1, y: 0.25, width: 0.5, height: 0.1 };
        assert_eq!(rect.to_pixels(100, 200), (10, 50, 50, 20));

        let overhang = RelativeRect { x: 0.9, y: 0.9, width: 0.5, height: 0.5 };
        assert_eq!(overhang.to_pixels(100, 100), (90, 90, 10, 10));

        let outside = RelativeRect { x: 1.5, y: -0.5, width: 0.2, height: 0.2 };
        assert_eq!(outside.to_pixels(100, 100), (100, 0, 0, 20));
    }
}
