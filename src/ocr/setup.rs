use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{BotError, Result};

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

const EXE_NAME: &str = if cfg!(windows) { "tesseract.exe" } else { "tesseract" };

const COMMON_EXE_PATHS: [&str; 4] = [
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
];

const COMMON_TESSDATA_PATHS: [&str; 5] = [
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
];

#[derive(Debug, Clone)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    pub tessdata: PathBuf,
}

/// Returns the directory for storing Tesseract files
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("market-bot")
        .join("tesseract")
}

/// Ensures Tesseract and `eng.traineddata` are usable.
///
/// The executable must already be installed. Missing English data is copied
/// from an installed Tesseract or downloaded into the local data dir.
pub fn ensure_tesseract() -> Result<TesseractPaths> {
    let executable = find_tesseract_executable()?;

    let tessdata = match find_tessdata_dir() {
        Ok(dir) => dir,
        Err(_) => {
            let local = get_tesseract_dir().join("tessdata");
            fs::create_dir_all(&local)?;
            fetch_tessdata(&local)?;
            local
        }
    };

    info!(
        "Tesseract ready: {} (tessdata {})",
        executable.display(),
        tessdata.display()
    );
    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Puts `eng.traineddata` into `tessdata_dir`, from a system install or GitHub.
fn fetch_tessdata(tessdata_dir: &Path) -> Result<()> {
    let eng_path = tessdata_dir.join("eng.traineddata");

    for dir in COMMON_TESSDATA_PATHS {
        let candidate = Path::new(dir).join("eng.traineddata");
        if candidate.exists() {
            info!("Copying eng.traineddata from: {}", candidate.display());
            fs::copy(&candidate, &eng_path)?;
            return Ok(());
        }
    }

    let url = format!("{}/eng.traineddata", TESSDATA_REPO);
    info!("Downloading {}...", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;
    let response = client
        .get(&url)
        .header("User-Agent", "market-bot")
        .send()?;

    if !response.status().is_success() {
        return Err(BotError::Tesseract(format!(
            "Failed to download eng.traineddata: HTTP {}",
            response.status()
        )));
    }

    let bytes = response.bytes()?;
    fs::write(&eng_path, &bytes)?;
    info!("Downloaded eng.traineddata ({} bytes)", bytes.len());
    Ok(())
}

/// Finds the Tesseract executable, checking our local dir first, then system
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join(EXE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for path in COMMON_EXE_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(BotError::Tesseract(format!(
        "Tesseract not found. Install Tesseract-OCR (add it to PATH) or copy it to {}",
        get_tesseract_dir().display()
    )))
}

/// Finds a directory holding `eng.traineddata`
pub fn find_tessdata_dir() -> Result<PathBuf> {
    let local_tessdata = get_tesseract_dir().join("tessdata");
    if local_tessdata.join("eng.traineddata").exists() {
        return Ok(local_tessdata);
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        for candidate in [p.clone(), p.join("tessdata")] {
            if candidate.join("eng.traineddata").exists() {
                return Ok(candidate);
            }
        }
        warn!("TESSDATA_PREFIX={} has no eng.traineddata", prefix);
    }

    for path in COMMON_TESSDATA_PATHS {
        let p = PathBuf::from(path);
        if p.join("eng.traineddata").exists() {
            return Ok(p);
        }
    }

    Err(BotError::Tesseract(
        "tessdata directory not found. Please ensure eng.traineddata is available.".to_string(),
    ))
}
