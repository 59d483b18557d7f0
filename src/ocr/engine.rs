use image::{ImageBuffer, Luma, RgbaImage};
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::debug;

use super::preprocess::prepare_for_ocr;
use super::setup::TesseractPaths;
use super::TextRecognizer;
use crate::error::{BotError, Result};

/// Represents a line of OCR text with confidence score
#[derive(Debug, Clone)]
pub struct OcrLine {
    pub text: String,
    pub words: Vec<OcrWord>,
    pub confidence: f32,
}

/// Represents a single word from OCR with confidence score
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

/// Tesseract run as an external process.
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: PathBuf,
    threshold: Option<u8>,
}

impl TesseractEngine {
    /// Wraps an installation found by `ensure_tesseract`.
    pub fn new(paths: TesseractPaths, threshold: Option<u8>) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
            threshold,
        }
    }

    /// Runs Tesseract on a preprocessed grayscale image in single-line mode.
    /// Returns structured output with lines and confidence scores.
    pub fn recognize_line(&self, img: &ImageBuffer<Luma<u8>, Vec<u8>>) -> Result<Vec<OcrLine>> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        img.save(temp_input.path())?;

        // Create temporary output file (Tesseract adds .tsv extension)
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let output = Command::new(&self.executable)
            .arg(temp_input.path())
            .arg(&output_base)
            .arg("--tessdata-dir")
            .arg(&self.tessdata)
            .arg("-l")
            .arg("eng")
            .arg("--psm")
            .arg("7") // Treat the image as a single text line
            .arg("-c")
            .arg("tessedit_char_whitelist=0123456789,. ")
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BotError::Tesseract(stderr.trim().to_string()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| BotError::Tesseract(format!("Failed to read output: {}", e)))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(parse_tsv_output(&tsv_content))
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(&mut self, img: &RgbaImage) -> Result<Vec<String>> {
        let prepared = prepare_for_ocr(img, self.threshold);
        let lines = self.recognize_line(&prepared)?;
        for line in &lines {
            debug!("OCR line \"{}\" ({:.0}%)", line.text, line.confidence);
        }
        Ok(line_spans(lines))
    }
}

/// One span per recognized line.
///
/// Tesseract splits "1 234 567" into three words; keeping the line whole lets
/// the price parser see every digit group.
pub fn line_spans(lines: Vec<OcrLine>) -> Vec<String> {
    lines.into_iter().map(|line| line.text).collect()
}

/// Parses Tesseract TSV output into structured OcrLine data
pub fn parse_tsv_output(tsv: &str) -> Vec<OcrLine> {
    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<OcrWord> = Vec::new();

    // Skip header
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
        //             left, top, width, height, conf, text
        let level: i32 = fields[0].parse().unwrap_or(-1);
        if level != 5 {
            continue;
        }
        let key = (
            fields[2].parse().unwrap_or(-1),
            fields[3].parse().unwrap_or(-1),
            fields[4].parse().unwrap_or(-1),
        );
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        if text.is_empty() || conf < 0.0 {
            continue;
        }

        if current_key.is_some_and(|k| k != key) {
            push_line(&mut lines, std::mem::take(&mut current_words));
        }
        current_key = Some(key);
        current_words.push(OcrWord {
            text: text.to_string(),
            confidence: conf,
        });
    }

    push_line(&mut lines, current_words);
    lines
}

fn push_line(lines: &mut Vec<OcrLine>, words: Vec<OcrWord>) {
    if words.is_empty() {
        return;
    }
    let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(OcrLine {
        text,
        words,
        confidence,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: i32, line: i32, conf: f32, text: &str) -> String {
        format!("5\t1\t{}\t1\t{}\t1\t0\t0\t10\t10\t{}\t{}", block, line, conf, text)
    }

    #[test]
    fn test_parse_tsv_groups_words_by_line() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t20\t-1\t".to_string(),
            word(1, 1, 90.0, "1,234"),
            word(1, 1, 80.0, "567"),
            word(1, 2, 70.0, "89"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "1,234 567");
        assert!((lines[0].confidence - 85.0).abs() < 0.01);
        assert_eq!(lines[1].words[0].text, "89");
    }

    #[test]
    fn test_parse_tsv_skips_empty_and_unconfident_words() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, -1.0, "ghost"),
            word(1, 1, 95.0, " "),
            word(1, 1, 95.0, "42"),
            "garbage line".to_string(),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].words.len(), 1);
        assert_eq!(lines[0].text, "42");
    }

    #[test]
    fn test_grouped_digits_stay_one_span() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 91.0, "1"),
            word(1, 1, 88.0, "234"),
            word(1, 1, 90.0, "567"),
        ]
        .join("\n");

        let spans = line_spans(parse_tsv_output(&tsv));
        assert_eq!(spans, vec!["1 234 567".to_string()]);
        assert_eq!(crate::ocr::extract_price(&spans).unwrap(), 1_234_567);
    }

    #[test]
    fn test_last_line_is_last_span() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, 90.0, "Price"),
            word(1, 2, 90.0, "1,234,"),
            word(1, 2, 90.0, "567"),
        ]
        .join("\n");

        let spans = line_spans(parse_tsv_output(&tsv));
        assert_eq!(spans.len(), 2);
        assert_eq!(crate::ocr::extract_price(&spans).unwrap(), 1_234_567);
    }

    #[test]
    fn test_parse_tsv_empty_output() {
        assert!(parse_tsv_output(HEADER).is_empty());
        assert!(parse_tsv_output("").is_empty());
    }
}
